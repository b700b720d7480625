use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use crate::models::SourceUnit;
use crate::text::normalize_block;

/// Per-page text via poppler's `pdftotext` when installed, otherwise the whole
/// file through `pdf-extract`.
pub async fn extract_pdf_units(pdf_path: &Path) -> Result<Vec<SourceUnit>> {
    let mut units = Vec::new();

    if has_command("pdftotext").await {
        let page_count = get_pdf_page_count(pdf_path).await.unwrap_or(0);
        for page in 1..=page_count {
            let output = Command::new("pdftotext")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-layout")
                .arg("-nopgbrk")
                .arg(pdf_path)
                .arg("-")
                .output()
                .await
                .with_context(|| format!("failed to run pdftotext for page {}", page))?;

            if !output.status.success() {
                continue;
            }

            let content = normalize_block(&String::from_utf8_lossy(&output.stdout));
            if content.is_empty() {
                continue;
            }

            units.push(SourceUnit {
                page: Some(page as i64),
                content,
            });
        }
    }

    if units.is_empty() {
        let pdf_path = pdf_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&pdf_path))
            .await
            .context("PDF extraction task panicked")?
            .context("failed to extract text from PDF")?;

        let content = normalize_block(&extracted);
        if !content.is_empty() {
            units.push(SourceUnit {
                page: None,
                content,
            });
        }
    }

    Ok(units)
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
}

fn parse_page_count(pdfinfo_output: &str) -> Result<usize> {
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    regex
        .captures(pdfinfo_output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))
}

async fn has_command(binary: &str) -> bool {
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_page_count_from_pdfinfo() {
        let out = "Title:          Manual\nProducer:       LaTeX\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(out).unwrap(), 12);
        assert!(parse_page_count("Title: none\n").is_err());
    }

    #[tokio::test]
    async fn unreadable_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        assert!(extract_pdf_units(&path).await.is_err());
    }
}
