use std::path::Path;

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Node, Selector};

use crate::models::SourceUnit;
use crate::text::normalize_block;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "li", "ul",
    "ol", "tr", "table", "pre", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "br", "hr",
];

pub fn extract_html_units(path: &Path) -> Result<Vec<SourceUnit>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_html_units(&String::from_utf8_lossy(&bytes))
}

/// Title and body text as separate units. Script bodies survive as
/// `<script>..</script>` blocks; styles are dropped.
pub fn parse_html_units(html: &str) -> Result<Vec<SourceUnit>> {
    let selector = |s: &str| {
        Selector::parse(s).map_err(|err| anyhow::anyhow!("invalid selector {s}: {err:?}"))
    };
    let title_sel = selector("title")?;
    let body_sel = selector("body")?;
    let head_script_sel = selector("head script")?;

    let document = Html::parse_document(html);
    let mut units = Vec::new();

    if let Some(title) = document.select(&title_sel).next() {
        let title = normalize_block(&title.text().collect::<String>());
        if !title.is_empty() {
            units.push(SourceUnit {
                page: None,
                content: title,
            });
        }
    }

    let root = document
        .select(&body_sel)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut text = String::new();
    // the head itself is skipped below, its scripts are not
    for script in document.select(&head_script_sel) {
        push_script(&script.text().collect::<String>(), &mut text);
    }
    collect_text(root, false, &mut text);
    let body = normalize_block(&text);
    if !body.is_empty() {
        units.push(SourceUnit {
            page: None,
            content: body,
        });
    }

    Ok(units)
}

fn collect_text(element: ElementRef<'_>, in_pre: bool, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if in_pre {
                    out.push_str(text);
                } else {
                    out.push_str(&text.replace('\n', " "));
                }
            }
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                match name {
                    "style" | "noscript" | "template" | "head" => {}
                    "script" => push_script(&child_el.text().collect::<String>(), out),
                    _ if BLOCK_TAGS.contains(&name) => {
                        out.push_str("\n\n");
                        collect_text(child_el, in_pre || name == "pre", out);
                        out.push_str("\n\n");
                    }
                    _ => collect_text(child_el, in_pre, out),
                }
            }
            _ => {}
        }
    }
}

fn push_script(code: &str, out: &mut String) {
    if !code.trim().is_empty() {
        out.push_str("\n<script>\n");
        out.push_str(code.trim());
        out.push_str("\n</script>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
  <head><title> Widget   Guide </title><style>body { color: red; }</style></head>
  <body>
    <h1>Install</h1>
    <p>Run the
       installer.</p>
    <script type="text/javascript">
      function add(a, b) { return a + b; }
    </script>
    <pre>line one
line two</pre>
  </body>
</html>"#;

    #[test]
    fn extracts_title_and_body() {
        let units = parse_html_units(PAGE).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].content, "Widget Guide");

        let body = &units[1].content;
        assert!(body.starts_with("Install\n\nRun the installer."));
        assert!(body.contains("line one\nline two"));
        assert!(!body.contains("color: red"));
    }

    #[test]
    fn keeps_script_bodies_for_conversion() {
        let units = parse_html_units(PAGE).unwrap();
        let scripts = super::super::javascript::extract_javascript(&units[1].content);
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains("function add(a, b) { return a + b; }"));
    }

    #[test]
    fn head_scripts_reach_conversion() {
        let html = r#"<html><head><title>T</title>
<script>const greet = () => "hi";</script></head>
<body><p>Body text</p></body></html>"#;

        let units = parse_html_units(html).unwrap();
        assert_eq!(units.len(), 2);
        let scripts = super::super::javascript::extract_javascript(&units[1].content);
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains(r#"const greet = () => "hi";"#));
        assert!(units[1].content.contains("Body text"));
        assert!(!units[1].content.contains("<title>"));
    }

    #[test]
    fn empty_document_has_no_units() {
        assert!(parse_html_units("<html><body>  </body></html>").unwrap().is_empty());
    }
}
