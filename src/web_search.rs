use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Datelike;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{Html, Selector};

use crate::models::SearchHit;
use crate::ports::WebSearch;

const NO_RESULTS_MESSAGE: &str = "검색 결과가 없습니다.";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) multi-agent-chatbot";

/// DuckDuckGo HTML search.
#[derive(Clone)]
pub struct WebSearcher {
    client: Client,
    endpoint: String,
}

impl WebSearcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn search_web(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let year = chrono::Utc::now().year();
        let enhanced = enhance_search_query(query, year);
        tracing::info!("web search: '{}' -> '{}'", query, enhanced);

        let started = Instant::now();
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("q", enhanced.as_str())])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .context("failed to contact web search endpoint")?
            .error_for_status()
            .context("web search returned non-success status")?
            .text()
            .await
            .context("failed to read web search response")?;
        tracing::info!(
            "web search finished in {:.2}s",
            started.elapsed().as_secs_f32()
        );

        let hits = parse_results(&body, max_results)?
            .into_iter()
            .map(|hit| SearchHit {
                body: filter_search_result(&hit.body, year),
                ..hit
            })
            .collect();
        Ok(hits)
    }
}

#[async_trait]
impl WebSearch for WebSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        match self.search_web(query, max_results).await {
            Ok(hits) => Ok(hits),
            Err(err) => {
                tracing::error!("web search failed: {err:#}");
                Ok(vec![])
            }
        }
    }
}

/// Pins the query to the current year; a couple of topics get a fixed phrasing.
pub fn enhance_search_query(query: &str, year: i32) -> String {
    if query.contains("대통령") && query.contains("미국") {
        return format!("현재 미국 대통령 {year} 공식 정보");
    }
    format!("{query} {year}")
}

/// Drops boilerplate and keeps lines that mention a year close to `year`.
/// Falls back to the cleaned text when no line qualifies.
pub fn filter_search_result(result: &str, year: i32) -> String {
    let cleaned = result.replace("존재하지 않는 이미지입니다.", "");
    let cleaned = match Regex::new(r"\.{3,}") {
        Ok(re) => re.replace_all(&cleaned, "...").into_owned(),
        Err(_) => cleaned,
    };

    let years: Vec<String> = ((year - 1)..=(year + 1)).map(|y| y.to_string()).collect();
    let filtered = cleaned
        .lines()
        .filter(|line| years.iter().any(|y| line.contains(y.as_str())))
        .collect::<Vec<_>>()
        .join("\n");

    if filtered.trim().is_empty() {
        cleaned
    } else {
        filtered
    }
}

pub fn format_search_results(results: &[SearchHit]) -> String {
    if results.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let body = if hit.body.trim().is_empty() {
                "설명 없음"
            } else {
                hit.body.as_str()
            };
            format!("[{}] 검색 결과:\n{}\n", i + 1, body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    let selector = |s: &str| {
        Selector::parse(s).map_err(|err| anyhow::anyhow!("invalid selector {s}: {err:?}"))
    };
    let result_sel = selector("div.result")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for result in document.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }

        let Some(anchor) = result.select(&title_sel).next() else {
            continue;
        };
        let title = collapse_whitespace(&anchor.text().collect::<String>());
        let link = anchor
            .value()
            .attr("href")
            .map(resolve_result_link)
            .unwrap_or_default();
        let body = result
            .select(&snippet_sel)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        if title.is_empty() && body.is_empty() {
            continue;
        }
        hits.push(SearchHit { title, link, body });
    }

    Ok(hits)
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<url>`.
fn resolve_result_link(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or(absolute)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
