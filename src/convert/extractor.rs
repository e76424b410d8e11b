//! Readable-content extraction for article URLs.

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Title and main-content HTML pulled out of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub content_html: String,
}

/// Fetches a URL and extracts its readable content. Any fetch or parse
/// failure means "this URL did not convert"; callers continue with the rest
/// of the batch.
pub trait ContentExtractor {
    fn extract(&self, url: &str) -> Result<ExtractedArticle>;
}

/// Readability-like extractor over a blocking HTTP client:
/// `<title>` text for the title, `<article>` inner HTML for the content,
/// falling back to `<body>` and then the whole document.
pub struct ReadableExtractor {
    client: reqwest::blocking::Client,
}

impl ReadableExtractor {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ContentExtractor for ReadableExtractor {
    fn extract(&self, url: &str) -> Result<ExtractedArticle> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("HTTP error fetching {url}"))?;
        let html = response
            .text()
            .with_context(|| format!("Failed to read response body of {url}"))?;
        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(extract_readable(&html))
    }
}

/// The pure extraction half, separated from fetching.
pub fn extract_readable(html: &str) -> ExtractedArticle {
    let doc = Html::parse_document(html);
    let title_sel = Selector::parse("title").ok();
    let article_sel = Selector::parse("article").ok();
    let body_sel = Selector::parse("body").ok();

    let title = title_sel
        .as_ref()
        .and_then(|sel| doc.select(sel).next())
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty());

    let content_html = article_sel
        .as_ref()
        .and_then(|sel| doc.select(sel).next())
        .map(|node| node.inner_html())
        .unwrap_or_else(|| {
            body_sel
                .as_ref()
                .and_then(|sel| doc.select(sel).next())
                .map(|node| node.inner_html())
                .unwrap_or_else(|| doc.root_element().html())
        });

    ExtractedArticle {
        title,
        content_html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_element() {
        let html = "<html><head><title>My Article</title></head>\
                    <body><nav>menu</nav><article><p>the text</p></article></body></html>";
        let extracted = extract_readable(html);
        assert_eq!(extracted.title.as_deref(), Some("My Article"));
        assert_eq!(extracted.content_html, "<p>the text</p>");
    }

    #[test]
    fn falls_back_to_body_then_document() {
        let html = "<html><body><p>body only</p></body></html>";
        let extracted = extract_readable(html);
        assert!(extracted.title.is_none());
        assert_eq!(extracted.content_html, "<p>body only</p>");

        let extracted = extract_readable("just text");
        assert!(extracted.content_html.contains("just text"));
    }

    #[test]
    fn blank_title_is_none() {
        let html = "<html><head><title>  </title></head><body><p>x</p></body></html>";
        assert!(extract_readable(html).title.is_none());
    }
}
