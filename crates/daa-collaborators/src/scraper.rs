//! HTTP scraper with HTML table extraction
//!
//! Pages are fetched with `reqwest` and parsed with a small set of regexes:
//! - `<script>`, `<style>`, `<noscript>` and comments are dropped
//! - every `<table>` becomes a [`Table`]; the header row is the first row
//!   made only of `<th>` cells, else the first row
//! - cell text has tags, footnote markers (`[1]`, `[a]`, `[nb 2]`) and
//!   surrounding whitespace removed, and common entities decoded
//!
//! Nested tables are not supported; the outer table is cut at the first
//! closing tag.

use async_trait::async_trait;
use daa_core::{ScrapedPage, Scraper, Table};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

static NON_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->")
        .expect("valid regex")
});
static TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").expect("valid regex"));
static ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("valid regex"));
static CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(th|td)\b[^>]*>(.*?)</(?:th|td)\s*>").expect("valid regex")
});
static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|h[1-6]|tr|table)\s*>").expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static FOOTNOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]{1,12}\]").expect("valid regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);").expect("valid regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*").expect("valid regex"));

/// Scraper failures; logged and turned into an empty page
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// URL did not parse or is not http(s)
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Request could not be sent or the body could not be read
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),
}

/// Scraper settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Bodies are truncated to this many bytes before parsing
    pub max_body_bytes: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("daa/{} (data analyst agent)", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Fetches pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: reqwest::Client,
    config: ScraperConfig,
}

impl HttpScraper {
    /// Build the client
    ///
    /// # Errors
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(config: ScraperConfig) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn try_fetch(&self, raw_url: &str) -> Result<ScrapedPage, ScrapeError> {
        let url = url::Url::parse(raw_url).map_err(|e| ScrapeError::InvalidUrl(format!("{raw_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScrapeError::InvalidUrl(format!("unsupported scheme {}", url.scheme())));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ScrapeError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        let body = &bytes[..bytes.len().min(self.config.max_body_bytes)];
        Ok(parse_html(&String::from_utf8_lossy(body)))
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch(&self, url: &str) -> ScrapedPage {
        match self.try_fetch(url).await {
            Ok(page) => {
                tracing::debug!("Fetched {}: {} tables, {} chars", url, page.tables.len(), page.text.len());
                page
            }
            Err(e) => {
                tracing::warn!("Scrape of {} failed: {}", url, e);
                ScrapedPage::default()
            }
        }
    }
}

/// Extract visible text and tables from an HTML document
#[must_use]
pub fn parse_html(html: &str) -> ScrapedPage {
    let cleaned = NON_CONTENT.replace_all(html, " ");
    let tables = TABLE
        .captures_iter(&cleaned)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_table(m.as_str()))
        .collect();

    let with_breaks = BLOCK_BREAK.replace_all(&cleaned, "\n");
    let text = decode_entities(&TAG.replace_all(&with_breaks, " "));
    let text = SPACES.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(text.trim(), "\n").into_owned();

    ScrapedPage { text, tables }
}

fn parse_table(inner: &str) -> Option<Table> {
    let rows: Vec<Vec<(bool, String)>> = ROW
        .captures_iter(inner)
        .filter_map(|c| c.get(1))
        .map(|row| {
            CELL.captures_iter(row.as_str())
                .map(|cell| {
                    let is_header = cell.get(1).is_some_and(|t| t.as_str().eq_ignore_ascii_case("th"));
                    let text = cell.get(2).map_or_else(String::new, |m| cell_text(m.as_str()));
                    (is_header, text)
                })
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    if rows.is_empty() {
        return None;
    }

    let header_index = rows
        .iter()
        .position(|cells| cells.iter().all(|(is_header, _)| *is_header))
        .unwrap_or(0);

    let headers = rows[header_index].iter().map(|(_, text)| text.clone()).collect();
    let body = rows
        .into_iter()
        .skip(header_index + 1)
        .map(|cells| cells.into_iter().map(|(_, text)| Value::String(text)).collect())
        .collect();
    Some(Table::new(headers, body))
}

fn cell_text(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    let decoded = decode_entities(&without_tags);
    let without_notes = FOOTNOTE.replace_all(&decoded, "");
    SPACES
        .replace_all(&without_notes.replace('\n', " "), " ")
        .trim()
        .to_string()
}

/// Decode named and numeric HTML entities; unknown names are left as-is
#[must_use]
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('–'),
                    "mdash" => Some('—'),
                    "minus" => Some('−'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PAGE: &str = r#"<html><head><style>.x{color:red}</style><script>var t = "<table>";</script></head>
<body><h1>Highest-grossing films</h1><p>Box office &amp; rankings.</p>
<table class="wikitable">
<tr><th>Rank</th><th>Peak</th><th>Title</th><th>Worldwide gross</th><th>Year</th></tr>
<tr><td>1</td><td>1</td><th scope="row"><i><a href="/wiki/Avatar">Avatar</a></i></th><td>$2,923,706,026</td><td>2009<sup>[# 1]</sup></td></tr>
<tr><td>2</td><td>1</td><th scope="row"><i>Avengers: Endgame</i></th><td>$2,797,501,328</td><td>2019[a]</td></tr>
</table>
<!-- <table><tr><td>hidden</td></tr></table> -->
</body></html>"#;

    #[test]
    fn extracts_tables_with_row_headers() {
        let page = parse_html(PAGE);
        assert_eq!(page.tables.len(), 1);
        let table = &page.tables[0];
        assert_eq!(table.headers, vec!["Rank", "Peak", "Title", "Worldwide gross", "Year"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][2], json!("Avatar"));
        assert_eq!(table.rows[0][4], json!("2009"));
        assert_eq!(table.rows[1][4], json!("2019"));
    }

    #[test]
    fn text_drops_scripts_and_decodes_entities() {
        let page = parse_html(PAGE);
        assert!(page.text.contains("Box office & rankings."));
        assert!(!page.text.contains("color:red"));
        assert!(!page.text.contains("hidden"));
    }

    #[test]
    fn first_row_is_header_without_th() {
        let page = parse_html("<table><tr><td>a</td><td>b</td></tr><tr><td>1</td><td>2</td></tr></table>");
        assert_eq!(page.tables[0].headers, vec!["a", "b"]);
        assert_eq!(page.tables[0].rows, vec![vec![json!("1"), json!("2")]]);
    }

    #[test]
    fn entities_numeric_and_unknown() {
        assert_eq!(decode_entities("&#65;&#x42;&lt;&bogus;"), "AB<&bogus;");
    }

    #[tokio::test]
    async fn unreachable_host_yields_empty_page() {
        let scraper = HttpScraper::new(ScraperConfig {
            timeout_secs: 1,
            ..ScraperConfig::default()
        })
        .unwrap();
        assert_eq!(scraper.fetch("not a url").await, ScrapedPage::default());
        assert_eq!(scraper.fetch("ftp://example.com/file").await, ScrapedPage::default());
    }

    #[tokio::test]
    async fn fetches_from_local_server() {
        use warp::Filter;
        let route = warp::path("films").map(|| warp::reply::html(PAGE));
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let scraper = HttpScraper::new(ScraperConfig::default()).unwrap();
        let page = scraper.fetch(&format!("http://{addr}/films")).await;
        assert_eq!(page.tables.len(), 1);

        let missing = scraper.fetch(&format!("http://{addr}/nothing")).await;
        assert_eq!(missing, ScrapedPage::default());
    }
}
