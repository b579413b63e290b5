//! Web search backend: query → raw hits.
//!
//! The debate engine only depends on the [`SearchBackend`] trait; the
//! bundled implementation talks to the Jina reader-search API over
//! synchronous HTTP and parses its Markdown result listing. No ranking
//! guarantees are assumed and an empty result set is valid.

use std::sync::LazyLock;
use std::time::Duration;

use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

// ── Regex patterns ──────────────────────────────────────────────────────

static RE_TITLE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\] Title:").unwrap());

static RE_URL_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\] URL Source:\s*(.+)$").unwrap());

static RE_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\] Description:\s*(.+)$").unwrap());

static RE_HIT_METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\] \w[\w ]*:").unwrap());

/// Errors from the search subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum SearchError {
    #[error("search rate limited after {attempts} attempts")]
    #[diagnostic(
        code(elenchus::search::rate_limited),
        help("The provider returned 429 repeatedly. Lower concurrent_searches or wait.")
    )]
    RateLimited { attempts: u32 },

    #[error("search request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(elenchus::search::timeout),
        help("Increase search_timeout_s or check network connectivity.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("search request failed: {message}")]
    #[diagnostic(
        code(elenchus::search::request_failed),
        help("Check the API key and endpoint URL.")
    )]
    RequestFailed { message: String },
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// One raw search result before evidence admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Contract for a search provider: up to N hits per query, no ranking
/// guarantees, empty result valid.
pub trait SearchBackend: Send + Sync {
    fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Jina reader-search client
// ---------------------------------------------------------------------------

/// Content cap per hit; longer excerpts add noise without adding signal
/// for stance or attack prompts.
const MAX_HIT_CONTENT: usize = 1000;

/// Configuration for the Jina search client.
#[derive(Debug, Clone)]
pub struct JinaConfig {
    /// Base URL; the query is appended percent-encoded.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Hits kept per query.
    pub max_results: usize,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry cap for rate-limited calls.
    pub max_retries: u32,
}

impl Default for JinaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://s.jina.ai/".into(),
            api_key: String::new(),
            max_results: 5,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Client for the Jina reader-search endpoint.
///
/// Responses arrive as Markdown in one of two listing formats; both are
/// parsed here. Rate limits are retried with exponential backoff; timeouts
/// are not retried.
pub struct JinaClient {
    config: JinaConfig,
}

impl JinaClient {
    pub fn new(config: JinaConfig) -> Self {
        Self { config }
    }

    fn call_once(&self, query: &str) -> SearchResult<String> {
        let url = format!("{}{}", self.config.base_url, encode_query(query));
        let agent = ureq::AgentBuilder::new().timeout(self.config.timeout).build();

        let response = agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("X-Retain-Images", "none")
            .call();

        match response {
            Ok(resp) => resp.into_string().map_err(|e| SearchError::RequestFailed {
                message: format!("failed to read body: {e}"),
            }),
            Err(ureq::Error::Status(429, _)) => Err(SearchError::RateLimited { attempts: 1 }),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(SearchError::RequestFailed {
                    message: format!("status {code}: {}", preview(&body, 200)),
                })
            }
            Err(ureq::Error::Transport(t)) => {
                let message = t.to_string();
                if message.contains("timed out") {
                    Err(SearchError::Timeout {
                        timeout_secs: self.config.timeout.as_secs(),
                    })
                } else {
                    Err(SearchError::RequestFailed { message })
                }
            }
        }
    }
}

impl SearchBackend for JinaClient {
    fn search(&self, query: &str) -> SearchResult<Vec<SearchHit>> {
        let mut attempt = 0;
        let body = loop {
            match self.call_once(query) {
                Ok(body) => break body,
                Err(SearchError::RateLimited { .. }) if attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * (1 << attempt));
                    warn!(?delay, attempt, "search rate limited, backing off");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(SearchError::RateLimited { .. }) => {
                    return Err(SearchError::RateLimited { attempts: attempt + 1 });
                }
                Err(e) => return Err(e),
            }
        };

        let hits = parse_listing(&body);
        debug!(query, hits = hits.len(), "search complete");
        Ok(hits.into_iter().take(self.config.max_results).collect())
    }
}

/// First `max` chars of a body, for log and error messages.
fn preview(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

/// Percent-encode a query for use as a URL path suffix.
fn encode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len() * 3);
    for byte in query.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Parse the reader-search Markdown listing.
///
/// Two formats are seen in the wild: the numbered one
/// (`[1] Title: ... / [1] URL Source: ... / [1] Description: ...`) and the
/// older `---`-delimited blocks with `Title:`/`URL:` lines. Unrecognized
/// bodies parse to zero hits.
fn parse_listing(body: &str) -> Vec<SearchHit> {
    if body.contains("] Title:") {
        parse_numbered_listing(body)
    } else if body.contains("---") {
        parse_block_listing(body)
    } else {
        warn!(preview = %preview(body, 120), "unrecognized search listing format");
        Vec::new()
    }
}

fn parse_numbered_listing(body: &str) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for block in RE_TITLE_SPLIT.split(body).skip(1) {
        let mut lines = block.trim().lines();
        let title = lines.next().unwrap_or("").trim().to_string();

        let mut url = String::new();
        let mut description = String::new();
        let mut content = String::new();

        for line in lines {
            if let Some(m) = RE_URL_SOURCE.captures(line) {
                url = m[1].trim().to_string();
            } else if let Some(m) = RE_DESCRIPTION.captures(line) {
                description = m[1].trim().to_string();
            } else if RE_HIT_METADATA.is_match(line) {
                // other per-hit metadata, ignored
            } else {
                content.push_str(line);
                content.push('\n');
            }
        }

        let mut content: String = content.trim().chars().take(MAX_HIT_CONTENT).collect();
        if content.is_empty() {
            content = description;
        }

        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit { title, url, content });
        }
    }
    hits
}

fn parse_block_listing(body: &str) -> Vec<SearchHit> {
    let blocks: Vec<&str> = body.split("---\n").collect();
    let mut hits = Vec::new();

    let mut i = 1;
    while i + 1 < blocks.len() {
        let metadata = blocks[i];
        let content_block = blocks[i + 1];

        let mut title = String::new();
        let mut url = String::new();
        for line in metadata.lines() {
            if let Some(rest) = line.strip_prefix("Title:") {
                title = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("URL:") {
                url = rest.trim().to_string();
            }
        }

        let content: String = content_block.trim().chars().take(MAX_HIT_CONTENT).collect();
        if !title.is_empty() && !url.is_empty() && !content.is_empty() {
            hits.push(SearchHit { title, url, content });
        }
        i += 2;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_listing_parses_title_url_and_content() {
        let body = "\
[1] Title: Pluto facts
[1] URL Source: https://science.nasa.gov/pluto
[1] Description: Overview of Pluto.
Pluto is a dwarf planet in the Kuiper belt.
More lines of content here.
[2] Title: Second hit
[2] URL Source: https://example.com/x
[2] Description: Short description only.
";
        let hits = parse_listing(body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Pluto facts");
        assert_eq!(hits[0].url, "https://science.nasa.gov/pluto");
        assert!(hits[0].content.contains("dwarf planet"));
        // hit without body content falls back to the description
        assert_eq!(hits[1].content, "Short description only.");
    }

    #[test]
    fn block_listing_parses_pairs() {
        let body = "\
preamble
---
Title: First
URL: https://a.example.com
---
Content of the first result.
---
Title: Second
URL: https://b.example.com
---
Content of the second result.
";
        let hits = parse_listing(body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].url, "https://b.example.com");
    }

    #[test]
    fn unrecognized_body_parses_to_nothing() {
        assert!(parse_listing("plain prose with no markers").is_empty());
    }

    #[test]
    fn hits_missing_url_are_skipped() {
        let body = "[1] Title: No url here\nSome content.\n";
        assert!(parse_listing(body).is_empty());
    }

    #[test]
    fn query_encoding_covers_spaces_and_unicode() {
        assert_eq!(encode_query("a b"), "a%20b");
        assert_eq!(encode_query("x-y_z.~"), "x-y_z.~");
        assert_eq!(encode_query("é"), "%C3%A9");
    }
}
