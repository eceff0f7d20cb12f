//! Link preview extraction.
//!
//! The first `http(s)` URL in a text message is fetched and its OpenGraph
//! metadata (falling back to `<title>`) becomes a [`Embed::Link`]. Fetching is
//! best effort: every failure yields `None` and the message is sent without a
//! preview.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

use super::types::Embed;
use crate::config::EmbedsConfig;

/// Cached previews live this long, hits and misses alike.
const CACHE_TTL: Duration = Duration::from_secs(600);
const CACHE_MAX: usize = 1024;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"']+"#).expect("static pattern is valid")
});
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<meta\s[^>]*>").expect("static pattern is valid")
});
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("static pattern is valid")
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static pattern is valid")
});

/// First link in `text`, with trailing sentence punctuation removed.
pub fn first_url(text: &str) -> Option<&str> {
    let found = URL_RE.find(text)?.as_str();
    let trimmed = found.trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
    (trimmed.len() > "https://".len()).then_some(trimmed)
}

/// Source of link previews.
#[async_trait]
pub trait EmbedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<Embed>;
}

/// Used when previews are disabled.
pub struct NoopEmbedFetcher;

#[async_trait]
impl EmbedFetcher for NoopEmbedFetcher {
    async fn fetch(&self, _url: &str) -> Option<Embed> {
        None
    }
}

struct CachedPreview {
    embed: Option<Embed>,
    expires_at: Instant,
}

/// Fetches pages over HTTP and scrapes their metadata.
pub struct HttpEmbedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
    cache: DashMap<String, CachedPreview>,
}

impl HttpEmbedFetcher {
    pub fn new(config: &EmbedsConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("echohub/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            timeout,
            max_bytes: config.max_bytes,
            cache: DashMap::new(),
        }
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let mut response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url, error = %e, "Preview request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(url, status = %response.status(), "Preview request rejected");
            return None;
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        if !is_html {
            return None;
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_bytes.saturating_sub(body.len());
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if body.len() >= self.max_bytes {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(url, error = %e, "Preview body read failed");
                    return None;
                }
            }
        }

        Some(String::from_utf8_lossy(&body).into_owned())
    }

    fn prune_cache(&self) {
        let now = Instant::now();
        self.cache.retain(|_, cached| cached.expires_at > now);
    }
}

#[async_trait]
impl EmbedFetcher for HttpEmbedFetcher {
    async fn fetch(&self, url: &str) -> Option<Embed> {
        if let Some(cached) = self.cache.get(url) {
            if cached.expires_at > Instant::now() {
                return cached.embed.clone();
            }
        }

        let embed = match tokio::time::timeout(self.timeout, self.fetch_page(url)).await {
            Ok(Some(html)) => parse_preview(url, &html),
            Ok(None) => None,
            Err(_) => {
                debug!(url, "Preview request timed out");
                None
            }
        };

        self.cache.insert(
            url.to_string(),
            CachedPreview {
                embed: embed.clone(),
                expires_at: Instant::now() + CACHE_TTL,
            },
        );
        if self.cache.len() > CACHE_MAX {
            self.prune_cache();
        }

        embed
    }
}

/// Build a link preview from page markup. `None` when the page has no
/// usable title or description.
pub fn parse_preview(url: &str, html: &str) -> Option<Embed> {
    let mut title = None;
    let mut description = None;
    let mut site_name = None;
    let mut plain_description = None;

    for tag in META_RE.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match attr[1].to_ascii_lowercase().as_str() {
                "property" | "name" => key = value.map(str::to_ascii_lowercase),
                "content" => content = value,
                _ => {}
            }
        }
        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        let content = decode_entities(content.trim());
        if content.is_empty() {
            continue;
        }
        match key.as_str() {
            "og:title" => title = title.or(Some(content)),
            "og:description" => description = description.or(Some(content)),
            "og:site_name" => site_name = site_name.or(Some(content)),
            "description" => plain_description = plain_description.or(Some(content)),
            _ => {}
        }
    }

    let title = title.or_else(|| {
        TITLE_RE
            .captures(html)
            .map(|c| decode_entities(c[1].trim()))
            .filter(|t| !t.is_empty())
    });
    let description = description.or(plain_description);

    if title.is_none() && description.is_none() {
        return None;
    }

    Some(Embed::Link {
        url: url.to_string(),
        title,
        description,
        site_name,
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
