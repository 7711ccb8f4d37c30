//! URL Fetcher (spec §4.2): resilient GET with conditional-request reuse.
//!
//! Disk cache is an embedded `sled` tree under `<dir>/feedcaster_cache/url_fetcher`,
//! values are `zstd`-compressed, `serde_json`-encoded [`CacheEntry`] records keyed
//! by URL. `reqwest` (rustls-tls, gzip) performs the actual GET, matching the
//! teacher's HTTP stack.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::constants;

const CACHE_SCHEMA_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchApproach {
    CacheHit,
    Etag304,
    Read,
}

#[derive(Debug, Clone)]
pub struct UrlContent {
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub strong: bool,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub approach: FetchApproach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    version: u32,
    #[serde(with = "serde_bytes_base64")]
    body: Vec<u8>,
    etag: Option<String>,
    strong: bool,
    fetched_at: chrono::DateTime<chrono::Utc>,
}

/// sled stores raw bytes; the body itself is zstd-compressed before the whole
/// record is serialized, so a plain base64-less byte vec round-trips via serde_json
/// only if we encode it — `serde_json` has no native bytes type, so tunnel through base64.
mod serde_bytes_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

pub struct UrlFetcher {
    client: Client,
    cache: sled::Db,
    etag_blacklist: Mutex<HashSet<String>>,
    user_agent_overrides: std::collections::HashMap<String, String>,
}

impl UrlFetcher {
    pub fn new(cache_dir: &Path, user_agent_overrides: std::collections::HashMap<String, String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::request_timeout())
            .build()
            .context("building HTTP client")?;
        let cache = sled::open(cache_dir.join("feedcaster_cache").join("url_fetcher"))
            .context("opening url fetcher disk cache")?;
        Ok(Self {
            client,
            cache,
            etag_blacklist: Mutex::new(HashSet::new()),
            user_agent_overrides,
        })
    }

    fn cached(&self, url: &str) -> Option<CacheEntry> {
        let bytes = self.cache.get(url).ok()??;
        let entry: CacheEntry = serde_json::from_slice(&bytes).ok()?;
        if entry.version != CACHE_SCHEMA_VERSION {
            return None;
        }
        Some(entry)
    }

    fn store(&self, url: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry).context("serializing cache entry")?;
        self.cache.insert(url, bytes).context("writing url fetcher cache")?;
        Ok(())
    }

    fn purge_netloc(&self, netloc: &str) {
        let keys: Vec<_> = self
            .cache
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter(|k| {
                std::str::from_utf8(k)
                    .ok()
                    .map(|u| crate::util::urlnorm::netloc(u) == netloc)
                    .unwrap_or(false)
            })
            .collect();
        for key in keys {
            let _ = self.cache.remove(key);
        }
    }

    fn user_agent_for(&self, netloc: &str) -> String {
        match self.user_agent_overrides.get(netloc).map(String::as_str) {
            Some("random") => format!("feedcaster/{:08x}", rand::thread_rng().gen::<u32>()),
            Some(explicit) => explicit.to_string(),
            None => constants::USER_AGENT_DEFAULT.to_string(),
        }
    }

    /// `max_cache_age`: the reader's own ceiling on cache freshness, half its poll
    /// period (spec §4.2 step 1). `alert` is the caller's operator-alert hook,
    /// used when ETag-poisoning is detected (spec §4.2 step 6).
    pub async fn fetch(&self, url: &str, max_cache_age: Duration, alert: &(dyn Fn(String) + Send + Sync)) -> Result<UrlContent> {
        let netloc = crate::util::urlnorm::netloc(url);

        if let Some(cached) = self.cached(url) {
            let age = chrono::Utc::now().signed_duration_since(cached.fetched_at);
            if age.to_std().map(|a| a <= max_cache_age).unwrap_or(false) {
                let body = zstd::stream::decode_all(cached.body.as_slice()).context("decompressing cached body")?;
                return Ok(UrlContent {
                    body,
                    etag: cached.etag,
                    strong: cached.strong,
                    fetched_at: cached.fetched_at,
                    approach: FetchApproach::CacheHit,
                });
            }
        }

        let cached = self.cached(url);
        let should_probe = cached.as_ref().is_some_and(|c| {
            c.etag.is_some()
                && c.strong
                && !self.etag_blacklist.lock().unwrap().contains(&netloc)
                && rand::thread_rng().gen_bool(constants::ETAG_TEST_PROBABILITY)
        });

        let user_agent = self.user_agent_for(&netloc);
        let mut last_err = None;
        for attempt in 0..constants::READ_ATTEMPTS_MAX {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            let mut req = self.client.get(url).header("User-Agent", &user_agent);
            let send_if_none_match = cached.as_ref().filter(|_| !should_probe).and_then(|c| c.etag.clone());
            if let Some(etag) = &send_if_none_match {
                req = req.header("If-None-Match", etag);
            }
            match req.send().await {
                Ok(resp) => return self.handle_response(url, &netloc, resp, cached, should_probe, alert).await,
                Err(err) => last_err = Some(err),
            }
        }
        Err(crate::errors::Kind::Network {
            url: url.to_string(),
            source: anyhow::anyhow!(last_err.unwrap()),
        }
        .into())
    }

    async fn handle_response(
        &self,
        url: &str,
        netloc: &str,
        resp: reqwest::Response,
        cached: Option<CacheEntry>,
        was_probe: bool,
        alert: &(dyn Fn(String) + Send + Sync),
    ) -> Result<UrlContent> {
        if resp.status() == StatusCode::NOT_MODIFIED {
            let cached = cached.context("304 response with no cached entry")?;
            let fetched_at = chrono::Utc::now();
            let refreshed = CacheEntry { fetched_at, ..cached.clone() };
            self.store(url, &refreshed)?;
            let body = zstd::stream::decode_all(cached.body.as_slice()).context("decompressing cached body")?;
            return Ok(UrlContent { body, etag: cached.etag, strong: cached.strong, fetched_at, approach: FetchApproach::Etag304 });
        }
        if !resp.status().is_success() {
            anyhow::bail!("{url} -> HTTP {}", resp.status());
        }

        let response_etag = resp.headers().get("etag").and_then(|v| v.to_str().ok()).map(str::to_string);
        let body = resp.bytes().await.context("reading response body")?.to_vec();

        if was_probe {
            if let (Some(cached), Some(new_etag)) = (&cached, &response_etag) {
                if cached.etag.as_deref() == Some(new_etag.as_str()) {
                    let cached_body = zstd::stream::decode_all(cached.body.as_slice()).unwrap_or_default();
                    if cached_body != body {
                        let err = crate::errors::Kind::EtagPoisoned { netloc: netloc.to_string() };
                        tracing::warn!(%err, "ETag reused for changed content, blacklisting netloc");
                        alert(err.to_string());
                        self.etag_blacklist.lock().unwrap().insert(netloc.to_string());
                        self.purge_netloc(netloc);
                    }
                }
            }
        }

        let strong = response_etag.as_deref().map(|e| !e.starts_with("W/")).unwrap_or(false);
        let fetched_at = chrono::Utc::now();
        let compressed = zstd::stream::encode_all(body.as_slice(), ZSTD_LEVEL).context("compressing body for cache")?;
        self.store(
            url,
            &CacheEntry { version: CACHE_SCHEMA_VERSION, body: compressed, etag: response_etag.clone(), strong, fetched_at },
        )?;

        Ok(UrlContent { body, etag: response_etag, strong, fetched_at, approach: FetchApproach::Read })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_fetcher() -> (tempfile::TempDir, UrlFetcher) {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = UrlFetcher::new(dir.path(), Default::default()).unwrap();
        (dir, fetcher)
    }

    fn no_alert(_: String) {}

    #[tokio::test]
    async fn fetches_and_caches_body() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("hello").insert_header("etag", "\"abc\""))
            .mount(&server)
            .await;
        let (_dir, fetcher) = temp_fetcher();
        let content = fetcher.fetch(&server.uri(), Duration::from_secs(60), &no_alert).await.unwrap();
        assert_eq!(content.body, b"hello");
        assert_eq!(content.approach, FetchApproach::Read);
        assert_eq!(content.etag.as_deref(), Some("\"abc\""));
        assert!(content.strong);
    }

    #[tokio::test]
    async fn cache_hit_returns_without_new_request() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, fetcher) = temp_fetcher();
        fetcher.fetch(&server.uri(), Duration::from_secs(60), &no_alert).await.unwrap();
        let second = fetcher.fetch(&server.uri(), Duration::from_secs(60), &no_alert).await.unwrap();
        assert_eq!(second.approach, FetchApproach::CacheHit);
    }
}
