//! Entry data model (spec §3): `RawEntry` as produced by a `Parser`, `Entry` as
//! carried through the pipeline and posted.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// What a `Parser` hands back before any filtering/formatting is applied.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub categories: Vec<String>,
}

/// A processed entry, carried through the pipeline and eventually posted.
#[derive(Debug, Clone)]
pub struct Entry {
    pub title: String,
    pub long_url: String,
    pub short_url: Option<String>,
    pub summary: Option<String>,
    pub categories: Vec<String>,
    /// The (searchlist_key, matched_text) pair recorded by the allow-list filter, if any.
    pub matched_allow: Option<(String, String)>,
    pub feed: Arc<str>,
    pub scope: Arc<str>,
}

impl Entry {
    pub fn from_raw(raw: RawEntry, feed: Arc<str>, scope: Arc<str>) -> Self {
        Self {
            title: raw.title,
            long_url: unwrap_google_news_link(&raw.link),
            short_url: None,
            summary: raw.summary,
            categories: raw.categories,
            matched_allow: None,
            feed,
            scope,
        }
    }

    /// The URL actually included in the posted message: short if shortened, else long.
    pub fn post_url(&self) -> &str {
        self.short_url.as_deref().unwrap_or(&self.long_url)
    }
}

/// Equality/hash for dedup purposes considers only `long_url` (spec §3 invariant:
/// title changes across polls must not defeat dedup).
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.long_url == other.long_url
    }
}
impl Eq for Entry {}
impl std::hash::Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.long_url.hash(state);
    }
}

static GNEWS_ENCODED_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://news\.google\.com/__i/rss/rd/articles/(?P<encoded_url>[^?]+)").unwrap()
});

/// Decode a Google News redirect-wrapper link to the primary article URL, if applicable.
///
/// Grounded on `original_source/ircrssfeedbot/gnews.py`. Google News wraps article links
/// in an opaque, token-rotating redirect; dedup keys on `long_url`, so leaving it
/// un-decoded would defeat cross-restart dedup whenever Google rotates the wrapper.
pub fn unwrap_google_news_link(url: &str) -> String {
    decode_google_news_url(url).unwrap_or_else(|| url.to_string())
}

fn decode_google_news_url(url: &str) -> Option<String> {
    use base64::Engine;
    let caps = GNEWS_ENCODED_URL_RE.captures(url)?;
    let encoded = &caps["encoded_url"];
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .ok()?;
    // The decoded protobuf-ish blob starts with a short header, then the primary
    // URL, then a trailer byte sequence `\xd2\x01`. We scan for an embedded `http`.
    let text = String::from_utf8_lossy(&decoded);
    let start = text.find("http")?;
    let rest = &text[start..];
    let end = rest.find('\u{d2}').unwrap_or(rest.len());
    let candidate = rest[..end].trim();
    if candidate.starts_with("http") {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Which searchlist key (title/url/category) an allow/block pattern matched against
/// an entry, and the matched text (for allow-list emphasis spans).
pub fn listing<'a>(
    entry: &'a Entry,
    title_patterns: &[Regex],
    url_patterns: &[Regex],
    category_patterns: &[Regex],
) -> Option<(&'static str, regex::Match<'a>)> {
    for re in title_patterns {
        if let Some(m) = re.find(&entry.title) {
            return Some(("title", m));
        }
    }
    for re in url_patterns {
        if let Some(m) = re.find(&entry.long_url) {
            return Some(("url", m));
        }
    }
    for re in category_patterns {
        for category in &entry.categories {
            if let Some(m) = re.find(category) {
                return Some(("category", m));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_title() {
        let a = Entry {
            title: "Title A".into(),
            long_url: "https://example.com/x".into(),
            short_url: None,
            summary: None,
            categories: vec![],
            matched_allow: None,
            feed: "f".into(),
            scope: "s".into(),
        };
        let mut b = a.clone();
        b.title = "Different title".into();
        assert_eq!(a, b);
    }

    #[test]
    fn non_gnews_links_pass_through_unchanged() {
        assert_eq!(
            unwrap_google_news_link("https://example.com/article"),
            "https://example.com/article"
        );
    }
}
