//! Syndication-XML parser (RSS/Atom), grounded on the teacher's `feed-rs` usage
//! and `original_source/ircrssfeedbot/parsers/feedparser.py`.

use std::io::Cursor;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ParseOutput, Parser};
use crate::entry::RawEntry;

pub struct SyndicationParser;

impl Parser for SyndicationParser {
    fn parse(&self, content: &[u8]) -> Result<ParseOutput> {
        let sanitized = sanitize_xml(content);
        let feed = feed_rs::parser::parse(Cursor::new(sanitized.as_bytes()))
            .context("parsing syndication feed")?;
        let entries = feed.entries.into_iter().map(raw_entry_from_feed_rs).collect();
        Ok(ParseOutput { entries, follow_urls: Vec::new() })
    }
}

fn raw_entry_from_feed_rs(e: feed_rs::model::Entry) -> RawEntry {
    let title = e
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "[no title]".to_string());

    let link = e
        .links
        .iter()
        .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let summary = e.summary.as_ref().map(|s| s.content.clone());

    let categories = e
        .categories
        .iter()
        .filter_map(|c| {
            let term = c.term.trim();
            (!term.is_empty()).then(|| term.to_string())
        })
        .collect();

    RawEntry { title, link, summary, categories }
}

/// Strip stray unescaped `&` characters that otherwise make the XML parser choke
/// (spec §4.3: "malformed-XML recovery pass removes stray unescaped ampersands").
fn sanitize_xml(content: &[u8]) -> String {
    static STRAY_AMPERSAND_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"&(?!amp;|lt;|gt;|quot;|apos;|#\d+;|#x[0-9a-fA-F]+;)").unwrap());
    let text = String::from_utf8_lossy(content);
    STRAY_AMPERSAND_RE.replace_all(&text, "&amp;").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_stray_ampersands_but_keeps_valid_entities() {
        let input = b"Cats & Dogs &amp; Mice &#65;";
        let sanitized = sanitize_xml(input);
        assert_eq!(sanitized, "Cats &amp; Dogs &amp; Mice &#65;");
    }

    #[test]
    fn parses_basic_rss_feed() {
        let rss = br#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<item><title>Hello</title><link>https://example.com/a</link><category>news</category></item>
</channel></rss>"#;
        let output = SyndicationParser.parse(rss).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].title, "Hello");
        assert_eq!(output.entries[0].link, "https://example.com/a");
        assert_eq!(output.entries[0].categories, vec!["news"]);
    }
}
