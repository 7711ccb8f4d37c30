//! Entry Pipeline (spec §4.4): transforms a raw entry list into the final,
//! filtered, formatted, order-deduplicated list. Every stage preserves input
//! order on its retained subset except the final dedup stage (spec §8 property 4).

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{Attribute, FeedConfig};
use crate::entry::{listing, unwrap_google_news_link, Entry, RawEntry};
use crate::util::textwrap::shorten_to_bytes_width;
use crate::util::urlnorm::{escape_spaces, https_upgrade, strip_www};

/// Compiled regex patterns for a feed's filter lists, cached per (scope, feed, list-type)
/// since compilation is comparatively expensive and the patterns are static for the
/// feed's lifetime (spec §4.4 stage 1 note).
pub struct CompiledFilterLists {
    pub title: Vec<Regex>,
    pub url: Vec<Regex>,
    pub category: Vec<Regex>,
}

impl CompiledFilterLists {
    pub fn compile(lists: &crate::config::FilterLists) -> anyhow::Result<Self> {
        let compile_all = |patterns: &[String]| -> anyhow::Result<Vec<Regex>> {
            patterns.iter().map(|p| Ok(Regex::new(p)?)).collect()
        };
        Ok(Self {
            title: compile_all(&lists.title)?,
            url: compile_all(&lists.url)?,
            category: compile_all(&lists.category)?,
        })
    }

    fn is_listed(&self, entry: &Entry) -> Option<(&'static str, String)> {
        listing(entry, &self.title, &self.url, &self.category).map(|(kind, m)| (kind, m.as_str().to_string()))
    }
}

/// Run every configured stage over `raw_entries` for one (scope, feed) poll.
pub fn run(
    raw_entries: Vec<RawEntry>,
    feed: &FeedConfig,
    feed_name: Arc<str>,
    scope: Arc<str>,
    identity: &str,
    blacklist: &CompiledFilterLists,
    whitelist: &CompiledFilterLists,
) -> anyhow::Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = raw_entries
        .into_iter()
        .map(|r| Entry::from_raw(r, feed_name.clone(), scope.clone()))
        .collect();

    entries = dedup_preserve_order(entries);

    // Stage 1: block-list filter.
    if !feed.blacklist.title.is_empty() || !feed.blacklist.url.is_empty() || !feed.blacklist.category.is_empty() {
        entries.retain(|e| blacklist.is_listed(e).is_none());
    }

    // Stage 2: allow-list filter.
    if !feed.whitelist.title.is_empty() || !feed.whitelist.url.is_empty() || !feed.whitelist.category.is_empty() {
        entries = entries
            .into_iter()
            .filter_map(|mut e| {
                let listed = whitelist.is_listed(&e)?;
                if feed.whitelist_explain && listed.0 == "title" {
                    if let Some(idx) = e.title.find(&listed.1) {
                        let end = idx + listed.1.len();
                        e.title = format!("{}*{}*{}", &e.title[..idx], &e.title[idx..end], &e.title[end..]);
                    }
                }
                e.matched_allow = Some((listed.0.to_string(), listed.1));
                Some(e)
            })
            .collect();
    }

    // Stage 3: URL canonicalization.
    for e in &mut entries {
        let mut url = e.long_url.clone();
        url = https_upgrade(&url, feed.https_upgrade);
        url = strip_www(&url, feed.strip_www);
        url = escape_spaces(&url);
        url = unwrap_google_news_link(&url);
        e.long_url = url;
    }

    // Stage 4: substitution.
    apply_substitution(&mut entries, feed.sub.title.as_ref(), |e| &mut e.title)?;
    apply_substitution(&mut entries, feed.sub.url.as_ref(), |e| &mut e.long_url)?;
    apply_substitution(&mut entries, feed.sub.summary.as_ref(), |e| {
        static EMPTY: Lazy<String> = Lazy::new(String::new);
        // Summary is optional; substitution only applies when present.
        if e.summary.is_none() {
            e.summary = Some(EMPTY.clone());
        }
        e.summary.as_mut().unwrap()
    })?;

    // Stage 5: format templates.
    apply_format_templates(&mut entries, feed)?;

    // Stage 6: HTML tag stripping on title and summary.
    for e in &mut entries {
        e.title = strip_html_tags(&e.title);
        if let Some(summary) = &e.summary {
            e.summary = Some(strip_html_tags(summary));
        }
    }

    // Stage 7: typographic normalization.
    for e in &mut entries {
        e.title = normalize_typography(&e.title);
    }

    // Stage 8: byte-width truncation, budgeted against the feed's message format overhead.
    for e in &mut entries {
        let budget = title_budget(feed, &scope, &feed_name, identity, e);
        e.title = shorten_to_bytes_width(&e.title, budget);
    }

    // Stage 9: order-preserving dedup by long_url (again, post-processing may have
    // caused previously distinct entries to collapse onto the same URL).
    entries = dedup_preserve_order(entries);

    Ok(entries)
}

fn dedup_preserve_order(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.long_url.clone()))
        .collect()
}

fn apply_substitution(
    entries: &mut [Entry],
    rule: Option<&crate::config::SubRule>,
    field: impl Fn(&mut Entry) -> &mut String,
) -> anyhow::Result<()> {
    let Some(rule) = rule else { return Ok(()) };
    let re = Regex::new(&rule.pattern)?;
    for e in entries.iter_mut() {
        let f = field(e);
        *f = re.replace_all(f, rule.repl.as_str()).into_owned();
    }
    Ok(())
}

fn apply_format_templates(entries: &mut [Entry], feed: &FeedConfig) -> anyhow::Result<()> {
    if feed.format.str.is_empty() {
        return Ok(());
    }
    for e in entries.iter_mut() {
        let mut params: HashMap<String, String> = HashMap::new();
        params.insert("title".to_string(), e.title.clone());
        params.insert("url".to_string(), e.long_url.clone());

        for (attr, pattern) in &feed.format.re {
            let value = match attr {
                Attribute::Title => &e.title,
                Attribute::Url => &e.long_url,
                Attribute::Summary => e.summary.as_deref().unwrap_or(""),
            };
            if let Ok(re) = Regex::new(pattern) {
                if let Some(caps) = re.captures(value) {
                    for name in re.capture_names().flatten() {
                        if let Some(m) = caps.name(name) {
                            params.insert(name.to_string(), m.as_str().to_string());
                        }
                    }
                }
            }
        }

        if let Some(template) = feed.format.str.get(&Attribute::Title) {
            match format_map(template, &params) {
                Ok(formatted) => e.title = formatted,
                Err(err) => tracing::warn!(%err, template, "title format_map failed, leaving field unchanged"),
            }
        }
        if let Some(template) = feed.format.str.get(&Attribute::Url) {
            match format_map(template, &params) {
                Ok(formatted) => e.long_url = formatted,
                Err(err) => tracing::warn!(%err, template, "url format_map failed, leaving field unchanged"),
            }
        }
    }
    Ok(())
}

/// Render a `{name}`-style template against a parameter map, failing if a referenced
/// name is missing (spec §4.4 stage 5: "a failing format_map logs a warning and
/// leaves the field unchanged").
fn format_map(template: &str, params: &HashMap<String, String>) -> anyhow::Result<String> {
    static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());
    let mut missing = None;
    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => value.clone(),
            None => {
                missing = Some(name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => anyhow::bail!("unknown format placeholder {{{name}}}"),
        None => Ok(rendered.into_owned()),
    }
}

fn strip_html_tags(text: &str) -> String {
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
    html_escape::decode_html_entities(&TAG_RE.replace_all(text, "")).trim().to_string()
}

fn normalize_typography(title: &str) -> String {
    let mut title = strip_outer_curly_quotes(title);
    title = lowercase_capitalize_if_all_caps(&title);
    strip_trailing_period_single_sentence(&title)
}

fn strip_outer_curly_quotes(title: &str) -> String {
    let bytes: Vec<char> = title.chars().collect();
    if bytes.len() >= 2 && bytes[0] == '\u{201c}' && *bytes.last().unwrap() == '\u{201d}' {
        let inner: String = bytes[1..bytes.len() - 1].iter().collect();
        if !inner.contains('\u{201c}') && !inner.contains('\u{201d}') {
            return inner;
        }
    }
    title.to_string()
}

fn lowercase_capitalize_if_all_caps(title: &str) -> String {
    let words: Vec<&str> = title.split_whitespace().collect();
    let has_letters = title.chars().any(|c| c.is_alphabetic());
    let is_all_caps = has_letters && title.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
    if is_all_caps && words.len() >= 2 {
        let mut out = String::new();
        for (i, word) in title.split_whitespace().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
        out
    } else {
        title.to_string()
    }
}

fn strip_trailing_period_single_sentence(title: &str) -> String {
    let sentence_enders = title.matches(['.', '!', '?']).count();
    if sentence_enders == 1 && title.ends_with('.') {
        title.trim_end_matches('.').to_string()
    } else {
        title.to_string()
    }
}

/// Bytes available for the title once both the rendered message template and the
/// raw IRC wire framing (`:{identity} PRIVMSG {channel} :`) are subtracted from
/// the 512-byte line limit (spec §6 "raw 512-byte framing assumed").
fn title_budget(feed: &FeedConfig, scope: &str, feed_name: &str, identity: &str, entry: &Entry) -> usize {
    let template = feed.message.title.as_deref().unwrap_or(crate::constants::MESSAGE_FORMAT_DEFAULT);
    let rendered = template
        .replace("{feed}", feed_name)
        .replace("{channel}", scope)
        .replace("{title}", "")
        .replace("{url}", entry.post_url());
    let framing = format!(":{identity} PRIVMSG {scope} :");
    let base_bytes = framing.len() + rendered.len();
    crate::constants::QUOTE_LEN_MAX.saturating_sub(base_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;

    fn make_feed() -> FeedConfig {
        FeedConfig {
            name: "f".into(),
            url: vec!["https://example.com/feed.xml".into()],
            period_hours: 1.0,
            parser: crate::config::ParserSpec::Syndication,
            blacklist: Default::default(),
            whitelist: Default::default(),
            whitelist_explain: false,
            https_upgrade: true,
            strip_www: true,
            sub: Default::default(),
            format: Default::default(),
            dedup: Default::default(),
            new: Default::default(),
            shorten: true,
            group: None,
            topic: Default::default(),
            alerts: crate::config::AlertGate { read: true, empty: true },
            style: Default::default(),
            message: Default::default(),
        }
    }

    fn raw(title: &str, link: &str) -> RawEntry {
        RawEntry { title: title.to_string(), link: link.to_string(), summary: None, categories: vec![] }
    }

    #[test]
    fn order_is_preserved_and_https_upgraded() {
        let feed = make_feed();
        let empty = CompiledFilterLists::compile(&feed.blacklist).unwrap();
        let entries = run(
            vec![raw("A", "http://www.a.com/1"), raw("B", "http://www.b.com/2")],
            &feed,
            "f".into(),
            "s".into(),
            "bot",
            &empty,
            &CompiledFilterLists::compile(&feed.whitelist).unwrap(),
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].long_url, "https://a.com/1");
        assert_eq!(entries[1].long_url, "https://b.com/2");
    }

    #[test]
    fn block_list_excludes_regardless_of_allow_match() {
        let mut feed = make_feed();
        feed.blacklist.title = vec!["spam".to_string()];
        feed.whitelist.title = vec![".*".to_string()];
        let blacklist = CompiledFilterLists::compile(&feed.blacklist).unwrap();
        let whitelist = CompiledFilterLists::compile(&feed.whitelist).unwrap();
        let entries = run(
            vec![raw("this is spam", "https://a.com/1"), raw("clean", "https://a.com/2")],
            &feed,
            "f".into(),
            "s".into(),
            "bot",
            &blacklist,
            &whitelist,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "clean");
    }

    #[test]
    fn final_dedup_collapses_duplicate_urls() {
        let feed = make_feed();
        let empty = CompiledFilterLists::compile(&feed.blacklist).unwrap();
        let entries = run(
            vec![raw("A", "http://a.com/1"), raw("A again", "http://a.com/1")],
            &feed,
            "f".into(),
            "s".into(),
            "bot",
            &empty,
            &CompiledFilterLists::compile(&feed.whitelist).unwrap(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn truncation_respects_message_budget() {
        let mut feed = make_feed();
        feed.https_upgrade = false;
        feed.strip_www = false;
        let long_title = "word ".repeat(200);
        let empty = CompiledFilterLists::compile(&feed.blacklist).unwrap();
        let entries = run(
            vec![raw(long_title.trim(), "https://example.com/1")],
            &feed,
            "f".into(),
            "s".into(),
            "bot",
            &empty,
            &CompiledFilterLists::compile(&feed.whitelist).unwrap(),
        )
        .unwrap();
        let rendered = format!("[f] {} \u{2192} https://example.com/1", entries[0].title);
        assert!(rendered.len() <= crate::constants::QUOTE_LEN_MAX);
    }
}
