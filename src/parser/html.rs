//! HTML-tree extraction parser, grounded on
//! `original_source/ircrssfeedbot/parsers/hext.py` (which wraps the `hext` rule
//! engine). `hext`'s template-based grammar has no direct Rust port in the
//! retrieval pack, so this adopts `scraper`'s CSS selectors with a small
//! pipe-separated convention: `container|title|link|summary|category`, each a
//! CSS selector scoped under `container`; `link` is read from the matched
//! element's `href` attribute (falling back to its text).

use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};

use super::{ParseOutput, Parser};
use crate::entry::RawEntry;

pub struct HtmlSelectorParser {
    select: String,
    follow: Option<String>,
}

impl HtmlSelectorParser {
    pub fn new(select: String, follow: Option<String>) -> Self {
        Self { select, follow }
    }
}

struct Rule {
    container: String,
    title: Option<String>,
    link: Option<String>,
    summary: Option<String>,
    category: Option<String>,
}

fn parse_rule(spec: &str) -> Result<Rule> {
    let parts: Vec<&str> = spec.split('|').collect();
    let Some((container, rest)) = parts.split_first() else {
        bail!("empty html-selector rule");
    };
    let at = |i: usize| rest.get(i).filter(|s| !s.is_empty()).map(|s| s.to_string());
    Ok(Rule {
        container: container.to_string(),
        title: at(0),
        link: at(1),
        summary: at(2),
        category: at(3),
    })
}

fn extract_entries(content: &str, rule: &Rule) -> Result<Vec<RawEntry>> {
    let document = Html::parse_document(content);
    let container_sel = Selector::parse(&rule.container)
        .map_err(|e| anyhow::anyhow!("invalid container selector {:?}: {e:?}", rule.container))?;

    let title_sel = rule
        .title
        .as_deref()
        .map(Selector::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid title selector: {e:?}"))?;
    let link_sel = rule
        .link
        .as_deref()
        .map(Selector::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid link selector: {e:?}"))?;
    let summary_sel = rule
        .summary
        .as_deref()
        .map(Selector::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid summary selector: {e:?}"))?;
    let category_sel = rule
        .category
        .as_deref()
        .map(Selector::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid category selector: {e:?}"))?;

    let mut entries = Vec::new();
    for container in document.select(&container_sel) {
        let title = title_sel
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let link = link_sel
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .and_then(|el| el.value().attr("href").map(str::to_string).or_else(|| Some(el.text().collect())))
            .unwrap_or_default();

        let summary = summary_sel
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string());

        let categories = category_sel
            .as_ref()
            .map(|sel| {
                container
                    .select(sel)
                    .map(|el| html_escape::decode_html_entities(&el.text().collect::<String>()).trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        entries.push(RawEntry { title, link, summary, categories });
    }
    Ok(entries)
}

impl Parser for HtmlSelectorParser {
    fn parse(&self, content: &[u8]) -> Result<ParseOutput> {
        let text = String::from_utf8_lossy(content).into_owned();
        let rule = parse_rule(&self.select).context("parsing html-selector rule")?;
        let entries = extract_entries(&text, &rule)?;

        let follow_urls = if let Some(follow_spec) = &self.follow {
            let follow_rule = parse_rule(follow_spec)?;
            extract_entries(&text, &follow_rule)?
                .into_iter()
                .map(|e| e.link)
                .filter(|l| !l.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        Ok(ParseOutput { entries, follow_urls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_entries_from_simple_markup() {
        let html = r#"
            <html><body>
              <article>
                <h2 class="title">First post</h2>
                <a class="link" href="https://example.com/1">read</a>
                <p class="summary">A summary</p>
                <span class="cat">news</span>
              </article>
            </body></html>
        "#;
        let parser = HtmlSelectorParser::new(
            "article|h2.title|a.link|p.summary|span.cat".to_string(),
            None,
        );
        let output = parser.parse(html.as_bytes()).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].title, "First post");
        assert_eq!(output.entries[0].link, "https://example.com/1");
        assert_eq!(output.entries[0].categories, vec!["news"]);
    }
}
