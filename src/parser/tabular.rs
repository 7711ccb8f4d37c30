//! Tabular (CSV/TSV) parser, grounded on
//! `original_source/ircrssfeedbot/parsers/pandas.py` (which evaluates a `pandas`
//! reader expression against the body). Rather than embedding an expression
//! evaluator, the selector here names the header columns to project:
//! `title_col,link_col[,summary_col[,category_col]]`.

use anyhow::{bail, Context, Result};

use super::{ParseOutput, Parser};
use crate::entry::RawEntry;

pub struct TabularParser {
    select: String,
    follow: Option<String>,
}

impl TabularParser {
    pub fn new(select: String, follow: Option<String>) -> Self {
        Self { select, follow }
    }

    fn columns(&self) -> Result<(String, String, Option<String>, Option<String>)> {
        let parts: Vec<&str> = self.select.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            bail!("tabular selector must name at least title_col,link_col");
        }
        Ok((
            parts[0].to_string(),
            parts[1].to_string(),
            parts.get(2).map(|s| s.to_string()),
            parts.get(3).map(|s| s.to_string()),
        ))
    }

    fn extract(&self, content: &[u8], title_col: &str, link_col: &str, summary_col: Option<&str>, category_col: Option<&str>) -> Result<Vec<RawEntry>> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(content);
        let headers = reader.headers().context("reading CSV headers")?.clone();
        let index_of = |name: &str| headers.iter().position(|h| h == name);

        let title_idx = index_of(title_col).with_context(|| format!("missing column {title_col:?}"))?;
        let link_idx = index_of(link_col).with_context(|| format!("missing column {link_col:?}"))?;
        let summary_idx = summary_col.and_then(index_of);
        let category_idx = category_col.and_then(index_of);

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.context("reading CSV record")?;
            let title = record.get(title_idx).unwrap_or_default().to_string();
            let link = record.get(link_idx).unwrap_or_default().to_string();
            let summary = summary_idx.and_then(|i| record.get(i)).map(str::to_string);
            let categories = category_idx
                .and_then(|i| record.get(i))
                .map(|s| s.split(';').map(str::trim).filter(|c| !c.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            entries.push(RawEntry { title, link, summary, categories });
        }
        Ok(entries)
    }
}

impl Parser for TabularParser {
    fn parse(&self, content: &[u8]) -> Result<ParseOutput> {
        let (title_col, link_col, summary_col, category_col) = self.columns()?;
        let entries = self.extract(content, &title_col, &link_col, summary_col.as_deref(), category_col.as_deref())?;

        let follow_urls = if let Some(follow_select) = &self.follow {
            let parts: Vec<&str> = follow_select.split(',').map(str::trim).collect();
            if let Some(&col) = parts.first() {
                let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(content);
                let headers = reader.headers().context("reading CSV headers for follow selector")?.clone();
                if let Some(idx) = headers.iter().position(|h| h == col) {
                    reader
                        .records()
                        .filter_map(|r| r.ok())
                        .filter_map(|r| r.get(idx).map(str::to_string))
                        .filter(|s| !s.is_empty())
                        .collect()
                } else {
                    Vec::new()
                }
            } else {
                Vec::new()
            }
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
    fn extracts_rows_via_named_columns() {
        let csv_body = b"title,url,tags\nHello,https://example.com/a,news;tech\n";
        let parser = TabularParser::new("title,url,tags".to_string(), None);
        let output = parser.parse(csv_body).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].title, "Hello");
        assert_eq!(output.entries[0].link, "https://example.com/a");
        assert_eq!(output.entries[0].categories, vec!["news", "tech"]);
    }
}
