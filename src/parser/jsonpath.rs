//! JSON-path parser, grounded on `original_source/ircrssfeedbot/parsers/jmespath.py`.

use anyhow::{Context, Result};

use super::{ParseOutput, Parser};
use crate::entry::RawEntry;

pub struct JsonPathParser {
    select: String,
    follow: Option<String>,
}

impl JsonPathParser {
    pub fn new(select: String, follow: Option<String>) -> Self {
        Self { select, follow }
    }

    fn run_expression(&self, expr: &str, content: &serde_json::Value) -> Result<serde_json::Value> {
        let compiled = jmespath::compile(expr).with_context(|| format!("compiling expression {expr:?}"))?;
        let var = jmespath::Variable::try_from(content.clone()).context("converting JSON to jmespath variable")?;
        let result = compiled.search(&var).with_context(|| format!("evaluating expression {expr:?}"))?;
        serde_json::to_value(&*result).context("converting jmespath result back to JSON")
    }
}

impl Parser for JsonPathParser {
    fn parse(&self, content: &[u8]) -> Result<ParseOutput> {
        let doc: serde_json::Value = serde_json::from_slice(content).context("parsing JSON body")?;
        let matched = self.run_expression(&self.select, &doc)?;
        let entries = matched
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(raw_entry_from_json)
            .collect();

        let follow_urls = if let Some(follow_expr) = &self.follow {
            let matched = self.run_expression(follow_expr, &doc)?;
            matched
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Object(o) => o.get("url").and_then(|u| u.as_str()).map(str::to_string),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(ParseOutput { entries, follow_urls })
    }
}

fn raw_entry_from_json(v: serde_json::Value) -> RawEntry {
    let title = v.get("title").and_then(|x| x.as_str()).unwrap_or_default().to_string();
    let link = v.get("link").and_then(|x| x.as_str()).unwrap_or_default().to_string();
    let summary = v.get("summary").and_then(|x| x.as_str()).map(str::to_string);
    let categories = match v.get("category") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => {
            items.iter().filter_map(|c| c.as_str().map(str::to_string)).collect()
        }
        _ => Vec::new(),
    };
    RawEntry { title, link, summary, categories }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_entries_via_jmespath_selector() {
        let parser = JsonPathParser::new("items[*]".to_string(), None);
        let body = br#"{"items": [{"title": "A", "link": "https://example.com/a", "category": ["x", "y"]}]}"#;
        let output = parser.parse(body).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].title, "A");
        assert_eq!(output.entries[0].categories, vec!["x", "y"]);
    }
}
