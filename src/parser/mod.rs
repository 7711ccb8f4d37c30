//! Parser dispatch (spec §4.3): normalize heterogeneous source documents into
//! `RawEntry` lists plus optional follow-URLs.

mod html;
mod jsonpath;
mod syndication;
mod tabular;

use anyhow::Result;

use crate::config::ParserSpec;
use crate::entry::RawEntry;

/// Output of a single parse: the entries found, plus any follow-URLs to fetch
/// and re-parse within the same poll (spec §4.3, §4.5 step 3).
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub entries: Vec<RawEntry>,
    pub follow_urls: Vec<String>,
}

/// A content-format extractor. Each variant owns its own selector grammar, opaque
/// to the dispatcher (spec §4.3).
pub trait Parser: Send {
    fn parse(&self, content: &[u8]) -> Result<ParseOutput>;
}

/// Build the right `Parser` implementation for a feed's configured variant.
pub fn dispatch(spec: &ParserSpec) -> Box<dyn Parser> {
    match spec {
        ParserSpec::Syndication => Box::new(syndication::SyndicationParser),
        ParserSpec::JsonPath { select, follow } => {
            Box::new(jsonpath::JsonPathParser::new(select.clone(), follow.clone()))
        }
        ParserSpec::HtmlSelector { select, follow } => {
            Box::new(html::HtmlSelectorParser::new(select.clone(), follow.clone()))
        }
        ParserSpec::Tabular { select, follow } => {
            Box::new(tabular::TabularParser::new(select.clone(), follow.clone()))
        }
    }
}

/// Run a parser off the async runtime, isolating panics in leaf extraction libraries
/// from the calling Feed Reader task (spec §4.3 isolation, §9: in-process + panic-safe
/// rather than a subprocess pool, since none of our extraction crates are leaky native
/// dependencies).
pub async fn parse_isolated(parser: Box<dyn Parser>, content: Vec<u8>) -> Result<ParseOutput> {
    match tokio::task::spawn_blocking(move || parser.parse(&content)).await {
        Ok(result) => result,
        Err(join_err) => Err(anyhow::anyhow!("parser task panicked: {join_err}")),
    }
}
