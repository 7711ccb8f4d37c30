//! Searcher actor (spec.md's "external collaborator" named in Non-goals but
//! whose request/response handshake is in scope, per SPEC_FULL.md §4.7),
//! grounded on `original_source/ircrssfeedbot/searchers/_base.py`.

pub mod github;

use async_trait::async_trait;

pub struct SearchQuery {
    pub scope: String,
    pub requested_by: String,
    pub text: String,
}

pub struct SearchResult {
    pub summary: String,
}

#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<SearchResult>;
}
