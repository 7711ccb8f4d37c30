//! GitHub searcher, grounded on `original_source/ircrssfeedbot/searchers/github.py`
//! (issue/code search against a tracking repo).

use async_trait::async_trait;
use octocrab::Octocrab;

use super::{SearchQuery, SearchResult, Searcher};

pub struct GithubSearcher {
    repo_owner: String,
    repo_name: String,
    client: Octocrab,
}

impl GithubSearcher {
    pub fn new(repo: &str, token: String) -> anyhow::Result<Self> {
        let (owner, repo_name) = repo
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("searcher repo must be \"owner/name\", got {repo:?}"))?;
        let client = Octocrab::builder().personal_token(token).build()?;
        Ok(Self { repo_owner: owner.to_string(), repo_name: repo_name.to_string(), client })
    }
}

#[async_trait]
impl Searcher for GithubSearcher {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<SearchResult> {
        let search_query = format!("{} repo:{}/{}", query.text, self.repo_owner, self.repo_name);
        let page = self.client.search().issues_and_pull_requests(&search_query).send().await?;
        let summary = if page.items.is_empty() {
            format!("no results for {:?}", query.text)
        } else {
            page.items
                .iter()
                .take(3)
                .map(|item| format!("#{} {}", item.number, item.title))
                .collect::<Vec<_>>()
                .join(" | ")
        };
        Ok(SearchResult { summary })
    }
}
