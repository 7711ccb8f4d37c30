//! GitHub publisher, grounded on `original_source/ircrssfeedbot/publishers/github.py`
//! (which files each posted entry as an issue comment / commit note on a tracking
//! repo). `octocrab` is adopted as the closest ecosystem equivalent to the
//! original's `PyGithub` (no direct Rust analogue in the retrieval pack).

use async_trait::async_trait;
use octocrab::Octocrab;

use super::{with_backoff, Publisher, RetryQueue};
use crate::entry::Entry;

pub struct GithubPublisher {
    name: String,
    repo_owner: String,
    repo_name: String,
    client: Octocrab,
    retry: RetryQueue,
}

impl GithubPublisher {
    pub fn new(name: String, repo: &str, token: String) -> anyhow::Result<Self> {
        let (owner, repo_name) = repo
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("publisher repo must be \"owner/name\", got {repo:?}"))?;
        let client = Octocrab::builder().personal_token(token).build()?;
        Ok(Self { name, repo_owner: owner.to_string(), repo_name: repo_name.to_string(), client, retry: RetryQueue::new() })
    }

    async fn file_entry(&self, scope: &str, entry: &Entry) -> anyhow::Result<()> {
        let body = format!("**{}**\n\n{}\n\nscope: {scope}", entry.title, entry.post_url());
        self.client
            .issues(&self.repo_owner, &self.repo_name)
            .create(format!("[{scope}] {}", entry.title))
            .body(body)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for GithubPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, scope: &str, entries: &[Entry]) -> anyhow::Result<()> {
        // Retry anything left over from a previous failed publish before filing
        // the new batch, so a backlog doesn't sit untouched until shutdown drain.
        for (backlog_scope, entry) in self.retry.take_all() {
            if let Err(err) = with_backoff(|| self.file_entry(&backlog_scope, &entry)).await {
                tracing::warn!(%err, scope = backlog_scope, title = %entry.title, "github publish retry failed, requeueing");
                self.retry.push(&backlog_scope, std::slice::from_ref(&entry));
            }
        }

        for entry in entries {
            let result = with_backoff(|| self.file_entry(scope, entry)).await;
            if let Err(err) = result {
                tracing::warn!(%err, scope, title = %entry.title, "github publish failed, requeueing");
                self.retry.push(scope, std::slice::from_ref(entry));
            }
        }
        Ok(())
    }

    async fn drain(&self) -> anyhow::Result<()> {
        loop {
            if self.retry.is_empty() {
                return Ok(());
            }
            for (scope, entry) in self.retry.take_all() {
                loop {
                    match self.file_entry(&scope, &entry).await {
                        Ok(()) => break,
                        Err(err) => {
                            tracing::warn!(%err, scope, "drain retry failed, retrying");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }
    }
}
