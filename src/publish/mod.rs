//! Publisher trait and in-memory retry queue (spec §4.7, §7), grounded on
//! `original_source/ircrssfeedbot/publishers/_base.py`'s retry/requeue behavior.

pub mod github;

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::constants::PUBLISH_ATTEMPTS_MAX;
use crate::entry::Entry;

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    /// Publish `entries` for `scope`. On failure, callers should requeue via
    /// [`RetryQueue`] rather than dropping entries (spec §7 "Publisher failure").
    async fn publish(&self, scope: &str, entries: &[Entry]) -> anyhow::Result<()>;

    /// Drain the in-memory retry queue with unlimited retries (called on graceful
    /// shutdown, spec §4.7).
    async fn drain(&self) -> anyhow::Result<()>;
}

/// Per-publisher in-memory backlog of entries that failed to publish, retried on
/// the next `publish` call for that scope. Kept in-memory only: the original's
/// on-disk publisher cache isn't load-bearing for the core (see DESIGN.md).
pub struct RetryQueue {
    pending: Mutex<VecDeque<(String, Entry)>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self { pending: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, scope: &str, entries: &[Entry]) {
        let mut pending = self.pending.lock().unwrap();
        for entry in entries {
            pending.push_back((scope.to_string(), entry.clone()));
        }
    }

    pub fn take_all(&self) -> Vec<(String, Entry)> {
        self.pending.lock().unwrap().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry `attempt` with exponential backoff up to [`PUBLISH_ATTEMPTS_MAX`] tries,
/// as spec §7 requires for publisher failures.
pub async fn with_backoff<F, Fut>(mut attempt: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut last_err = None;
    for n in 0..PUBLISH_ATTEMPTS_MAX {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(n))).await;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("publish failed with no recorded error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn with_backoff_returns_ok_on_eventual_success() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let result = with_backoff(|| {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("not yet")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
