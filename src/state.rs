//! Process-wide runtime state shared between the Supervisor and workers
//! (spec §9 design note: no global mutable singletons — one `Arc<RuntimeState>`
//! built once and handed to every worker).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::RwLock;

/// A join-latch: settable once per generation, waitable any number of times and
/// by any number of tasks, matching spec §5's "waitable repeatedly and
/// idempotently settable" join-latch. Built over `Notify` + `AtomicBool` since
/// tokio has no ready-made latch primitive (spec §9 design note).
pub struct Latch {
    signalled: std::sync::atomic::AtomicBool,
    notify: tokio::sync::Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self { signalled: std::sync::atomic::AtomicBool::new(false), notify: tokio::sync::Notify::new() }
    }

    pub fn signal(&self) {
        self.signalled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        if self.signalled.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let notified = self.notify.notified();
        if self.signalled.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// The bot's own reported identity (nick!user@host), updated only by the
/// Supervisor's event handlers as login/mode/nick-change events arrive.
pub struct RuntimeState {
    identity: RwLock<String>,
    topics: Mutex<HashMap<String, String>>,
    last_inbound: Mutex<HashMap<String, chrono::DateTime<chrono::Utc>>>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self { identity: RwLock::new(String::new()), topics: Mutex::new(HashMap::new()), last_inbound: Mutex::new(HashMap::new()) }
    }

    pub async fn identity(&self) -> String {
        self.identity.read().await.clone()
    }

    pub async fn set_identity(&self, identity: String) {
        *self.identity.write().await = identity;
    }

    pub fn topic(&self, scope: &str) -> Option<String> {
        self.topics.lock().unwrap().get(scope).cloned()
    }

    pub fn set_topic(&self, scope: &str, topic: String) {
        self.topics.lock().unwrap().insert(scope.to_string(), topic);
    }

    pub fn last_inbound(&self, scope: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_inbound.lock().unwrap().get(scope).copied()
    }

    pub fn touch_inbound(&self, scope: &str) {
        self.last_inbound.lock().unwrap().insert(scope.to_string(), chrono::Utc::now());
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latch_wait_returns_immediately_once_signalled() {
        let latch = Latch::new();
        latch.signal();
        tokio::time::timeout(std::time::Duration::from_millis(50), latch.wait())
            .await
            .expect("wait should not block after signal");
    }

    #[tokio::test]
    async fn latch_wait_blocks_until_signalled() {
        let latch = std::sync::Arc::new(Latch::new());
        let waiter = tokio::spawn({
            let latch = latch.clone();
            async move { latch.wait().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        latch.signal();
        waiter.await.unwrap();
    }

    #[test]
    fn topic_and_inbound_tracking_round_trips() {
        let state = RuntimeState::new();
        assert!(state.topic("#chan").is_none());
        state.set_topic("#chan", "hello".to_string());
        assert_eq!(state.topic("#chan").as_deref(), Some("hello"));
        assert!(state.last_inbound("#chan").is_none());
        state.touch_inbound("#chan");
        assert!(state.last_inbound("#chan").is_some());
    }
}
