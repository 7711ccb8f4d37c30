//! Channel Poster (spec §4.6): dequeues bundles, waits for idle-time and the
//! global outgoing-rate lock, posts, updates topic, and marks entries posted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::chat::ChatClient;
use crate::config::FeedConfig;
use crate::constants;
use crate::dedup::DedupStore;
use crate::feed_reader::{postable_subset, Bundle};
use crate::state::{Latch, RuntimeState};

pub struct PosterDeps {
    pub scope: Arc<str>,
    pub feeds: HashMap<String, FeedConfig>,
    pub queue: mpsc::Receiver<Bundle>,
    pub join_latch: Arc<Latch>,
    pub alerts_join_latch: Arc<Latch>,
    pub dedup: Arc<DedupStore>,
    pub chat: Arc<dyn ChatClient>,
    pub outgoing_rate_lock: Arc<Mutex<()>>,
    /// The scope's busy-lock (spec §4.6 step 6/9). Acquired for the duration of
    /// sending a bundle; the Supervisor's shutdown path acquires the same lock
    /// to wait for in-flight posts to finish before draining publishers.
    pub busy_lock: Arc<Mutex<()>>,
    pub state: Arc<RuntimeState>,
    pub alert: Arc<dyn Fn(String) + Send + Sync>,
    pub publishers: Vec<Arc<dyn crate::publish::Publisher>>,
    /// Destination scope that receives a copy of every posted message, over the
    /// same chat client (spec §6 `mirror`; Open Question resolution: no separate
    /// dedup scope of its own, see DESIGN.md).
    pub mirror_scope: Option<String>,
}

pub async fn run(mut deps: PosterDeps) {
    deps.join_latch.wait().await;
    deps.alerts_join_latch.wait().await;

    while let Some(bundle) = deps.queue.recv().await {
        if let Err(err) = handle_bundle(&deps, bundle).await {
            (deps.alert)(format!("posting failed for {}: {err:#}", deps.scope));
        }
    }
}

async fn handle_bundle(deps: &PosterDeps, bundle: Bundle) -> anyhow::Result<()> {
    let feed = deps
        .feeds
        .get(bundle.feed.as_ref())
        .ok_or_else(|| anyhow::anyhow!("unknown feed {} in scope {}", bundle.feed, deps.scope))?;

    let (postable, unposted_urls) =
        postable_subset(&deps.dedup, &deps.scope, &bundle.feed, feed.dedup, feed.new, bundle.entries).await?;

    let min_idle = if feed.period_hours <= constants::period_hours_min() {
        Duration::ZERO
    } else {
        constants::min_channel_idle_time_default()
    };

    if postable.is_empty() {
        deps.dedup.insert_posted(&deps.scope, &bundle.feed, &unposted_urls).await?;
        return Ok(());
    }

    loop {
        let guard = deps.outgoing_rate_lock.lock().await;
        let idle_elapsed = deps
            .state
            .last_inbound(&deps.scope)
            .map(|t| chrono::Utc::now().signed_duration_since(t).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::MAX);
        let sleep_for = min_idle.saturating_sub(idle_elapsed);
        if sleep_for.is_zero() {
            drop(guard);
            break;
        }
        drop(guard);
        tokio::time::sleep(sleep_for).await;
    }

    while !deps.chat.connected() {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    let _busy_guard = deps.busy_lock.lock().await;
    let _rate_guard = deps.outgoing_rate_lock.lock().await;

    for entry in &postable {
        let rule = feed.style.get(bundle.feed.as_ref());
        let styled_title = crate::style::style(&entry.title, rule);
        let template = feed.message.title.as_deref().unwrap_or(constants::MESSAGE_FORMAT_DEFAULT);
        let message = template
            .replace("{feed}", &bundle.feed)
            .replace("{channel}", &deps.scope)
            .replace("{title}", &styled_title)
            .replace("{url}", entry.post_url());

        deps.chat
            .msg(&deps.scope, &message)
            .await
            .map_err(|source| crate::errors::Kind::PostSend { scope: deps.scope.to_string(), feed: bundle.feed.to_string(), source })?;

        if let Some(mirror_scope) = &deps.mirror_scope {
            let _ = deps.chat.msg(mirror_scope, &message).await;
        }

        if let Some(new_topic) = compute_topic_update(feed, deps.state.topic(&deps.scope).as_deref(), entry) {
            let _ = deps.chat.quote(irc::client::prelude::Command::TOPIC(deps.scope.to_string(), Some(new_topic.clone()))).await;
            deps.state.set_topic(&deps.scope, new_topic);
        }

        tokio::time::sleep(constants::SECONDS_PER_MESSAGE).await;
    }

    deps.dedup.insert_posted(&deps.scope, &bundle.feed, &unposted_urls).await?;

    for publisher in &deps.publishers {
        if let Err(err) = publisher.publish(&deps.scope, &postable).await {
            tracing::warn!(%err, scope = %deps.scope, "publisher failed, entries queued for retry");
        }
    }

    Ok(())
}

/// Topic segments are `key: value` pairs keyed by per-feed `topic.{key: regex}`
/// rules, joined with ` | ` (spec §4.6 step 6).
fn compute_topic_update(feed: &FeedConfig, current_topic: Option<&str>, entry: &crate::entry::Entry) -> Option<String> {
    if feed.topic.is_empty() {
        return None;
    }
    let mut segments: HashMap<String, String> = current_topic
        .unwrap_or("")
        .split(" | ")
        .filter_map(|segment| segment.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut changed = false;
    for (key, pattern) in &feed.topic {
        if let Ok(re) = regex::Regex::new(pattern) {
            if let Some(m) = re.find(&entry.title) {
                let value = m.as_str().to_string();
                if segments.get(key) != Some(&value) {
                    segments.insert(key.clone(), value);
                    changed = true;
                }
            }
        }
    }

    if !changed {
        return None;
    }
    let mut keys: Vec<&String> = segments.keys().collect();
    keys.sort();
    Some(keys.into_iter().map(|k| format!("{k}: {}", segments[k])).collect::<Vec<_>>().join(" | "))
}

