//! Feed Reader (spec §4.5): drives one `(scope, feed)` through poll cycles —
//! fetch → parse → pipeline → group barrier → enqueue.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::config::FeedConfig;
use crate::constants;
use crate::entry::Entry;
use crate::fetch::UrlFetcher;
use crate::parser::{dispatch, parse_isolated};
use crate::pipeline::{self, CompiledFilterLists};
use crate::state::{Latch, RuntimeState};

pub struct Bundle {
    pub scope: Arc<str>,
    pub feed: Arc<str>,
    pub entries: Vec<Entry>,
}

pub struct FeedReaderDeps {
    pub scope: Arc<str>,
    pub feed_name: Arc<str>,
    pub feed: FeedConfig,
    pub fetcher: Arc<UrlFetcher>,
    pub queue: mpsc::Sender<Bundle>,
    pub join_latch: Arc<Latch>,
    pub alerts_join_latch: Arc<Latch>,
    pub group_barrier: Option<Arc<tokio::sync::Barrier>>,
    pub alert: Arc<dyn Fn(String) + Send + Sync>,
    pub once: bool,
    pub active: Arc<std::sync::atomic::AtomicBool>,
    pub state: Arc<RuntimeState>,
}

pub async fn run(deps: FeedReaderDeps) {
    let blacklist = match CompiledFilterLists::compile(&deps.feed.blacklist) {
        Ok(b) => b,
        Err(err) => {
            tracing::error!(%err, feed = %deps.feed_name, "failed to compile blacklist patterns, reader exiting");
            return;
        }
    };
    let whitelist = match CompiledFilterLists::compile(&deps.feed.whitelist) {
        Ok(w) => w,
        Err(err) => {
            tracing::error!(%err, feed = %deps.feed_name, "failed to compile whitelist patterns, reader exiting");
            return;
        }
    };

    deps.join_latch.wait().await;
    deps.alerts_join_latch.wait().await;

    let consecutive_failures = AtomicU32::new(0);
    let mut last_alert: Option<std::time::Instant> = None;
    let mut query_time = tokio::time::Instant::now();

    loop {
        if !deps.active.load(Ordering::SeqCst) {
            return;
        }

        let jitter = constants::period_random_percent() / 100.0;
        let period_hours = deps.feed.period_hours.max(constants::period_hours_min());
        let low = period_hours * (1.0 - jitter);
        let high = period_hours * (1.0 + jitter);
        let drawn_hours = rand::thread_rng().gen_range(low..=high);
        let period = Duration::from_secs_f64(drawn_hours * 3600.0);

        query_time = std::cmp::max(tokio::time::Instant::now(), query_time + period);
        tokio::time::sleep_until(query_time).await;

        match poll_once(&deps, &blacklist, &whitelist).await {
            Ok(()) => {
                consecutive_failures.store(0, Ordering::SeqCst);
            }
            Err(err) => {
                let failures = consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                let should_alert = deps.feed.alerts.read
                    && failures >= constants::MIN_CONSECUTIVE_FEED_FAILURES_FOR_ALERT
                    && last_alert.map(|t| t.elapsed() >= constants::min_feed_interval_for_repeated_alert()).unwrap_or(true);
                if should_alert {
                    (deps.alert)(format!("feed {}/{} failed {failures} times in a row: {err:#}", deps.scope, deps.feed_name));
                    last_alert = Some(std::time::Instant::now());
                } else {
                    tracing::error!(%err, scope = %deps.scope, feed = %deps.feed_name, "feed cycle failed");
                }
            }
        }

        if deps.once {
            return;
        }
    }
}

async fn poll_once(deps: &FeedReaderDeps, blacklist: &CompiledFilterLists, whitelist: &CompiledFilterLists) -> anyhow::Result<()> {
    let mut raw_entries = Vec::new();
    let mut urls: Vec<String> = deps.feed.url.clone();
    let mut i = 0;
    while i < urls.len() {
        let url = urls[i].clone();
        i += 1;

        let content = deps
            .fetcher
            .fetch(
                &url,
                Duration::from_secs_f64(deps.feed.period_hours.max(constants::period_hours_min()) * 3600.0 / 2.0),
                deps.alert.as_ref(),
            )
            .await
            .map_err(|source| crate::errors::Kind::Network { url: url.clone(), source })?;

        let parser = dispatch(&deps.feed.parser);
        let output = parse_isolated(parser, content.body)
            .await
            .map_err(|source| crate::errors::Kind::FeedCycle { scope: deps.scope.to_string(), feed: deps.feed_name.to_string(), source })?;

        if output.entries.is_empty() {
            if deps.feed.alerts.empty {
                (deps.alert)(format!("{url} yielded zero entries"));
            } else {
                tracing::warn!(%url, "zero entries parsed");
            }
        }
        raw_entries.extend(output.entries);
        urls.extend(output.follow_urls);

        if i < urls.len() {
            tokio::time::sleep(constants::SECONDS_BETWEEN_FEED_URLS).await;
        }
    }

    let identity = deps.state.identity().await;
    let entries = pipeline::run(raw_entries, &deps.feed, deps.feed_name.clone(), deps.scope.clone(), &identity, blacklist, whitelist)?;

    if let Some(barrier) = &deps.group_barrier {
        barrier.wait().await;
    }

    let bundle = Bundle { scope: deps.scope.clone(), feed: deps.feed_name.clone(), entries };
    match deps.queue.try_send(bundle) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(bundle)) => {
            (deps.alert)(format!("queue full for {}, falling back to blocking enqueue", deps.scope));
            if deps.queue.send(bundle).await.is_err() {
                tracing::error!(scope = %deps.scope, feed = %deps.feed_name, "poster queue closed, dropping bundle");
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::error!(scope = %deps.scope, feed = %deps.feed_name, "poster queue closed, dropping bundle");
        }
    }

    Ok(())
}

/// Given the feed's newness and dedup scope, the subset of `entries` the poster
/// should actually announce (spec §4.5 "Postability decision").
pub async fn postable_subset(
    dedup: &crate::dedup::DedupStore,
    scope: &str,
    feed: &str,
    dedup_scope: crate::config::DedupScope,
    new_policy: crate::config::NewFeedPolicy,
    entries: Vec<Entry>,
) -> anyhow::Result<(Vec<Entry>, Vec<String>)> {
    let is_new = dedup.is_new_feed(scope, feed).await?;
    let all_urls: Vec<String> = entries.iter().map(|e| e.long_url.clone()).collect();

    let unposted_urls = match dedup_scope {
        crate::config::DedupScope::Channel => dedup.unposted_for_scope(scope, &all_urls).await?,
        crate::config::DedupScope::Feed => dedup.unposted_for_feed(scope, feed, &all_urls).await?,
    };
    let unposted: std::collections::HashSet<&str> = unposted_urls.iter().map(String::as_str).collect();
    let mut unposted_entries: Vec<Entry> = entries.into_iter().filter(|e| unposted.contains(e.long_url.as_str())).collect();

    if is_new {
        if let Some(limit) = constants::new_feed_posts_max(new_policy) {
            unposted_entries.truncate(limit);
        }
    }

    Ok((unposted_entries, unposted_urls))
}
