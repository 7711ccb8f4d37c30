//! Supervisor (spec §4.7): owns the chat client, wires inbound events to
//! channel state, dispatches admin commands, coordinates graceful shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::chat::{ChatClient, ChatEvent, IrcChatClient};
use crate::config::Config;
use crate::dedup::DedupStore;
use crate::errors::Kind;
use crate::feed_reader::{self, Bundle, FeedReaderDeps};
use crate::fetch::UrlFetcher;
use crate::poster::{self, PosterDeps};
use crate::publish::Publisher;
use crate::search::Searcher;
use crate::state::{Latch, RuntimeState};
use crate::util::glob::AdminMatcher;

/// Set once the chat client has connected; the event handler closure captures
/// this before the client exists, so regain commands read through the cell.
type ChatHandle = Arc<std::sync::Mutex<Option<Arc<dyn ChatClient>>>>;

const NICK_REGAIN_MAX_ATTEMPTS: u32 = 3;
const NICK_REGAIN_WINDOW: std::time::Duration = std::time::Duration::from_secs(30);

pub struct Supervisor {
    config: Arc<Config>,
    state: Arc<RuntimeState>,
    admin: Arc<AdminMatcher>,
    active: Arc<AtomicBool>,
    searcher: Option<Arc<dyn Searcher>>,
    publishers: Vec<Arc<dyn Publisher>>,
    scope_busy_locks: HashMap<String, Arc<Mutex<()>>>,
}

impl Supervisor {
    pub fn new(config: Arc<Config>, searcher: Option<Arc<dyn Searcher>>, publishers: Vec<Arc<dyn Publisher>>) -> anyhow::Result<Self> {
        let admin = Arc::new(AdminMatcher::new(&config.admin)?);
        let scope_busy_locks = config.feeds.keys().map(|scope| (scope.clone(), Arc::new(Mutex::new(())))).collect();
        Ok(Self {
            config,
            state: Arc::new(RuntimeState::new()),
            admin,
            active: Arc::new(AtomicBool::new(true)),
            searcher,
            publishers,
            scope_busy_locks,
        })
    }

    /// Build every worker, connect the chat client, and run until an exit code
    /// is received. Returns the process exit code.
    pub async fn run(self: Arc<Self>, dedup: Arc<DedupStore>, fetcher: Arc<UrlFetcher>) -> anyhow::Result<i32> {
        let (exit_tx, mut exit_rx) = mpsc::channel::<i32>(1);

        let join_latches: HashMap<String, Arc<Latch>> =
            self.config.feeds.keys().map(|scope| (scope.clone(), Arc::new(Latch::new()))).collect();
        let alerts_latch = join_latches
            .get(&self.config.alerts_channel)
            .cloned()
            .unwrap_or_else(|| Arc::new(Latch::new()));

        let outgoing_rate_lock = Arc::new(Mutex::new(()));

        let mut group_parties: HashMap<String, usize> = HashMap::new();
        for feeds in self.config.feeds.values() {
            for feed in feeds.values() {
                if let Some(group) = &feed.group {
                    *group_parties.entry(group.clone()).or_insert(0) += 1;
                }
            }
        }
        let group_barriers: HashMap<String, Arc<tokio::sync::Barrier>> =
            group_parties.into_iter().map(|(group, n)| (group, Arc::new(tokio::sync::Barrier::new(n)))).collect();

        let mut queues: HashMap<String, (mpsc::Sender<Bundle>, mpsc::Receiver<Bundle>)> = HashMap::new();
        for (scope, feeds) in &self.config.feeds {
            let capacity = (feeds.len() * 2).max(1);
            let (tx, rx) = mpsc::channel(capacity);
            queues.insert(scope.clone(), (tx, rx));
        }

        let state_for_events = self.state.clone();
        let active_for_events = self.active.clone();
        let join_latches_for_events = join_latches.clone();
        let admin_for_events = self.admin.clone();
        let searcher_for_events = self.searcher.clone();
        let exit_tx_for_events = exit_tx.clone();
        let config_for_events = self.config.clone();
        let nick_regain_attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let nick_regain_window_start = Arc::new(std::sync::Mutex::new(std::time::Instant::now()));
        let chat_handle: ChatHandle = Arc::new(std::sync::Mutex::new(None));
        let chat_handle_for_events = chat_handle.clone();

        let channels: Vec<String> = self.config.feeds.keys().cloned().collect();
        let chat: Arc<dyn ChatClient> = IrcChatClient::connect(
            self.config.host.clone(),
            self.config.ssl_port,
            self.config.nick.clone(),
            self.config.nick_password.clone(),
            true,
            channels,
            move |event| {
                handle_event(
                    event,
                    &state_for_events,
                    &active_for_events,
                    &join_latches_for_events,
                    &admin_for_events,
                    &searcher_for_events,
                    &exit_tx_for_events,
                    &config_for_events,
                    &chat_handle_for_events,
                    &nick_regain_attempts,
                    &nick_regain_window_start,
                );
            },
        )
        .await?;
        *chat_handle.lock().unwrap() = Some(chat.clone());

        let alert_fn: Arc<dyn Fn(String) + Send + Sync> = {
            let chat = chat.clone();
            let alerts_channel = self.config.alerts_channel.clone();
            Arc::new(move |message: String| {
                tracing::warn!(%message, "alert");
                let chat = chat.clone();
                let alerts_channel = alerts_channel.clone();
                tokio::spawn(async move {
                    let _ = chat.msg(&alerts_channel, &message).await;
                });
            })
        };

        for (scope, feeds) in &self.config.feeds {
            let (tx, _rx) = &queues[scope];
            for (feed_name, feed) in feeds {
                let group_barrier = feed.group.as_ref().and_then(|g| group_barriers.get(g)).cloned();
                let deps = FeedReaderDeps {
                    scope: Arc::from(scope.as_str()),
                    feed_name: Arc::from(feed_name.as_str()),
                    feed: feed.clone(),
                    fetcher: fetcher.clone(),
                    queue: tx.clone(),
                    join_latch: join_latches[scope].clone(),
                    alerts_join_latch: alerts_latch.clone(),
                    group_barrier,
                    alert: alert_fn.clone(),
                    once: self.config.once,
                    active: self.active.clone(),
                    state: self.state.clone(),
                };
                tokio::spawn(feed_reader::run(deps));
            }
        }

        for (scope, (_tx, rx)) in queues {
            let deps = PosterDeps {
                scope: Arc::from(scope.as_str()),
                feeds: self.config.feeds[&scope].clone(),
                queue: rx,
                join_latch: join_latches[&scope].clone(),
                alerts_join_latch: alerts_latch.clone(),
                dedup: dedup.clone(),
                chat: chat.clone(),
                outgoing_rate_lock: outgoing_rate_lock.clone(),
                busy_lock: self.scope_busy_locks[&scope].clone(),
                state: self.state.clone(),
                alert: alert_fn.clone(),
                publishers: self.publishers.clone(),
                mirror_scope: self.config.mirror.clone().filter(|_| scope != self.config.alerts_channel),
            };
            tokio::spawn(poster::run(deps));
        }

        let exit_code = exit_rx.recv().await.unwrap_or(0);
        self.active.store(false, Ordering::SeqCst);

        for lock in self.scope_busy_locks.values() {
            let _ = lock.lock().await;
        }
        for publisher in &self.publishers {
            if let Err(err) = publisher.drain().await {
                tracing::error!(%err, "publisher drain failed during shutdown");
            }
        }

        Ok(exit_code)
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_event(
    event: ChatEvent,
    state: &Arc<RuntimeState>,
    active: &Arc<AtomicBool>,
    join_latches: &HashMap<String, Arc<Latch>>,
    admin: &Arc<AdminMatcher>,
    searcher: &Option<Arc<dyn Searcher>>,
    exit_tx: &mpsc::Sender<i32>,
    config: &Arc<Config>,
    chat_handle: &ChatHandle,
    nick_regain_attempts: &Arc<std::sync::atomic::AtomicU32>,
    nick_regain_window_start: &Arc<std::sync::Mutex<std::time::Instant>>,
) {
    if !active.load(Ordering::SeqCst) {
        return;
    }
    match event {
        ChatEvent::Topic { scope, topic } => state.set_topic(&scope, topic),
        ChatEvent::Joined { scope } => {
            state.touch_inbound(&scope);
            if let Some(latch) = join_latches.get(&scope) {
                latch.signal();
            }
        }
        ChatEvent::Privmsg { from, target, text } => {
            state.touch_inbound(&target);
            if admin.matches(&from) {
                let exit_tx = exit_tx.clone();
                let trimmed = text.trim();
                if trimmed == "exit" {
                    tokio::spawn(async move {
                        let _ = exit_tx.send(0).await;
                    });
                } else if trimmed == "fail" {
                    tokio::spawn(async move {
                        let _ = exit_tx.send(1).await;
                    });
                } else if let Some(query_text) = trimmed.strip_prefix("search ") {
                    if let Some(searcher) = searcher.clone() {
                        let reply_scope = target.clone();
                        let chat = chat_handle.lock().unwrap().clone();
                        let query = crate::search::SearchQuery { scope: target, requested_by: from, text: query_text.to_string() };
                        tokio::spawn(async move {
                            match searcher.search(&query).await {
                                Ok(result) => {
                                    if let Some(chat) = chat {
                                        let _ = chat.msg(&reply_scope, &result.summary).await;
                                    }
                                }
                                Err(err) => tracing::warn!(%err, "search dispatch failed"),
                            }
                        });
                    }
                }
            }
        }
        ChatEvent::LoggedIn { identity } => {
            let state = state.clone();
            tokio::spawn(async move { state.set_identity(identity).await });
        }
        ChatEvent::NickChanged { new_nick } => {
            let state = state.clone();
            tokio::spawn(async move { state.set_identity(new_nick).await });
        }
        ChatEvent::ModeChanged { .. } => {}
        ChatEvent::NickInUse | ChatEvent::NickServError { .. } => {
            let mut window_start = nick_regain_window_start.lock().unwrap();
            if window_start.elapsed() > NICK_REGAIN_WINDOW {
                nick_regain_attempts.store(0, Ordering::SeqCst);
                *window_start = std::time::Instant::now();
            }
            drop(window_start);

            let attempts = nick_regain_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let chat = chat_handle.lock().unwrap().clone();

            if attempts > NICK_REGAIN_MAX_ATTEMPTS {
                let err = Kind::NickLost { attempts };
                tracing::error!(%err, "nick regain exhausted");
                if let Some(chat) = chat {
                    let alerts_channel = config.alerts_channel.clone();
                    let message = err.to_string();
                    tokio::spawn(async move {
                        let _ = chat.msg(&alerts_channel, &message).await;
                    });
                }
                let exit_tx = exit_tx.clone();
                tokio::spawn(async move {
                    let _ = exit_tx.send(1).await;
                });
            } else if let Some(chat) = chat {
                // Try NickServ recovery first, then reclaim the nick outright.
                let nick = config.nick.clone();
                let nick_password = config.nick_password.clone();
                tokio::spawn(async move {
                    if let Some(password) = nick_password {
                        let _ = chat.msg("NickServ", &format!("GHOST {nick} {password}")).await;
                    }
                    let _ = chat.quote(irc::client::prelude::Command::NICK(nick)).await;
                });
            }
        }
        ChatEvent::Notice { .. } => {}
    }
}
