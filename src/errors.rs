//! Error taxonomy for the ingestion core, grouped by remediation rather than origin (spec §7).

use thiserror::Error;

/// Failure kinds a worker loop can catch, alert on, and continue past.
///
/// Every variant is paired with enough context to build an alert message without
/// re-deriving it from the caller's state.
#[derive(Debug, Error)]
pub enum Kind {
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("feed cycle failed for {scope}/{feed}: {source}")]
    FeedCycle {
        scope: String,
        feed: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{url} yielded zero entries")]
    EmptyParse { url: String },

    #[error("failed to send message for {scope}/{feed}: {source}")]
    PostSend {
        scope: String,
        feed: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("publisher {name} failed for {scope}: {source}")]
    Publish {
        name: String,
        scope: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("chat client disconnected")]
    Disconnected,

    #[error("could not regain nick after {attempts} attempts")]
    NickLost { attempts: u32 },

    #[error("etag cache poisoned for netloc {netloc}")]
    EtagPoisoned { netloc: String },
}

pub type Result<T> = std::result::Result<T, Kind>;
