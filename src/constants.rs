//! Process-wide tunables (spec §6, §9). Mirrors
//! `original_source/ircrssfeedbot/config.py`'s module-level constants.

use std::time::Duration;

pub fn env_is_dev() -> bool {
    std::env::var("FEEDCASTER_ENV")
        .map(|v| v == "dev")
        .unwrap_or(false)
}

pub const ALERTS_CHANNEL_FORMAT_DEFAULT: &str = "##{nick}-alerts";
pub const DEDUP_STRATEGY_DEFAULT: &str = "channel";
pub const ETAG_TEST_PROBABILITY: f64 = 0.1;
pub const MESSAGE_FORMAT_DEFAULT: &str = "[{feed}] {title} \u{2192} {url}";
pub const MIN_CONSECUTIVE_FEED_FAILURES_FOR_ALERT: u32 = 3;
pub const QUOTE_LEN_MAX: usize = 510; // Leaving 2 bytes for "\r\n".
pub const READ_ATTEMPTS_MAX: u32 = 3;
pub const SECONDS_PER_MESSAGE: Duration = Duration::from_secs(2);
pub const SECONDS_BETWEEN_FEED_URLS: Duration = Duration::from_millis(500);
pub const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:71.0) Gecko/20100101 Firefox/71.0";

pub fn request_timeout() -> Duration {
    Duration::from_secs(90)
}

pub fn period_hours_min() -> f64 {
    if env_is_dev() {
        0.0001
    } else {
        0.2
    }
}

pub fn period_random_percent() -> f64 {
    if env_is_dev() {
        20.0
    } else {
        5.0
    }
}

pub fn min_channel_idle_time_default() -> Duration {
    if env_is_dev() {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(15 * 60)
    }
}

pub fn min_feed_interval_for_repeated_alert() -> Duration {
    Duration::from_secs(3600)
}

pub fn new_feed_posts_max(policy: crate::config::NewFeedPolicy) -> Option<usize> {
    use crate::config::NewFeedPolicy::*;
    match policy {
        None => Some(0),
        Some3 => Some(3),
        All => std::option::Option::None,
    }
}

pub const PUBLISH_ATTEMPTS_MAX: u32 = 5;
