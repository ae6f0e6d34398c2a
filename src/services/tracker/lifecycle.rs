//! Notification lifecycle.
//!
//! Records keep their state in nullable columns; the state machine below is
//! derived from those columns at read time. Transitions are pure functions so
//! the resolver only performs the side effects they decide on.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::config::TrackerConfig;
use crate::db::models::{LiveNotification, QueueCategory};
use crate::services::riot::continent_for_platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Record exists, live message not posted yet.
    Detected,
    /// Live message posted, match still in the live set.
    Live,
    /// Left the live set, no post attempt made yet.
    PostPending,
    /// At least one post attempt failed; waiting for the next attempt time.
    PostRetrying,
    Posted,
    Abandoned,
}

impl LifecycleState {
    pub fn of(record: &LiveNotification, still_live: bool) -> Self {
        if record.post_posted_at.is_some() {
            LifecycleState::Posted
        } else if record.post_abandoned_at.is_some() {
            LifecycleState::Abandoned
        } else if !record.has_live_message() {
            LifecycleState::Detected
        } else if still_live {
            LifecycleState::Live
        } else if record.post_attempts > 0 {
            LifecycleState::PostRetrying
        } else {
            LifecycleState::PostPending
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Posted | LifecycleState::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Detected => "detected",
            LifecycleState::Live => "live",
            LifecycleState::PostPending => "post_pending",
            LifecycleState::PostRetrying => "post_retrying",
            LifecycleState::Posted => "posted",
            LifecycleState::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    Timeout,
    UnsupportedQueue,
    NoContinent,
    QueueMismatch,
    PermissionLost,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbandonReason::Timeout => "timeout",
            AbandonReason::UnsupportedQueue => "unsupported_queue",
            AbandonReason::NoContinent => "no_continent_mapping",
            AbandonReason::QueueMismatch => "queue_mismatch",
            AbandonReason::PermissionLost => "permission_lost",
        }
    }
}

/// What the resolver should do with one pending record this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostDecision {
    /// Still live, or nothing left to do.
    Skip,
    Abandon(AbandonReason),
    /// Fetch detail through the given continent host and try to post.
    Resolve { continent: &'static str },
}

/// Backoff settings for post-game retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            base: Duration::from_secs(config.post_retry_base_seconds),
            cap: Duration::from_secs(config.post_retry_max_seconds),
        }
    }

    pub fn delay(&self, attempt: i64) -> Duration {
        post_retry_delay(attempt, self.base, self.cap)
    }
}

/// Delay before retry number `attempt` (1-based): `min(base << min(n-1, 30), cap)`.
pub fn post_retry_delay(attempt: i64, base: Duration, cap: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).clamp(0, 30) as u32;
    base.saturating_mul(1u32 << shift).min(cap)
}

/// Next attempt count and the time it becomes due.
pub fn schedule_retry(
    previous_attempts: i64,
    now: NaiveDateTime,
    policy: &RetryPolicy,
) -> (i64, NaiveDateTime) {
    let attempts = previous_attempts.max(0) + 1;
    let delay = chrono::Duration::from_std(policy.delay(attempts))
        .unwrap_or_else(|_| chrono::Duration::seconds(policy.cap.as_secs() as i64));
    (attempts, now + delay)
}

/// Decide the first step for a record returned by the pending query.
///
/// Order matters: a still-live match is never abandoned, and the timeout wins
/// over every other reason.
pub fn evaluate_pending(
    record: &LiveNotification,
    still_live: bool,
    now: NaiveDateTime,
    abandon_after: Duration,
) -> PostDecision {
    match LifecycleState::of(record, still_live) {
        LifecycleState::PostPending | LifecycleState::PostRetrying => {}
        _ => return PostDecision::Skip,
    }

    let unseen_for = now
        .signed_duration_since(record.last_seen_live_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if unseen_for > abandon_after {
        return PostDecision::Abandon(AbandonReason::Timeout);
    }

    if !QueueCategory::parse(&record.queue_category).supports_post_game() {
        return PostDecision::Abandon(AbandonReason::UnsupportedQueue);
    }

    match continent_for_platform(&record.platform_id) {
        Some(continent) => PostDecision::Resolve { continent },
        None => PostDecision::Abandon(AbandonReason::NoContinent),
    }
}

/// Check the queue reported by the fetched detail.
///
/// `actual` is the category of the detail's queue when it is known locally;
/// an unknown queue keeps the category recorded at live time.
pub fn revalidate_queue(
    record: &LiveNotification,
    detail_queue_id: i64,
    actual: Option<QueueCategory>,
) -> Option<AbandonReason> {
    let category = actual.unwrap_or_else(|| QueueCategory::parse(&record.queue_category));
    if category.supports_post_game() {
        return None;
    }
    if detail_queue_id != record.queue_id {
        Some(AbandonReason::QueueMismatch)
    } else {
        Some(AbandonReason::UnsupportedQueue)
    }
}
