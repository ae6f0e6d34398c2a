//! Match tracker: the periodic poll loop that detects tracked players in live
//! games, posts one live notification per guild and match, and posts a
//! post-game summary once the match has left the live set.
//!
//! One tick runs, in order:
//! 1. retention cleanup of old notification records and orphaned snapshots
//! 2. target enumeration
//! 3. live probe fan-out over the deduplicated probe keys (the only concurrent step)
//! 4. aggregation and live publishing
//! 5. post-game resolution of pending records, using this tick's live set
//!
//! Cross-tick state lives only in the database; every lifecycle write is
//! conditional so overlapping ticks cannot double-post.

pub mod aggregate;
pub mod lifecycle;
pub mod live;
pub mod post_game;
pub mod probe;
pub mod render;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;
use crate::db::repository::{LiveNotificationRepository, TrackedTargetRepository};
use crate::error::AppResult;
use crate::services::discord::Notifier;
use crate::services::riot::StatsApi;

use self::lifecycle::{AbandonReason, RetryPolicy};
use self::live::LivePublish;
use self::post_game::{PostGameResolver, PostOutcome};
use self::probe::ProbeStats;

/// Counters and timings of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub started_at: Option<NaiveDateTime>,
    pub duration_ms: u64,
    pub cleaned_up: u64,
    pub targets: usize,
    pub probe: ProbeStats,
    pub live_matches: usize,
    pub live_posted: usize,
    pub live_skipped: usize,
    pub live_failed: usize,
    pub pending: usize,
    pub post_posted: usize,
    pub post_retrying: usize,
    pub post_abandoned: usize,
    pub tracking_disabled: usize,
    pub errors: usize,
}

impl TickReport {
    fn record_live(&mut self, outcome: LivePublish) {
        match outcome {
            LivePublish::Posted => self.live_posted += 1,
            LivePublish::AlreadyPosted | LivePublish::LostRace => {}
            LivePublish::Skipped => self.live_skipped += 1,
            LivePublish::SendFailed => self.live_failed += 1,
            LivePublish::TrackingDisabled => self.tracking_disabled += 1,
        }
    }

    fn record_post(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Skipped => {}
            PostOutcome::Posted => self.post_posted += 1,
            PostOutcome::Retrying => self.post_retrying += 1,
            PostOutcome::Abandoned(reason) => {
                self.post_abandoned += 1;
                if reason == AbandonReason::PermissionLost {
                    self.tracking_disabled += 1;
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Tracker {
    pool: SqlitePool,
    stats_api: Arc<dyn StatsApi>,
    notifier: Arc<dyn Notifier>,
    config: TrackerConfig,
    last_report: Arc<RwLock<Option<TickReport>>>,
}

impl Tracker {
    pub fn new(
        pool: SqlitePool,
        stats_api: Arc<dyn StatsApi>,
        notifier: Arc<dyn Notifier>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            pool,
            stats_api,
            notifier,
            config,
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// Shared handle to the most recent tick report.
    pub fn reports(&self) -> Arc<RwLock<Option<TickReport>>> {
        self.last_report.clone()
    }

    /// Tick immediately, then every poll interval, until `cancel` fires.
    ///
    /// A tick is bounded by the tick timeout and dropped (with its in-flight
    /// calls) on cancellation. A failed tick is logged; the loop keeps going.
    pub async fn run(self, cancel: CancellationToken) {
        let poll = Duration::from_secs(self.config.poll_interval_seconds.max(1));
        let tick_timeout = Duration::from_secs(self.config.tick_timeout_seconds.max(1));

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            poll_interval_seconds = poll.as_secs(),
            tick_timeout_seconds = tick_timeout.as_secs(),
            "Match tracker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Match tracker cancelled during a tick");
                    break;
                }
                result = tokio::time::timeout(tick_timeout, self.tick()) => match result {
                    Ok(Ok(report)) => {
                        tracing::info!(
                            targets = report.targets,
                            checked = report.probe.checked,
                            in_match = report.probe.in_match,
                            probe_errors = report.probe.errored,
                            live_posted = report.live_posted,
                            post_posted = report.post_posted,
                            post_retrying = report.post_retrying,
                            post_abandoned = report.post_abandoned,
                            duration_ms = report.duration_ms,
                            "Tracker tick complete"
                        );
                        *self.last_report.write().await = Some(report);
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Tracker tick failed: {:?}", e);
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Tracker tick exceeded {}s timeout",
                            tick_timeout.as_secs()
                        );
                    }
                }
            }
        }

        tracing::info!("Match tracker stopped");
    }

    pub async fn tick(&self) -> AppResult<TickReport> {
        self.tick_at(Utc::now().naive_utc()).await
    }

    /// One tick at wall-clock time `now`.
    ///
    /// Failures for one match never stop the others; only failing to list
    /// targets or pending records fails the tick.
    pub async fn tick_at(&self, now: NaiveDateTime) -> AppResult<TickReport> {
        let started = Instant::now();
        let mut report = TickReport {
            started_at: Some(now),
            ..Default::default()
        };

        let cutoff = now - chrono::Duration::hours(self.config.retention_hours as i64);
        match LiveNotificationRepository::cleanup(&self.pool, cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::debug!(deleted, "Removed expired notification records");
                }
                report.cleaned_up = deleted;
            }
            Err(e) => {
                report.errors += 1;
                tracing::warn!("Retention cleanup failed: {:?}", e);
            }
        }

        let targets = TrackedTargetRepository::list_all(&self.pool).await?;
        report.targets = targets.len();

        let keys = aggregate::probe_keys(&targets);
        let outcome =
            probe::probe_all(self.stats_api.as_ref(), keys, self.config.probe_concurrency).await;
        report.probe = outcome.stats;

        let live_set = aggregate::aggregate(&targets, &outcome.games);
        report.live_matches = live_set.len();

        for live_match in live_set.values() {
            match live::publish_live(
                &self.pool,
                self.stats_api.as_ref(),
                self.notifier.as_ref(),
                live_match,
                now,
            )
            .await
            {
                Ok(outcome) => report.record_live(outcome),
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(match_key = %live_match.key, "Live publish failed: {:?}", e);
                }
            }
        }

        let pending = LiveNotificationRepository::list_pending_post(
            &self.pool,
            now,
            self.config.pending_batch_limit,
        )
        .await?;
        report.pending = pending.len();

        let resolver = PostGameResolver {
            pool: &self.pool,
            stats_api: self.stats_api.as_ref(),
            notifier: self.notifier.as_ref(),
            targets: &targets,
            live: &live_set,
            now,
            abandon_after: Duration::from_secs(self.config.abandon_after_seconds),
            policy: RetryPolicy::from_config(&self.config),
        };
        for record in &pending {
            match resolver.resolve(record).await {
                Ok(outcome) => report.record_post(outcome),
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(match_id = %record.match_id, "Post-game resolution failed: {:?}", e);
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}
