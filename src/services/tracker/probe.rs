use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::models::ProbeKey;
use crate::services::riot::{ActiveGame, StatsApi};

/// Counters for one fan-out run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeStats {
    pub checked: usize,
    pub in_match: usize,
    pub not_in_match: usize,
    pub errored: usize,
}

#[derive(Debug, Default)]
pub struct ProbeOutcome {
    /// Only keys currently in a match are present.
    pub games: HashMap<ProbeKey, ActiveGame>,
    pub stats: ProbeStats,
}

/// Probe every key once, with at most `concurrency` calls in flight.
///
/// Not-found means "not in a match". Other failures are logged and counted
/// but never abort the run.
pub async fn probe_all(
    stats_api: &dyn StatsApi,
    keys: Vec<ProbeKey>,
    concurrency: usize,
) -> ProbeOutcome {
    let outcome = Arc::new(Mutex::new(ProbeOutcome::default()));

    stream::iter(keys)
        .for_each_concurrent(concurrency.max(1), |key| {
            let outcome = outcome.clone();
            async move {
                let result = stats_api.active_game(&key.platform, &key.puuid).await;

                let mut outcome = outcome.lock().await;
                outcome.stats.checked += 1;
                match result {
                    Ok(game) => {
                        outcome.stats.in_match += 1;
                        outcome.games.insert(key, game);
                    }
                    Err(e) if e.is_not_found() => {
                        outcome.stats.not_in_match += 1;
                    }
                    Err(e) => {
                        outcome.stats.errored += 1;
                        tracing::warn!(
                            platform = %key.platform,
                            puuid = %key.puuid,
                            "Live probe failed: {}",
                            e
                        );
                    }
                }
            }
        })
        .await;

    let taken = std::mem::take(&mut *outcome.lock().await);
    taken
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RiotError;
    use crate::services::riot::{LeagueEntry, MatchDetail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Stats API fake keyed by puuid.
    #[derive(Default)]
    pub(crate) struct FakeStats {
        pub live: StdMutex<HashMap<String, ActiveGame>>,
        pub failing: StdMutex<Vec<String>>,
        pub details: StdMutex<HashMap<String, MatchDetail>>,
        /// Remaining match detail calls that fail before the detail is served.
        pub detail_failures: AtomicUsize,
        pub leagues: StdMutex<HashMap<String, Vec<LeagueEntry>>>,
        pub probe_calls: StdMutex<Vec<ProbeKey>>,
        pub detail_calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl StatsApi for FakeStats {
        async fn active_game(&self, platform: &str, puuid: &str) -> Result<ActiveGame, RiotError> {
            self.probe_calls
                .lock()
                .unwrap()
                .push(ProbeKey::new(platform, puuid));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().iter().any(|p| p == puuid) {
                return Err(RiotError::Server { status: 503 });
            }
            self.live
                .lock()
                .unwrap()
                .get(puuid)
                .cloned()
                .ok_or(RiotError::NotFound)
        }

        async fn match_detail(
            &self,
            _continent: &str,
            match_id: &str,
        ) -> Result<MatchDetail, RiotError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.detail_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.detail_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RiotError::Server { status: 502 });
            }
            self.details
                .lock()
                .unwrap()
                .get(match_id)
                .cloned()
                .ok_or(RiotError::NotFound)
        }

        async fn league_entries(
            &self,
            _platform: &str,
            puuid: &str,
        ) -> Result<Vec<LeagueEntry>, RiotError> {
            Ok(self
                .leagues
                .lock()
                .unwrap()
                .get(puuid)
                .cloned()
                .unwrap_or_default())
        }
    }

    pub(crate) fn game(game_id: i64, platform: &str) -> ActiveGame {
        ActiveGame {
            game_id,
            game_queue_config_id: 420,
            map_id: 11,
            platform_id: platform.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn counts_each_outcome_kind() {
        let fake = FakeStats::default();
        fake.live
            .lock()
            .unwrap()
            .insert("a".into(), game(1001, "NA1"));
        fake.failing.lock().unwrap().push("c".into());

        let keys = vec![
            ProbeKey::new("na1", "a"),
            ProbeKey::new("na1", "b"),
            ProbeKey::new("na1", "c"),
        ];
        let outcome = probe_all(&fake, keys, 4).await;

        assert_eq!(
            outcome.stats,
            ProbeStats {
                checked: 3,
                in_match: 1,
                not_in_match: 1,
                errored: 1
            }
        );
        assert_eq!(
            outcome.games[&ProbeKey::new("na1", "a")].game_id,
            1001
        );
        assert_eq!(outcome.games.len(), 1);
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let fake = FakeStats::default();
        let keys: Vec<_> = (0..20)
            .map(|i| ProbeKey::new("euw1", &format!("p{}", i)))
            .collect();

        let outcome = probe_all(&fake, keys, 3).await;
        assert_eq!(outcome.stats.checked, 20);
        assert!(fake.max_in_flight.load(Ordering::SeqCst) <= 3);
    }
}
