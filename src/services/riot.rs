use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::RiotConfig;
use crate::error::{AppError, AppResult, RiotError};
use crate::services::rate_limiter::RateLimiter;

// ============================================================================
// Response models
// ============================================================================

/// Spectator-v5 active game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveGame {
    pub game_id: i64,
    pub game_queue_config_id: i64,
    pub map_id: i64,
    pub platform_id: String,
    pub game_mode: String,
    pub game_start_time: i64,
    pub game_length: i64,
    pub participants: Vec<ActiveParticipant>,
}

impl ActiveGame {
    pub fn participant(&self, puuid: &str) -> Option<&ActiveParticipant> {
        self.participants
            .iter()
            .find(|p| p.puuid.as_deref() == Some(puuid))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveParticipant {
    /// Bots have no puuid.
    pub puuid: Option<String>,
    pub riot_id: Option<String>,
    pub champion_id: i64,
    pub team_id: i64,
    pub spell1_id: i64,
    pub spell2_id: i64,
    pub perks: Option<ActivePerks>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivePerks {
    pub perk_ids: Vec<i64>,
    pub perk_style: i64,
    pub perk_sub_style: i64,
}

/// Match-v5 match detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchDetail {
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

impl MatchDetail {
    pub fn participant(&self, puuid: &str) -> Option<&MatchParticipant> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchMetadata {
    pub match_id: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchInfo {
    pub game_id: i64,
    pub queue_id: i64,
    pub map_id: i64,
    pub platform_id: String,
    pub game_mode: String,
    /// Seconds.
    pub game_duration: i64,
    pub game_creation: i64,
    pub game_end_timestamp: Option<i64>,
    pub participants: Vec<MatchParticipant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchParticipant {
    pub puuid: String,
    pub riot_id_game_name: Option<String>,
    pub riot_id_tagline: Option<String>,
    pub champion_id: i64,
    pub champion_name: String,
    pub team_id: i64,
    pub team_position: String,
    pub win: bool,
    pub game_ended_in_early_surrender: bool,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub champ_level: i64,
    pub total_minions_killed: i64,
    pub neutral_minions_killed: i64,
    pub gold_earned: i64,
    pub total_damage_dealt_to_champions: i64,
    pub vision_score: i64,
    pub item0: i64,
    pub item1: i64,
    pub item2: i64,
    pub item3: i64,
    pub item4: i64,
    pub item5: i64,
    pub item6: i64,
    pub summoner1_id: i64,
    pub summoner2_id: i64,
    pub perks: Option<MatchPerks>,
}

impl MatchParticipant {
    pub fn items(&self) -> Vec<i64> {
        [
            self.item0, self.item1, self.item2, self.item3, self.item4, self.item5, self.item6,
        ]
        .into_iter()
        .filter(|id| *id > 0)
        .collect()
    }

    pub fn keystone(&self) -> Option<i64> {
        self.perks
            .as_ref()?
            .styles
            .first()?
            .selections
            .first()
            .map(|s| s.perk)
    }

    pub fn creep_score(&self) -> i64 {
        self.total_minions_killed + self.neutral_minions_killed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPerks {
    pub styles: Vec<PerkStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerkStyle {
    pub style: i64,
    pub selections: Vec<PerkSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerkSelection {
    pub perk: i64,
}

/// League-v4 ranked entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeagueEntry {
    pub queue_type: String,
    pub tier: String,
    pub rank: String,
    pub league_points: i64,
    pub wins: i64,
    pub losses: i64,
}

// ============================================================================
// Routing
// ============================================================================

/// Regional routing value used by match-v5 for a platform, if known.
pub fn continent_for_platform(platform: &str) -> Option<&'static str> {
    match platform.trim().to_lowercase().as_str() {
        "na1" | "br1" | "la1" | "la2" => Some("americas"),
        "euw1" | "eun1" | "tr1" | "ru" | "me1" => Some("europe"),
        "kr" | "jp1" => Some("asia"),
        "oc1" | "ph2" | "sg2" | "th2" | "tw2" | "vn2" => Some("sea"),
        _ => None,
    }
}

// ============================================================================
// Stats API seam
// ============================================================================

/// Read-only stats API operations the tracker depends on.
#[async_trait]
pub trait StatsApi: Send + Sync + 'static {
    /// Active game for a player. `RiotError::NotFound` means "not in a game".
    async fn active_game(&self, platform: &str, puuid: &str) -> Result<ActiveGame, RiotError>;

    /// Match detail by match id, routed through the continent host.
    async fn match_detail(&self, continent: &str, match_id: &str)
        -> Result<MatchDetail, RiotError>;

    /// Ranked entries for a player.
    async fn league_entries(&self, platform: &str, puuid: &str)
        -> Result<Vec<LeagueEntry>, RiotError>;
}

// ============================================================================
// Rate-limited client
// ============================================================================

/// Stats API client: every physical request goes through the shared
/// [`RateLimiter`], and transient failures are retried with backoff.
#[derive(Clone)]
pub struct RiotClient {
    client: reqwest::Client,
    api_key: String,
    limiter: Arc<RateLimiter>,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    /// Replaces `https://{host}.api.riotgames.com` when set.
    base_url: Option<String>,
}

impl RiotClient {
    pub fn new(config: &RiotConfig, limiter: Arc<RateLimiter>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(AppError::Request)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            limiter,
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            base_url: None,
        })
    }

    /// Send every request to `base_url` instead of the regional Riot hosts.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn url(&self, host: &str, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => format!("https://{}.api.riotgames.com{}", host, path),
        }
    }

    /// GET `path` on `host`, decoding a JSON body.
    ///
    /// Backpressure (429), 5xx and transport errors are retried up to
    /// `max_attempts` with exponential backoff; 429 also extends the
    /// limiter's global cool-down. A timed-out attempt counts as transient;
    /// other 4xx return immediately.
    pub async fn call<T: DeserializeOwned>(&self, host: &str, path: &str) -> Result<T, RiotError> {
        let url = self.url(host, path);

        let mut attempt: u32 = 1;
        loop {
            self.limiter.acquire(path).await;

            let err = match self.send_once::<T>(&url).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if let RiotError::RateLimited { retry_after } = &err {
                self.limiter.extend_cooldown(*retry_after).await;
            }

            if !err.is_retryable() || attempt >= self.max_attempts {
                if err.is_retryable() {
                    tracing::warn!(
                        path = %path,
                        attempts = attempt,
                        "Riot request failed after retries: {}",
                        err
                    );
                }
                return Err(err);
            }

            let delay = backoff_delay(attempt, self.backoff_base, self.backoff_max);
            tracing::warn!(
                path = %path,
                "Transient Riot error: {}. Retrying in {:?} (attempt {}/{})",
                err,
                delay,
                attempt,
                self.max_attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, RiotError> {
        let response = self
            .client
            .get(url)
            .header("X-Riot-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RiotError::Timeout
                } else {
                    RiotError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status.as_u16(),
                retry_after.unwrap_or(self.backoff_base),
                &body,
            ));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RiotError::Timeout
            } else {
                RiotError::Transport(e.to_string())
            }
        })?;
        serde_json::from_str(&body).map_err(|e| RiotError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatsApi for RiotClient {
    async fn active_game(&self, platform: &str, puuid: &str) -> Result<ActiveGame, RiotError> {
        let path = format!("/lol/spectator/v5/active-games/by-summoner/{}", puuid);
        self.call(&platform.to_lowercase(), &path).await
    }

    async fn match_detail(
        &self,
        continent: &str,
        match_id: &str,
    ) -> Result<MatchDetail, RiotError> {
        let path = format!("/lol/match/v5/matches/{}", match_id);
        self.call(continent, &path).await
    }

    async fn league_entries(
        &self,
        platform: &str,
        puuid: &str,
    ) -> Result<Vec<LeagueEntry>, RiotError> {
        let path = format!("/lol/league/v4/entries/by-puuid/{}", puuid);
        self.call(&platform.to_lowercase(), &path).await
    }
}

/// Map a non-success status to its error kind.
pub fn classify_status(status: u16, retry_after: Duration, body: &str) -> RiotError {
    match status {
        404 => RiotError::NotFound,
        429 => RiotError::RateLimited { retry_after },
        500..=599 => RiotError::Server { status },
        _ => RiotError::Client {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// `base * 2^(attempt-1)`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(30);
    base.saturating_mul(1u32 << shift).min(max)
}
