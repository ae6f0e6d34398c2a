use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::db::models::{MatchKey, ProbeKey, TrackedTarget};
use crate::services::riot::ActiveGame;

/// One tracked match instance for one guild, built fresh every tick.
#[derive(Debug, Clone)]
pub struct LiveMatch {
    pub key: MatchKey,
    pub channel_id: String,
    /// Platform region the match was probed on (lower-case).
    pub platform: String,
    pub game: ActiveGame,
    /// puuid -> display name for every tracked participant.
    pub players: BTreeMap<String, String>,
}

impl LiveMatch {
    /// Lowest display name wins; ties broken by puuid.
    pub fn representative(&self) -> Option<(&str, &str)> {
        self.players
            .iter()
            .min_by(|(pa, na), (pb, nb)| na.cmp(nb).then_with(|| pa.cmp(pb)))
            .map(|(puuid, name)| (puuid.as_str(), name.as_str()))
    }

    pub fn tracked_count(&self) -> usize {
        self.players.len()
    }
}

/// Distinct probe keys for a set of targets, in a stable order.
pub fn probe_keys(targets: &[TrackedTarget]) -> Vec<ProbeKey> {
    targets
        .iter()
        .map(ProbeKey::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Group targets whose probe found a game into one entry per match key.
pub fn aggregate(
    targets: &[TrackedTarget],
    games: &HashMap<ProbeKey, ActiveGame>,
) -> BTreeMap<MatchKey, LiveMatch> {
    let mut matches: BTreeMap<MatchKey, LiveMatch> = BTreeMap::new();

    for target in targets {
        let probe_key = ProbeKey::from(target);
        let Some(game) = games.get(&probe_key) else {
            continue;
        };

        let platform_id = if game.platform_id.trim().is_empty() {
            target.platform.as_str()
        } else {
            game.platform_id.as_str()
        };
        let Some(key) = MatchKey::new(&target.guild_id, platform_id, game.game_id) else {
            tracing::debug!(
                guild_id = %target.guild_id,
                puuid = %target.puuid,
                game_id = game.game_id,
                "Discarding live match with an unusable key"
            );
            continue;
        };

        matches
            .entry(key.clone())
            .or_insert_with(|| LiveMatch {
                key,
                channel_id: target.channel_id.clone(),
                platform: probe_key.platform.clone(),
                game: game.clone(),
                players: BTreeMap::new(),
            })
            .players
            .insert(target.puuid.clone(), target.display_name.clone());
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tracker::probe::tests::game;

    fn target(guild: &str, platform: &str, puuid: &str, name: &str) -> TrackedTarget {
        TrackedTarget {
            guild_id: guild.into(),
            channel_id: format!("chan-{}", guild),
            platform: platform.into(),
            puuid: puuid.into(),
            display_name: name.into(),
        }
    }

    #[test]
    fn probe_keys_are_deduplicated_across_guilds() {
        let targets = vec![
            target("g1", "na1", "p", "P"),
            target("g2", "NA1", "p", "P"),
            target("g2", "euw1", "p", "P"),
        ];
        let keys = probe_keys(&targets);
        assert_eq!(
            keys,
            vec![ProbeKey::new("euw1", "p"), ProbeKey::new("na1", "p")]
        );
    }

    #[test]
    fn merges_players_per_guild_and_match() {
        let targets = vec![
            target("g1", "na1", "a", "Zed Main"),
            target("g1", "na1", "b", "Ahri Main"),
            target("g2", "na1", "a", "Zed Main"),
            target("g1", "na1", "c", "Idle"),
        ];
        let mut games = HashMap::new();
        games.insert(ProbeKey::new("na1", "a"), game(1001, "NA1"));
        games.insert(ProbeKey::new("na1", "b"), game(1001, "NA1"));

        let matches = aggregate(&targets, &games);
        assert_eq!(matches.len(), 2);

        let g1 = &matches[&MatchKey::new("g1", "NA1", 1001).unwrap()];
        assert_eq!(g1.tracked_count(), 2);
        assert_eq!(g1.representative(), Some(("b", "Ahri Main")));
        assert_eq!(g1.channel_id, "chan-g1");

        let g2 = &matches[&MatchKey::new("g2", "NA1", 1001).unwrap()];
        assert_eq!(g2.tracked_count(), 1);
    }

    #[test]
    fn falls_back_to_probe_platform_and_discards_bad_keys() {
        let targets = vec![
            target("g1", "euw1", "a", "A"),
            target("g1", "euw1", "b", "B"),
            target("", "euw1", "c", "C"),
        ];
        let mut games = HashMap::new();
        games.insert(ProbeKey::new("euw1", "a"), game(77, ""));
        games.insert(ProbeKey::new("euw1", "b"), game(0, "EUW1"));
        games.insert(ProbeKey::new("euw1", "c"), game(78, "EUW1"));

        let matches = aggregate(&targets, &games);
        assert_eq!(matches.len(), 1);
        assert!(matches.contains_key(&MatchKey::new("g1", "EUW1", 77).unwrap()));
    }
}
