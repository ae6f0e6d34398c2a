//! Message content for live and post-game notifications.

use std::collections::HashMap;

use crate::db::models::QueueInfo;
use crate::services::discord::{colors, DiscordEmbed, DiscordMessage};
use crate::services::riot::{LeagueEntry, MatchDetail, MatchParticipant};

use super::aggregate::LiveMatch;

/// Display names resolved from the static tables.
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    pub champions: HashMap<i64, String>,
    pub spells: HashMap<i64, String>,
    pub runes: HashMap<i64, String>,
    pub items: HashMap<i64, String>,
}

fn lookup(names: &HashMap<i64, String>, id: i64) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("#{}", id))
}

/// League-v4 queue type for a ranked queue id.
pub fn ranked_queue_type(queue_id: i64) -> Option<&'static str> {
    match queue_id {
        420 => Some("RANKED_SOLO_5x5"),
        440 => Some("RANKED_FLEX_SR"),
        _ => None,
    }
}

/// Local MMR approximation from tier, division and LP.
///
/// This is a heuristic ladder position, not a rating reported by the API.
/// Every tier spans 400 points and every division 100; apex tiers share one
/// floor and add LP on top.
pub fn estimate_mmr(tier: &str, division: &str, league_points: i64) -> Option<i64> {
    let tier_floor = match tier.to_uppercase().as_str() {
        "IRON" => 0,
        "BRONZE" => 400,
        "SILVER" => 800,
        "GOLD" => 1200,
        "PLATINUM" => 1600,
        "EMERALD" => 2000,
        "DIAMOND" => 2400,
        "MASTER" | "GRANDMASTER" | "CHALLENGER" => return Some(2800 + league_points.max(0)),
        _ => return None,
    };
    let division_offset = match division.to_uppercase().as_str() {
        "IV" => 0,
        "III" => 100,
        "II" => 200,
        "I" => 300,
        _ => return None,
    };
    Some(tier_floor + division_offset + league_points.clamp(0, 100))
}

fn rank_line(entry: &LeagueEntry) -> String {
    let mut line = format!(
        "{} {} ({} LP)",
        title_case(&entry.tier),
        entry.rank,
        entry.league_points
    );
    if let Some(mmr) = estimate_mmr(&entry.tier, &entry.rank, entry.league_points) {
        line.push_str(&format!(" · est. MMR ~{}", mmr));
    }
    line
}

fn title_case(value: &str) -> String {
    let lower = value.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "Now playing" message for one live match.
///
/// `ranks` holds the ranked entry of each tracked player for this queue, when known.
pub fn live_message(
    live: &LiveMatch,
    queue: &QueueInfo,
    map_name: &str,
    champions: &HashMap<i64, String>,
    ranks: &HashMap<String, LeagueEntry>,
) -> DiscordMessage {
    let (rep_puuid, rep_name) = live.representative().unwrap_or(("", ""));

    let title = if live.tracked_count() > 1 {
        format!(
            "{} and {} more are in a game",
            rep_name,
            live.tracked_count() - 1
        )
    } else {
        format!("{} is in a game", rep_name)
    };

    let mut embed = DiscordEmbed::new()
        .title(title)
        .color(colors::LIVE)
        .field("Queue", &queue.description, true)
        .field("Map", map_name, true);
    if live.game.game_start_time > 0 {
        // Discord renders <t:unix:R> as a relative time in each reader's locale.
        embed = embed.description(format!("Started <t:{}:R>", live.game.game_start_time / 1000));
    }

    // Representative first, then the rest by name.
    let mut players: Vec<(&String, &String)> = live.players.iter().collect();
    players.sort_by(|a, b| {
        (a.0.as_str() != rep_puuid)
            .cmp(&(b.0.as_str() != rep_puuid))
            .then_with(|| a.1.cmp(b.1))
    });

    for (puuid, name) in players {
        let mut value = live
            .game
            .participant(puuid)
            .map(|p| lookup(champions, p.champion_id))
            .unwrap_or_else(|| "Unknown champion".to_string());
        if let Some(entry) = ranks.get(puuid) {
            value.push('\n');
            value.push_str(&rank_line(entry));
        }
        embed = embed.field(name, value, false);
    }

    DiscordMessage::embeds(vec![embed.footer(format!("Match {}", live.key.match_id()))])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Victory,
    Defeat,
    Remake,
}

impl MatchResult {
    pub fn of(participant: &MatchParticipant) -> Self {
        if participant.game_ended_in_early_surrender {
            MatchResult::Remake
        } else if participant.win {
            MatchResult::Victory
        } else {
            MatchResult::Defeat
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MatchResult::Victory => "Victory",
            MatchResult::Defeat => "Defeat",
            MatchResult::Remake => "Remake",
        }
    }

    fn color(&self) -> u32 {
        match self {
            MatchResult::Victory => colors::VICTORY,
            MatchResult::Defeat => colors::DEFEAT,
            MatchResult::Remake => colors::REMAKE,
        }
    }
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Summary embed for one tracked participant, or `None` if they are not in the match.
pub fn post_game_embed(
    detail: &MatchDetail,
    puuid: &str,
    display_name: &str,
    queue_name: &str,
    names: &DisplayNames,
) -> Option<DiscordEmbed> {
    let p = detail.participant(puuid)?;
    let result = MatchResult::of(p);

    let champion = names
        .champions
        .get(&p.champion_id)
        .cloned()
        .unwrap_or_else(|| p.champion_name.clone());
    let minutes = (detail.info.game_duration as f64 / 60.0).max(1.0);
    let cs = p.creep_score();

    let mut embed = DiscordEmbed::new()
        .title(format!("{}: {} on {}", result.label(), display_name, champion))
        .color(result.color())
        .field("KDA", format!("{}/{}/{}", p.kills, p.deaths, p.assists), true)
        .field("CS", format!("{} ({:.1}/min)", cs, cs as f64 / minutes), true)
        .field("Damage", p.total_damage_dealt_to_champions.to_string(), true)
        .field("Gold", p.gold_earned.to_string(), true)
        .field("Level", p.champ_level.to_string(), true)
        .field("Duration", format_duration(detail.info.game_duration), true);

    if let Some(keystone) = p.keystone() {
        embed = embed.field("Keystone", lookup(&names.runes, keystone), true);
    }
    embed = embed.field(
        "Spells",
        format!(
            "{} / {}",
            lookup(&names.spells, p.summoner1_id),
            lookup(&names.spells, p.summoner2_id)
        ),
        true,
    );

    let items = p.items();
    if !items.is_empty() {
        let items: Vec<String> = items.iter().map(|id| lookup(&names.items, *id)).collect();
        embed = embed.field("Items", items.join(", "), false);
    }

    if let Some(ended) = detail
        .info
        .game_end_timestamp
        .and_then(chrono::DateTime::from_timestamp_millis)
    {
        embed = embed.timestamp(ended.to_rfc3339());
    }

    Some(embed.footer(format!("{} · {}", queue_name, detail.metadata.match_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MatchKey;
    use crate::services::riot::{
        ActiveGame, ActiveParticipant, MatchInfo, MatchMetadata, MatchPerks, PerkSelection,
        PerkStyle,
    };
    use std::collections::BTreeMap;

    #[test]
    fn mmr_estimate_follows_ladder() {
        assert_eq!(estimate_mmr("IRON", "IV", 0), Some(0));
        assert_eq!(estimate_mmr("gold", "ii", 50), Some(1450));
        assert_eq!(estimate_mmr("DIAMOND", "I", 99), Some(2799));
        assert_eq!(estimate_mmr("MASTER", "I", 250), Some(3050));
        assert_eq!(estimate_mmr("UNRANKED", "", 0), None);
        assert_eq!(estimate_mmr("GOLD", "V", 0), None);
    }

    fn live_match() -> LiveMatch {
        let mut players = BTreeMap::new();
        players.insert("p1".to_string(), "Bravo".to_string());
        players.insert("p2".to_string(), "Alpha".to_string());
        LiveMatch {
            key: MatchKey::new("g", "NA1", 1001).unwrap(),
            channel_id: "c".into(),
            platform: "na1".into(),
            game: ActiveGame {
                game_id: 1001,
                game_start_time: 1_700_000_000_000,
                participants: vec![
                    ActiveParticipant {
                        puuid: Some("p1".into()),
                        champion_id: 103,
                        ..Default::default()
                    },
                    ActiveParticipant {
                        puuid: Some("p2".into()),
                        champion_id: 7,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            players,
        }
    }

    #[test]
    fn live_message_lists_representative_first_with_rank() {
        let queue = QueueInfo {
            queue_id: 420,
            description: "Ranked Solo/Duo".into(),
            map_id: Some(11),
            category: "ranked".into(),
        };
        let champions = HashMap::from([(103, "Ahri".to_string())]);
        let ranks = HashMap::from([(
            "p2".to_string(),
            LeagueEntry {
                queue_type: "RANKED_SOLO_5x5".into(),
                tier: "GOLD".into(),
                rank: "II".into(),
                league_points: 50,
                ..Default::default()
            },
        )]);

        let msg = live_message(&live_match(), &queue, "Summoner's Rift", &champions, &ranks);
        let embed = &msg.embeds.unwrap()[0];
        assert_eq!(embed.title.as_deref(), Some("Alpha and 1 more are in a game"));
        assert_eq!(embed.description.as_deref(), Some("Started <t:1700000000:R>"));

        let fields = embed.fields.as_ref().unwrap();
        assert_eq!(fields[0].value, "Ranked Solo/Duo");
        assert_eq!(fields[1].value, "Summoner's Rift");
        assert_eq!(fields[2].name, "Alpha");
        assert_eq!(fields[2].value, "#7\nGold II (50 LP) · est. MMR ~1450");
        assert_eq!(fields[3].name, "Bravo");
        assert_eq!(fields[3].value, "Ahri");
    }

    fn detail() -> MatchDetail {
        MatchDetail {
            metadata: MatchMetadata {
                match_id: "NA1_1001".into(),
                participants: vec!["p1".into()],
            },
            info: MatchInfo {
                game_id: 1001,
                queue_id: 420,
                platform_id: "NA1".into(),
                game_duration: 1805,
                game_end_timestamp: Some(1_700_000_000_000),
                participants: vec![MatchParticipant {
                    puuid: "p1".into(),
                    champion_id: 103,
                    champion_name: "Ahri".into(),
                    win: true,
                    kills: 7,
                    deaths: 2,
                    assists: 9,
                    total_minions_killed: 170,
                    neutral_minions_killed: 10,
                    item0: 3089,
                    summoner1_id: 4,
                    summoner2_id: 14,
                    perks: Some(MatchPerks {
                        styles: vec![PerkStyle {
                            style: 8100,
                            selections: vec![PerkSelection { perk: 8112 }],
                        }],
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn post_game_embed_summarizes_participant() {
        let names = DisplayNames {
            runes: HashMap::from([(8112, "Electrocute".to_string())]),
            spells: HashMap::from([(4, "Flash".to_string()), (14, "Ignite".to_string())]),
            items: HashMap::from([(3089, "Rabadon's Deathcap".to_string())]),
            ..Default::default()
        };

        let embed = post_game_embed(&detail(), "p1", "Bravo", "Ranked Solo/Duo", &names).unwrap();
        assert_eq!(embed.title.as_deref(), Some("Victory: Bravo on Ahri"));
        assert_eq!(embed.color, Some(colors::VICTORY));
        assert_eq!(embed.timestamp.as_deref(), Some("2023-11-14T22:13:20+00:00"));

        let fields = embed.fields.unwrap();
        let value = |name: &str| {
            fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.clone())
                .unwrap()
        };
        assert_eq!(value("KDA"), "7/2/9");
        assert_eq!(value("Duration"), "30:05");
        assert_eq!(value("Keystone"), "Electrocute");
        assert_eq!(value("Spells"), "Flash / Ignite");
        assert_eq!(value("Items"), "Rabadon's Deathcap");
        assert!(value("CS").starts_with("180 "));
    }

    #[test]
    fn remake_and_missing_participant() {
        let mut d = detail();
        d.info.participants[0].game_ended_in_early_surrender = true;
        let embed = post_game_embed(&d, "p1", "Bravo", "Normal", &DisplayNames::default()).unwrap();
        assert_eq!(embed.color, Some(colors::REMAKE));

        assert!(post_game_embed(&d, "nobody", "X", "Normal", &DisplayNames::default()).is_none());
    }
}
