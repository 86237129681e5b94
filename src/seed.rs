//! Reference data loading: teams with their per-source code spellings, and
//! the player directory the name matcher works from.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::model::{PlayerRecord, SourceKind, TeamRecord};
use crate::store;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedFile {
    #[serde(default)]
    pub teams: Vec<SeedTeam>,
    #[serde(default)]
    pub players: Vec<SeedPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTeam {
    pub team_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Numeric team id at the stats API; roster sync needs it.
    #[serde(default)]
    pub stats_team_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPlayer {
    pub player_id: String,
    pub full_name: String,
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub teams: usize,
    pub aliases: usize,
    pub players: usize,
}

pub fn parse_seed(raw: &str) -> Result<SeedFile> {
    let seed: SeedFile = serde_json::from_str(raw).context("decode reference seed json")?;
    for team in &seed.teams {
        if team.team_id.trim().is_empty() || team.code.trim().is_empty() {
            return Err(anyhow!("team entry {:?} needs both an id and a code", team.name));
        }
    }
    Ok(seed)
}

pub fn load_seed(path: &Path) -> Result<SeedFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read reference seed {}", path.display()))?;
    parse_seed(&raw)
}

/// Upserts everything in one transaction. Re-running with the same file is a
/// no-op apart from timestamps.
pub fn apply_seed(conn: &mut Connection, seed: &SeedFile) -> Result<SeedSummary> {
    let tx = conn.transaction().context("begin seed transaction")?;
    let mut summary = SeedSummary::default();
    for team in &seed.teams {
        store::upsert_team(
            &tx,
            &TeamRecord {
                team_id: team.team_id.trim().to_string(),
                code: team.code.trim().to_string(),
                name: team.name.trim().to_string(),
            },
            &team.aliases,
        )?;
        if let Some(stats_id) = team.stats_team_id.as_deref().filter(|id| !id.trim().is_empty()) {
            store::link_team_source(&tx, SourceKind::StatsApi, stats_id, team.team_id.trim())?;
        }
        summary.teams += 1;
        summary.aliases += team.aliases.len();
    }
    for player in &seed.players {
        store::upsert_player(
            &tx,
            &PlayerRecord {
                player_id: player.player_id.trim().to_string(),
                full_name: player.full_name.trim().to_string(),
                team_id: player.team_id.clone(),
            },
        )?;
        summary.players += 1;
    }
    tx.commit().context("commit seed transaction")?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teams::TeamDirectory;

    #[test]
    fn seeds_teams_aliases_and_players() {
        let raw = r#"{
            "teams": [
                {"team_id": "BKN", "code": "BKN", "name": "Brooklyn Nets", "aliases": ["BRK", "NJN"],
                 "stats_team_id": "1610612751"}
            ],
            "players": [
                {"player_id": "p1", "full_name": "Cam Thomas", "team_id": "BKN"},
                {"player_id": "p2", "full_name": "Free Agent"}
            ]
        }"#;
        let mut conn = store::open_in_memory().unwrap();
        let summary = apply_seed(&mut conn, &parse_seed(raw).unwrap()).unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                teams: 1,
                aliases: 2,
                players: 2
            }
        );
        let dir = TeamDirectory::load(&conn).unwrap();
        assert_eq!(dir.resolve_code("NJN"), Some("BKN"));
        assert_eq!(store::load_players(&conn).unwrap()[1].team_id, None);
        assert_eq!(
            store::team_source_ids(&conn, SourceKind::StatsApi).unwrap(),
            vec![("BKN".to_string(), "1610612751".to_string())]
        );
    }

    #[test]
    fn team_without_code_is_rejected() {
        let raw = r#"{"teams": [{"team_id": "X", "code": " ", "name": "Nobody"}]}"#;
        assert!(parse_seed(raw).is_err());
    }
}
