use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::model::TeamRecord;
use crate::store;

/// Spellings that differ between sources for the same franchise.
const KNOWN_ALIASES: &[(&str, &str)] = &[
    ("BRK", "BKN"),
    ("PHO", "PHX"),
    ("CHO", "CHA"),
    ("GS", "GSW"),
    ("NY", "NYK"),
    ("SA", "SAS"),
    ("NO", "NOP"),
    ("UTAH", "UTA"),
    ("WSH", "WAS"),
];

/// Code → team lookups over the seeded reference data.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    teams: HashMap<String, TeamRecord>,
    codes: HashMap<String, String>,
}

impl TeamDirectory {
    pub fn load(conn: &Connection) -> Result<Self> {
        let teams = store::load_teams(conn)?;
        let codes = store::load_team_codes(conn)?;
        Ok(Self::from_parts(teams, codes))
    }

    pub fn from_parts(teams: Vec<TeamRecord>, codes: Vec<(String, String)>) -> Self {
        let mut dir = Self::default();
        for team in teams {
            dir.codes
                .insert(team.code.to_ascii_uppercase(), team.team_id.clone());
            dir.teams.insert(team.team_id.clone(), team);
        }
        for (code, team_id) in codes {
            dir.codes.insert(code.to_ascii_uppercase(), team_id);
        }
        dir
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Resolves any source spelling of a team code to the canonical team id.
    pub fn resolve_code(&self, raw: &str) -> Option<&str> {
        let code = raw.trim().to_ascii_uppercase();
        if let Some(id) = self.codes.get(&code) {
            return Some(id.as_str());
        }
        KNOWN_ALIASES
            .iter()
            .filter_map(|(a, b)| {
                if *a == code {
                    Some(*b)
                } else if *b == code {
                    Some(*a)
                } else {
                    None
                }
            })
            .find_map(|alt| self.codes.get(alt))
            .map(String::as_str)
    }

    pub fn get(&self, team_id: &str) -> Option<&TeamRecord> {
        self.teams.get(team_id)
    }

    /// Primary code, used when building source URLs.
    pub fn code_of(&self, team_id: &str) -> Option<&str> {
        self.teams.get(team_id).map(|t| t.code.as_str())
    }

    /// Every code that maps to `team_id`, primary first.
    pub fn codes_of(&self, team_id: &str) -> Vec<String> {
        let mut out: Vec<String> = self.code_of(team_id).map(str::to_string).into_iter().collect();
        let mut aliases: Vec<String> = self
            .codes
            .iter()
            .filter(|(code, id)| id.as_str() == team_id && !out.contains(*code))
            .map(|(code, _)| code.clone())
            .collect();
        aliases.sort();
        out.extend(aliases);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> TeamDirectory {
        TeamDirectory::from_parts(
            vec![
                TeamRecord {
                    team_id: "t-bkn".into(),
                    code: "BKN".into(),
                    name: "Brooklyn Nets".into(),
                },
                TeamRecord {
                    team_id: "t-phx".into(),
                    code: "PHX".into(),
                    name: "Phoenix Suns".into(),
                },
            ],
            vec![("BROOKLYN".into(), "t-bkn".into())],
        )
    }

    #[test]
    fn source_spellings_resolve() {
        let d = dir();
        assert_eq!(d.resolve_code("bkn"), Some("t-bkn"));
        assert_eq!(d.resolve_code("BRK"), Some("t-bkn"));
        assert_eq!(d.resolve_code("PHO"), Some("t-phx"));
        assert_eq!(d.resolve_code("brooklyn"), Some("t-bkn"));
        assert_eq!(d.resolve_code("LAL"), None);
    }

    #[test]
    fn codes_primary_first() {
        assert_eq!(dir().codes_of("t-bkn"), vec!["BKN", "BROOKLYN"]);
    }
}
