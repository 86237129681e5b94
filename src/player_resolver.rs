//! Raw box-score names to canonical player ids.
//!
//! Matching is an ordered list of stages. Each stage is a plain function of
//! the directory, the raw name and the team context; the cascade stops at the
//! first stage that names exactly one player. A stage that finds two or more
//! different players counts as a miss for that stage.

use anyhow::Result;
use rusqlite::Connection;

use crate::model::PlayerRecord;
use crate::names;
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKey {
    Exact,
    Canonical,
    Suffixless,
    LastName,
}

impl NameKey {
    const ALL: [NameKey; 4] = [
        NameKey::Exact,
        NameKey::Canonical,
        NameKey::Suffixless,
        NameKey::LastName,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn of(self, name: &str) -> Option<String> {
        let key = match self {
            NameKey::Exact => names::exact_key(name),
            NameKey::Canonical => names::canonical_key(name),
            NameKey::Suffixless => names::suffixless_key(name),
            NameKey::LastName => return names::last_name_key(name),
        };
        (!key.is_empty()).then_some(key)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    player_id: String,
    team_id: Option<String>,
    keys: [Option<String>; 4],
}

/// Read-only view of the player reference table with precomputed name keys.
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    entries: Vec<Entry>,
}

impl PlayerDirectory {
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self::from_players(store::load_players(conn)?))
    }

    pub fn from_players(players: Vec<PlayerRecord>) -> Self {
        let entries = players
            .into_iter()
            .map(|p| Entry {
                keys: NameKey::ALL.map(|k| k.of(&p.full_name)),
                player_id: p.player_id,
                team_id: p.team_id,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The one player whose `key` matches, optionally within `team_id`.
    pub fn unique_match(
        &self,
        key: NameKey,
        raw_name: &str,
        team_id: Option<&str>,
    ) -> Option<String> {
        let wanted = key.of(raw_name)?;
        let mut found: Option<&str> = None;
        for entry in &self.entries {
            if let Some(team) = team_id
                && entry.team_id.as_deref() != Some(team)
            {
                continue;
            }
            if entry.keys[key.index()].as_deref() != Some(wanted.as_str()) {
                continue;
            }
            match found {
                Some(id) if id != entry.player_id => return None,
                _ => found = Some(entry.player_id.as_str()),
            }
        }
        found.map(str::to_string)
    }
}

pub type Matcher = fn(&PlayerDirectory, &str, Option<&str>) -> Option<String>;

#[derive(Clone, Copy)]
pub struct MatchStage {
    pub name: &'static str,
    pub matcher: Matcher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched { player_id: String, stage: &'static str },
    Unresolved,
}

impl Resolution {
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Resolution::Matched { player_id, .. } => Some(player_id.as_str()),
            Resolution::Unresolved => None,
        }
    }
}

fn exact_in_team(d: &PlayerDirectory, n: &str, t: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Exact, n, Some(t?))
}

fn canonical_in_team(d: &PlayerDirectory, n: &str, t: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Canonical, n, Some(t?))
}

fn suffixless_in_team(d: &PlayerDirectory, n: &str, t: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Suffixless, n, Some(t?))
}

/// Surname alone is too weak league-wide, so this stage never runs unscoped.
fn last_name_in_team(d: &PlayerDirectory, n: &str, t: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::LastName, n, Some(t?))
}

fn exact_any_team(d: &PlayerDirectory, n: &str, _: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Exact, n, None)
}

fn canonical_any_team(d: &PlayerDirectory, n: &str, _: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Canonical, n, None)
}

fn suffixless_any_team(d: &PlayerDirectory, n: &str, _: Option<&str>) -> Option<String> {
    d.unique_match(NameKey::Suffixless, n, None)
}

pub struct Cascade {
    stages: Vec<MatchStage>,
}

impl Default for Cascade {
    fn default() -> Self {
        Self::standard()
    }
}

impl Cascade {
    pub fn standard() -> Self {
        Self::new(vec![
            MatchStage { name: "exact", matcher: exact_in_team },
            MatchStage { name: "canonical", matcher: canonical_in_team },
            MatchStage { name: "suffixless", matcher: suffixless_in_team },
            MatchStage { name: "last_name", matcher: last_name_in_team },
            MatchStage { name: "exact_any_team", matcher: exact_any_team },
            MatchStage { name: "canonical_any_team", matcher: canonical_any_team },
            MatchStage { name: "suffixless_any_team", matcher: suffixless_any_team },
        ])
    }

    pub fn new(stages: Vec<MatchStage>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, stage: MatchStage) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    pub fn resolve(
        &self,
        dir: &PlayerDirectory,
        raw_name: &str,
        team_id: Option<&str>,
    ) -> Resolution {
        for stage in &self.stages {
            if let Some(player_id) = (stage.matcher)(dir, raw_name, team_id) {
                return Resolution::Matched {
                    player_id,
                    stage: stage.name,
                };
            }
        }
        Resolution::Unresolved
    }
}
