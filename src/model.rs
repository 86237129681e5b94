use std::fmt;

use chrono::NaiveDate;

/// Upstream systems that mint their own ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    StatsApi,
    ScheduleApi,
    ReferenceSite,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::StatsApi,
        SourceKind::ScheduleApi,
        SourceKind::ReferenceSite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::StatsApi => "stats_api",
            SourceKind::ScheduleApi => "schedule_api",
            SourceKind::ReferenceSite => "reference_site",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stats_api" | "stats" | "nba" => Some(SourceKind::StatsApi),
            "schedule_api" | "schedule" | "balldontlie" => Some(SourceKind::ScheduleApi),
            "reference_site" | "reference" | "bbref" => Some(SourceKind::ReferenceSite),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a game record.
///
/// `Cancelled` and `Postponed` sit beside the main lattice: they can only be
/// entered from `Scheduled` and are otherwise absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Cancelled,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
            GameStatus::Postponed => "postponed",
            GameStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "scheduled" | "pre" | "upcoming" => Some(GameStatus::Scheduled),
            "in_progress" | "inprogress" | "in progress" | "live" | "halftime" => {
                Some(GameStatus::InProgress)
            }
            "final" | "finished" | "completed" => Some(GameStatus::Final),
            "postponed" | "ppd" => Some(GameStatus::Postponed),
            "cancelled" | "canceled" => Some(GameStatus::Cancelled),
            _ => None,
        }
    }

    /// Position on the main lattice. Side states rank below `Scheduled` so
    /// that candidate ordering prefers any live record over an abandoned one.
    pub fn progress_rank(self) -> u8 {
        match self {
            GameStatus::Postponed | GameStatus::Cancelled => 0,
            GameStatus::Scheduled => 1,
            GameStatus::InProgress => 2,
            GameStatus::Final => 3,
        }
    }

    pub fn is_side_state(self) -> bool {
        matches!(self, GameStatus::Postponed | GameStatus::Cancelled)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub team_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub full_name: String,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub start_time: Option<String>,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: GameStatus,
    pub created_at: String,
}

impl GameRecord {
    pub fn has_final_score(&self) -> bool {
        self.status == GameStatus::Final && self.home_score.is_some() && self.away_score.is_some()
    }

    pub fn side_of(&self, team_id: &str) -> Option<bool> {
        if self.home_team_id == team_id {
            Some(true)
        } else if self.away_team_id == team_id {
            Some(false)
        } else {
            None
        }
    }
}

/// What one fetch says about a game. Every field is optional because sources
/// publish different subsets at different times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameUpdate {
    pub status: Option<GameStatus>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerGameObservation {
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
    pub minutes: Option<f64>,
    pub points: Option<i32>,
    pub offensive_rebounds: Option<i32>,
    pub defensive_rebounds: Option<i32>,
    pub rebounds: Option<i32>,
    pub assists: Option<i32>,
    pub steals: Option<i32>,
    pub blocks: Option<i32>,
    pub turnovers: Option<i32>,
    pub personal_fouls: Option<i32>,
    pub field_goals_made: Option<i32>,
    pub field_goals_attempted: Option<i32>,
    pub three_pointers_made: Option<i32>,
    pub three_pointers_attempted: Option<i32>,
    pub free_throws_made: Option<i32>,
    pub free_throws_attempted: Option<i32>,
    pub plus_minus: Option<i32>,
    pub started: bool,
    pub dnp_reason: Option<String>,
    pub source: String,
}

impl PlayerGameObservation {
    pub fn played(&self) -> bool {
        self.dnp_reason.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamGameAggregate {
    pub game_id: String,
    pub team_id: String,
    pub is_home: bool,
    pub points: i32,
    pub field_goals_made: i32,
    pub field_goals_attempted: i32,
    pub three_pointers_made: i32,
    pub three_pointers_attempted: i32,
    pub free_throws_made: i32,
    pub free_throws_attempted: i32,
    pub offensive_rebounds: i32,
    pub defensive_rebounds: i32,
    pub rebounds: i32,
    pub assists: i32,
    pub steals: i32,
    pub blocks: i32,
    pub turnovers: i32,
    pub personal_fouls: i32,
    pub minutes: f64,
    pub possessions: f64,
    pub points_q1: Option<i32>,
    pub points_q2: Option<i32>,
    pub points_q3: Option<i32>,
    pub points_q4: Option<i32>,
    pub points_ot: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedEntity {
    pub raw_name: String,
    pub team_context: String,
    pub first_seen: String,
    pub occurrences: u32,
}
