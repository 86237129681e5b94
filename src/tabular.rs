//! Typed box-score rows shared by every extractor.
//!
//! Each upstream format is parsed into the same shapes here, once, at the
//! boundary. Nothing downstream looks at raw cells.

use anyhow::Result;

use crate::boxscore_csv;
use crate::boxscore_html;
use crate::fetch::{Document, DocumentKind};
use crate::model::GameStatus;
use crate::stats_api;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatColumn {
    Minutes,
    FieldGoalsMade,
    FieldGoalsAttempted,
    ThreesMade,
    ThreesAttempted,
    FreeThrowsMade,
    FreeThrowsAttempted,
    OffensiveRebounds,
    DefensiveRebounds,
    Rebounds,
    Assists,
    Steals,
    Blocks,
    Turnovers,
    PersonalFouls,
    Points,
    PlusMinus,
}

impl StatColumn {
    /// Maps a header label or `data-stat` attribute. Unknown labels (GmSc,
    /// percentages, ratings) return `None` and are ignored.
    pub fn from_header(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        let col = match key.as_str() {
            "mp" | "min" | "mins" | "minutes" => StatColumn::Minutes,
            "fg" | "fgm" | "field_goals_made" | "fieldgoalsmade" => StatColumn::FieldGoalsMade,
            "fga" | "field_goals_attempted" | "fieldgoalsattempted" => {
                StatColumn::FieldGoalsAttempted
            }
            "3p" | "fg3" | "3pm" | "fg3m" | "threepointersmade" => StatColumn::ThreesMade,
            "3pa" | "fg3a" | "threepointersattempted" => StatColumn::ThreesAttempted,
            "ft" | "ftm" | "freethrowsmade" => StatColumn::FreeThrowsMade,
            "fta" | "freethrowsattempted" => StatColumn::FreeThrowsAttempted,
            "orb" | "oreb" | "reboundsoffensive" => StatColumn::OffensiveRebounds,
            "drb" | "dreb" | "reboundsdefensive" => StatColumn::DefensiveRebounds,
            "trb" | "reb" | "tot" | "reboundstotal" => StatColumn::Rebounds,
            "ast" | "assists" => StatColumn::Assists,
            "stl" | "steals" => StatColumn::Steals,
            "blk" | "blocks" => StatColumn::Blocks,
            "tov" | "to" | "turnovers" => StatColumn::Turnovers,
            "pf" | "foulspersonal" => StatColumn::PersonalFouls,
            "pts" | "points" => StatColumn::Points,
            "+/-" | "plus_minus" | "plusminus" | "plusminuspoints" | "pm" => StatColumn::PlusMinus,
            _ => return None,
        };
        Some(col)
    }
}

/// True for labels naming the player column of a box-score table.
pub fn is_player_header(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "player" | "starters" | "name" | "player_name" | "players"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Unknown,
    Starters,
    Reserves,
}

impl Section {
    /// Sentinel rows switch the section; anything else leaves it alone.
    pub fn from_sentinel(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "starters" => Some(Section::Starters),
            "reserves" | "bench" => Some(Section::Reserves),
            _ => None,
        }
    }
}

pub fn is_totals_label(label: &str) -> bool {
    let lower = label.trim().to_ascii_lowercase();
    lower.starts_with("team totals") || lower == "totals" || lower == "team"
}

/// Recognises "did not play" style markers, returning the cleaned reason.
pub fn dnp_reason(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    let markers = [
        "did not play",
        "did not dress",
        "not with team",
        "player suspended",
        "dnp",
        "dnd",
        "nwt",
        "inactive",
    ];
    if markers.iter().any(|m| lower.starts_with(m)) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// `MM:SS`, ISO-8601 `PT36M12.00S`, or a plain number, to decimal minutes
/// rounded to two places.
pub fn parse_minutes(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if is_blank(s) {
        return None;
    }
    if let Some(rest) = s.strip_prefix("PT") {
        let (mins, secs) = rest.split_once('M')?;
        let mins: f64 = mins.parse().ok()?;
        let secs: f64 = secs.trim_end_matches('S').parse().unwrap_or(0.0);
        return Some(round2(mins + secs / 60.0));
    }
    if let Some((mins, secs)) = s.split_once(':') {
        let mins: f64 = mins.trim().parse().ok()?;
        let secs: f64 = secs.trim().parse().ok()?;
        return Some(round2(mins + secs / 60.0));
    }
    s.parse::<f64>().ok().map(round2)
}

pub fn parse_int(raw: &str) -> Option<i32> {
    let s = raw.trim();
    if is_blank(s) {
        return None;
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    s.parse::<f64>().ok().map(|v| v.round() as i32)
}

fn is_blank(s: &str) -> bool {
    s.is_empty() || matches!(s, "-" | "--" | "\u{2013}" | "\u{2014}")
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine {
    pub minutes: Option<f64>,
    pub field_goals_made: Option<i32>,
    pub field_goals_attempted: Option<i32>,
    pub three_pointers_made: Option<i32>,
    pub three_pointers_attempted: Option<i32>,
    pub free_throws_made: Option<i32>,
    pub free_throws_attempted: Option<i32>,
    pub offensive_rebounds: Option<i32>,
    pub defensive_rebounds: Option<i32>,
    pub rebounds: Option<i32>,
    pub assists: Option<i32>,
    pub steals: Option<i32>,
    pub blocks: Option<i32>,
    pub turnovers: Option<i32>,
    pub personal_fouls: Option<i32>,
    pub points: Option<i32>,
    pub plus_minus: Option<i32>,
}

impl StatLine {
    pub fn set(&mut self, column: StatColumn, raw: &str) {
        match column {
            StatColumn::Minutes => self.minutes = parse_minutes(raw),
            StatColumn::FieldGoalsMade => self.field_goals_made = parse_int(raw),
            StatColumn::FieldGoalsAttempted => self.field_goals_attempted = parse_int(raw),
            StatColumn::ThreesMade => self.three_pointers_made = parse_int(raw),
            StatColumn::ThreesAttempted => self.three_pointers_attempted = parse_int(raw),
            StatColumn::FreeThrowsMade => self.free_throws_made = parse_int(raw),
            StatColumn::FreeThrowsAttempted => self.free_throws_attempted = parse_int(raw),
            StatColumn::OffensiveRebounds => self.offensive_rebounds = parse_int(raw),
            StatColumn::DefensiveRebounds => self.defensive_rebounds = parse_int(raw),
            StatColumn::Rebounds => self.rebounds = parse_int(raw),
            StatColumn::Assists => self.assists = parse_int(raw),
            StatColumn::Steals => self.steals = parse_int(raw),
            StatColumn::Blocks => self.blocks = parse_int(raw),
            StatColumn::Turnovers => self.turnovers = parse_int(raw),
            StatColumn::PersonalFouls => self.personal_fouls = parse_int(raw),
            StatColumn::Points => self.points = parse_int(raw),
            StatColumn::PlusMinus => self.plus_minus = parse_int(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StatLine::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLine {
    pub name: String,
    pub source_player_id: Option<String>,
    pub started: bool,
    pub dnp_reason: Option<String>,
    pub stats: StatLine,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamTable {
    pub team_code: String,
    pub players: Vec<PlayerLine>,
    pub totals: Option<StatLine>,
}

impl TeamTable {
    pub fn new(team_code: impl Into<String>) -> Self {
        Self {
            team_code: team_code.into(),
            players: Vec::new(),
            totals: None,
        }
    }

    /// Sum of emitted player points; `None` when no row records points.
    pub fn derived_points(&self) -> Option<i32> {
        self.players
            .iter()
            .filter_map(|p| p.stats.points)
            .fold(None, |acc, pts| Some(acc.unwrap_or(0) + pts))
    }

    /// Published total when present, otherwise the player sum.
    pub fn team_points(&self) -> Option<i32> {
        self.totals
            .as_ref()
            .and_then(|t| t.points)
            .or_else(|| self.derived_points())
    }
}

/// Points per period for one team. Periods past the fourth are overtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamLineScore {
    pub team_code: String,
    pub periods: Vec<i32>,
}

impl TeamLineScore {
    pub fn quarter(&self, n: usize) -> Option<i32> {
        self.periods.get(n.checked_sub(1)?).copied()
    }

    /// Sum of every overtime period, `Some(0)` for a regulation game.
    pub fn overtime(&self) -> Option<i32> {
        if self.periods.len() < 4 {
            return None;
        }
        Some(self.periods.iter().skip(4).sum())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxScoreExtract {
    pub teams: Vec<TeamTable>,
    pub line_scores: Vec<TeamLineScore>,
    pub home_code: Option<String>,
    pub away_code: Option<String>,
    pub status: Option<GameStatus>,
}

impl BoxScoreExtract {
    pub fn is_empty(&self) -> bool {
        self.teams.iter().all(|t| t.players.is_empty())
    }

    pub fn team(&self, code: &str) -> Option<&TeamTable> {
        self.teams
            .iter()
            .find(|t| t.team_code.eq_ignore_ascii_case(code))
    }

    pub fn line_score(&self, code: &str) -> Option<&TeamLineScore> {
        self.line_scores
            .iter()
            .find(|l| l.team_code.eq_ignore_ascii_case(code))
    }
}

/// Dispatches on the document kind. A document without a recognisable table
/// yields an empty extract; only malformed JSON is an error.
pub fn extract(doc: &Document) -> Result<BoxScoreExtract> {
    match doc.kind {
        DocumentKind::Html => boxscore_html::extract(&doc.body),
        DocumentKind::Csv => Ok(boxscore_csv::extract(&doc.body)),
        DocumentKind::Json => stats_api::extract_boxscore(&doc.body),
    }
}
