//! Stats API payloads: traditional box score (v3), game summary line score,
//! the daily scoreboard and team rosters.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::model::{GameStatus, SourceKind};
use crate::schedule::ScheduleEntry;
use crate::tabular::{
    BoxScoreExtract, PlayerLine, StatLine, TeamLineScore, TeamTable, parse_minutes,
};

const MAX_OT_PERIODS: usize = 10;

pub fn extract_boxscore(body: &str) -> Result<BoxScoreExtract> {
    let value: Value = serde_json::from_str(body).context("decode stats box score json")?;
    let mut out = BoxScoreExtract::default();
    let Some(boxscore) = value.get("boxScoreTraditional") else {
        return Ok(out);
    };

    for (side, key) in [(false, "awayTeam"), (true, "homeTeam")] {
        let Some(team) = boxscore.get(key) else {
            continue;
        };
        let Some(code) = team.get("teamTricode").and_then(|v| v.as_str()) else {
            continue;
        };
        let mut table = TeamTable::new(code);
        for player in team
            .get("players")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
        {
            if let Some(line) = player_line(player) {
                table.players.push(line);
            }
        }
        table.totals = team.get("statistics").map(stat_line);

        let periods = periods(team);
        if !periods.is_empty() {
            out.line_scores.push(TeamLineScore {
                team_code: code.to_string(),
                periods,
            });
        }
        if side {
            out.home_code = Some(code.to_string());
        } else {
            out.away_code = Some(code.to_string());
        }
        out.teams.push(table);
    }

    out.status = boxscore
        .get("gameStatus")
        .and_then(json_i64)
        .and_then(status_from_id);
    Ok(out)
}

fn player_line(player: &Value) -> Option<PlayerLine> {
    let first = str_field(player, "firstName").unwrap_or_default();
    let family = str_field(player, "familyName").unwrap_or_default();
    let name = format!("{first} {family}").trim().to_string();
    if name.is_empty() {
        return None;
    }
    let stats = player.get("statistics").map(stat_line).unwrap_or_default();
    let comment = str_field(player, "comment")
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let played = stats.minutes.is_some_and(|m| m > 0.0);

    Some(PlayerLine {
        name,
        source_player_id: player.get("personId").and_then(json_id),
        started: str_field(player, "position").is_some_and(|p| !p.is_empty()),
        dnp_reason: if played { None } else { comment },
        stats,
    })
}

fn stat_line(stats: &Value) -> StatLine {
    let int = |key: &str| stats.get(key).and_then(json_i64).map(|v| v as i32);
    StatLine {
        minutes: stats
            .get("minutes")
            .and_then(|v| v.as_str())
            .and_then(parse_minutes),
        field_goals_made: int("fieldGoalsMade"),
        field_goals_attempted: int("fieldGoalsAttempted"),
        three_pointers_made: int("threePointersMade"),
        three_pointers_attempted: int("threePointersAttempted"),
        free_throws_made: int("freeThrowsMade"),
        free_throws_attempted: int("freeThrowsAttempted"),
        offensive_rebounds: int("reboundsOffensive"),
        defensive_rebounds: int("reboundsDefensive"),
        rebounds: int("reboundsTotal"),
        assists: int("assists"),
        steals: int("steals"),
        blocks: int("blocks"),
        turnovers: int("turnovers"),
        personal_fouls: int("foulsPersonal"),
        points: int("points"),
        plus_minus: int("plusMinusPoints"),
    }
}

/// `periods: [{period: 1, score: 25}, …]` in period order.
fn periods(team: &Value) -> Vec<i32> {
    let mut rows: Vec<(i64, i32)> = team
        .get("periods")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|p| {
            let n = p.get("period").and_then(json_i64)?;
            let score = p.get("score").and_then(json_i64)?;
            Some((n, score as i32))
        })
        .collect();
    rows.sort_by_key(|(n, _)| *n);
    rows.into_iter().map(|(_, s)| s).collect()
}

/// Status and per-period points from the game summary endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSummary {
    pub status: Option<GameStatus>,
    pub line_scores: Vec<TeamLineScore>,
}

pub fn extract_summary(body: &str) -> Result<GameSummary> {
    let value: Value = serde_json::from_str(body).context("decode stats summary json")?;
    let status = result_set_rows(&value, "GameSummary")
        .first()
        .and_then(|row| {
            let text = row.get("GAME_STATUS_TEXT").and_then(|v| v.as_str());
            status_from_row(row.get("GAME_STATUS_ID").and_then(json_i64), text)
        });
    let rows = result_set_rows(&value, "LineScore");
    let ot_periods = played_overtimes(&rows);
    let line_scores = rows
        .iter()
        .filter_map(|row| line_score_row(row, ot_periods))
        .collect();
    Ok(GameSummary {
        status,
        line_scores,
    })
}

/// Overtimes played in the game: the last `PTS_OT{n}` either team scored in.
/// A team shut out in one overtime still has a zero for that period.
fn played_overtimes(rows: &[Map<String, Value>]) -> usize {
    (1..=MAX_OT_PERIODS)
        .filter(|ot| {
            rows.iter().any(|row| {
                row.get(&format!("PTS_OT{ot}"))
                    .and_then(json_i64)
                    .is_some_and(|pts| pts > 0)
            })
        })
        .max()
        .unwrap_or(0)
}

fn line_score_row(row: &Map<String, Value>, ot_periods: usize) -> Option<TeamLineScore> {
    let code = row.get("TEAM_ABBREVIATION").and_then(|v| v.as_str())?;
    let mut periods = Vec::new();
    for q in 1..=4 {
        periods.push(row.get(&format!("PTS_QTR{q}")).and_then(json_i64)? as i32);
    }
    for ot in 1..=ot_periods {
        let pts = row.get(&format!("PTS_OT{ot}")).and_then(json_i64).unwrap_or(0);
        periods.push(pts as i32);
    }
    Some(TeamLineScore {
        team_code: code.to_string(),
        periods,
    })
}

/// One player on a team roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub source_player_id: String,
    pub full_name: String,
    pub source_team_id: Option<String>,
}

/// `CommonTeamRoster` rows. Rows without an id or a name are skipped.
pub fn parse_roster(body: &str) -> Result<Vec<RosterEntry>> {
    let value: Value = serde_json::from_str(body).context("decode stats roster json")?;
    let entries = result_set_rows(&value, "CommonTeamRoster")
        .iter()
        .filter_map(|row| {
            let source_player_id = row.get("PLAYER_ID").and_then(json_id)?;
            let full_name = row
                .get("PLAYER")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|n| !n.is_empty())?
                .to_string();
            Some(RosterEntry {
                source_player_id,
                full_name,
                source_team_id: row
                    .get("TeamID")
                    .or_else(|| row.get("TEAM_ID"))
                    .and_then(json_id),
            })
        })
        .collect();
    Ok(entries)
}

/// Scoreboard for one date: one entry per game header, scores from the line
/// score rows of the same payload.
pub fn parse_scoreboard(body: &str) -> Result<Vec<ScheduleEntry>> {
    let value: Value = serde_json::from_str(body).context("decode stats scoreboard json")?;
    let lines = result_set_rows(&value, "LineScore");
    let mut out = Vec::new();

    for header in result_set_rows(&value, "GameHeader") {
        let Some(game_id) = header.get("GAME_ID").and_then(json_id) else {
            continue;
        };
        let Some(date) = header
            .get("GAME_DATE_EST")
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let team_line = |key: &str| {
            let team_id = header.get(key).and_then(json_id)?;
            lines.iter().find(|l| {
                l.get("GAME_ID").and_then(json_id).as_deref() == Some(game_id.as_str())
                    && l.get("TEAM_ID").and_then(json_id).as_deref() == Some(team_id.as_str())
            })
        };
        let (Some(home), Some(away)) = (team_line("HOME_TEAM_ID"), team_line("VISITOR_TEAM_ID"))
        else {
            continue;
        };
        let code = |row: &Map<String, Value>| {
            row.get("TEAM_ABBREVIATION")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let (Some(home_code), Some(away_code)) = (code(home), code(away)) else {
            continue;
        };
        let text = header.get("GAME_STATUS_TEXT").and_then(|v| v.as_str());
        let status = status_from_row(header.get("GAME_STATUS_ID").and_then(json_i64), text);
        let pts = |row: &Map<String, Value>| row.get("PTS").and_then(json_i64).map(|v| v as i32);

        out.push(ScheduleEntry {
            source: SourceKind::StatsApi,
            source_game_id: game_id,
            date,
            start_time: text
                .filter(|t| t.contains("ET"))
                .map(|t| t.trim().to_string()),
            home_code,
            away_code,
            status,
            home_score: pts(home),
            away_score: pts(away),
        });
    }
    Ok(out)
}

fn status_from_id(id: i64) -> Option<GameStatus> {
    match id {
        1 => Some(GameStatus::Scheduled),
        2 => Some(GameStatus::InProgress),
        3 => Some(GameStatus::Final),
        _ => None,
    }
}

fn status_from_row(id: Option<i64>, text: Option<&str>) -> Option<GameStatus> {
    if let Some(text) = text {
        let lower = text.trim().to_ascii_lowercase();
        if lower.starts_with("ppd") || lower.contains("postponed") {
            return Some(GameStatus::Postponed);
        }
        if lower.contains("cancel") {
            return Some(GameStatus::Cancelled);
        }
    }
    id.and_then(status_from_id)
}

/// `resultSets` as header-keyed row maps.
fn result_set_rows(value: &Value, name: &str) -> Vec<Map<String, Value>> {
    let Some(sets) = value
        .get("resultSets")
        .or_else(|| value.get("resultSet"))
        .and_then(|v| v.as_array())
    else {
        return Vec::new();
    };
    let Some(set) = sets
        .iter()
        .find(|s| s.get("name").and_then(|n| n.as_str()) == Some(name))
    else {
        return Vec::new();
    };
    let headers: Vec<&str> = set
        .get("headers")
        .and_then(|h| h.as_array())
        .into_iter()
        .flatten()
        .filter_map(|h| h.as_str())
        .collect();

    set.get("rowSet")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|row| row.as_array())
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .map(|(h, v)| (h.to_string(), v.clone()))
                .collect()
        })
        .collect()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str()).map(str::trim)
}

fn json_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Ids arrive as numbers or strings depending on the endpoint.
fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
