//! Schedule listings: the schedule API's paginated game list and the
//! reference site's month schedule page.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::OnceCell;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::model::{GameStatus, SourceKind};
use crate::sources::reference_boxscore_key;
use crate::tabular::parse_int;

/// One game as a schedule source lists it. Team codes are still raw.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub source: SourceKind,
    pub source_game_id: String,
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub home_code: String,
    pub away_code: String,
    pub status: Option<GameStatus>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePage {
    pub entries: Vec<ScheduleEntry>,
    pub next_cursor: Option<String>,
}

pub fn parse_schedule_api(body: &str) -> Result<SchedulePage> {
    let value: Value = serde_json::from_str(body).context("decode schedule api json")?;
    let mut page = SchedulePage {
        next_cursor: value
            .get("meta")
            .and_then(|m| m.get("next_cursor"))
            .and_then(|c| match c {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            }),
        ..SchedulePage::default()
    };

    for game in value
        .get("data")
        .and_then(|d| d.as_array())
        .into_iter()
        .flatten()
    {
        let Some(id) = game.get("id").and_then(|v| v.as_i64()) else {
            continue;
        };
        let Some(date) = game
            .get("date")
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let abbr = |key: &str| {
            game.get(key)
                .and_then(|t| t.get("abbreviation"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let (Some(home_code), Some(away_code)) = (abbr("home_team"), abbr("visitor_team")) else {
            continue;
        };

        let status_text = game.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let status = schedule_api_status(status_text);
        let scored = matches!(status, Some(GameStatus::InProgress | GameStatus::Final));
        let score = |key: &str| {
            game.get(key)
                .and_then(|v| v.as_i64())
                .map(|v| v as i32)
                .filter(|_| scored)
        };

        page.entries.push(ScheduleEntry {
            source: SourceKind::ScheduleApi,
            source_game_id: id.to_string(),
            date,
            start_time: game
                .get("datetime")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            home_code,
            away_code,
            status,
            home_score: score("home_team_score"),
            away_score: score("visitor_team_score"),
        });
    }
    Ok(page)
}

/// The status field carries "Final", a tip-off time for scheduled games, or
/// the live clock ("3rd Qtr", "Halftime").
fn schedule_api_status(raw: &str) -> Option<GameStatus> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(status) = GameStatus::parse(text) {
        return Some(status);
    }
    if DateTime::parse_from_rfc3339(text).is_ok() || text.ends_with("ET") {
        return Some(GameStatus::Scheduled);
    }
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("final") {
        Some(GameStatus::Final)
    } else if lower.contains("qtr") || lower.contains("half") || lower.starts_with("ot") {
        Some(GameStatus::InProgress)
    } else {
        None
    }
}

struct ScheduleSelectors {
    row: Selector,
    cell: Selector,
    anchor: Selector,
}

fn selectors() -> Result<&'static ScheduleSelectors> {
    static SELECTORS: OnceCell<ScheduleSelectors> = OnceCell::new();
    SELECTORS.get_or_try_init(|| {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| anyhow!("failed to create selector {css}: {e}"))
        };
        Ok(ScheduleSelectors {
            row: parse("table#schedule tbody tr")?,
            cell: parse("th, td")?,
            anchor: parse("a[href]")?,
        })
    })
}

/// Month schedule page. Team codes come from `/teams/XXX/` anchors, the
/// box-score key from the `/boxscores/` anchor once the game is played.
pub fn parse_reference_schedule(body: &str) -> Result<Vec<ScheduleEntry>> {
    let sel = selectors()?;
    let document = Html::parse_document(body);
    let mut out = Vec::new();

    for row in document.select(&sel.row) {
        let mut date = None;
        let mut start_time = None;
        let mut home_code = None;
        let mut away_code = None;
        let mut home_pts = None;
        let mut away_pts = None;
        let mut box_key = None;

        for cell in row.select(&sel.cell) {
            let stat = cell.value().attr("data-stat").unwrap_or("");
            let text = cell.text().collect::<String>();
            let href = cell
                .select(&sel.anchor)
                .next()
                .and_then(|a| a.value().attr("href"));
            match stat {
                "date_game" => {
                    date = cell
                        .value()
                        .attr("csk")
                        .and_then(|csk| csk.get(..8))
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok());
                }
                "game_start_time" => {
                    start_time = Some(text.trim().to_string()).filter(|s| !s.is_empty());
                }
                "visitor_team_name" => away_code = href.and_then(team_code_from_href),
                "home_team_name" => home_code = href.and_then(team_code_from_href),
                "visitor_pts" => away_pts = parse_int(&text),
                "home_pts" => home_pts = parse_int(&text),
                "box_score_text" => box_key = href.and_then(boxscore_key_from_href),
                _ => {}
            }
        }

        let (Some(date), Some(home_code), Some(away_code)) = (date, home_code, away_code) else {
            continue;
        };
        let played = home_pts.is_some() && away_pts.is_some();
        out.push(ScheduleEntry {
            source: SourceKind::ReferenceSite,
            source_game_id: box_key.unwrap_or_else(|| reference_boxscore_key(date, &home_code)),
            date,
            start_time,
            home_code,
            away_code,
            status: Some(if played {
                GameStatus::Final
            } else {
                GameStatus::Scheduled
            }),
            home_score: home_pts,
            away_score: away_pts,
        });
    }
    Ok(out)
}

/// `/teams/BOS/2026.html` → `BOS`.
fn team_code_from_href(href: &str) -> Option<String> {
    let rest = href.split("/teams/").nth(1)?;
    let code = rest.split('/').next()?;
    let valid = (2..=4).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase());
    valid.then(|| code.to_string())
}

/// `/boxscores/202511200BOS.html` → `202511200BOS`.
pub fn boxscore_key_from_href(href: &str) -> Option<String> {
    let rest = href.split("/boxscores/").nth(1)?;
    let key = rest.strip_suffix(".html")?;
    let valid = key.len() >= 12
        && key
            .get(..8)
            .is_some_and(|d| d.chars().all(|c| c.is_ascii_digit()));
    valid.then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_api_status_text() {
        assert_eq!(schedule_api_status("Final"), Some(GameStatus::Final));
        assert_eq!(
            schedule_api_status("2025-11-21T00:30:00Z"),
            Some(GameStatus::Scheduled)
        );
        assert_eq!(schedule_api_status("7:30 pm ET"), Some(GameStatus::Scheduled));
        assert_eq!(schedule_api_status("3rd Qtr"), Some(GameStatus::InProgress));
        assert_eq!(schedule_api_status("Halftime"), Some(GameStatus::InProgress));
        assert_eq!(schedule_api_status(""), None);
    }

    #[test]
    fn scheduled_games_do_not_report_zero_scores() {
        let body = r#"{"data":[{"id":17,"date":"2025-11-20","status":"7:30 pm ET",
            "home_team":{"abbreviation":"BOS"},"visitor_team":{"abbreviation":"NYK"},
            "home_team_score":0,"visitor_team_score":0}],"meta":{"next_cursor":null}}"#;
        let page = parse_schedule_api(body).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].home_score, None);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn hrefs() {
        assert_eq!(team_code_from_href("/teams/BOS/2026.html").as_deref(), Some("BOS"));
        assert_eq!(
            boxscore_key_from_href("/boxscores/202511200BOS.html").as_deref(),
            Some("202511200BOS")
        );
        assert_eq!(boxscore_key_from_href("/boxscores/index.fcgi?month=11"), None);
    }
}
