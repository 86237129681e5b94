use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::model::{GameRecord, GameStatus};
use crate::pipeline::{self, Context, GameOutcome};
use crate::store::{self, GameListing, RunTotals};
use crate::teams::TeamDirectory;

#[derive(Debug, Clone, Default)]
pub struct BackfillFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Team code or canonical team id.
    pub team: Option<String>,
    /// Empty means every status except postponed and cancelled.
    pub statuses: Vec<GameStatus>,
    /// Skip games that already have player rows.
    pub only_missing: bool,
    pub max_items: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub wait: Duration,
    pub reason: String,
    pub remaining: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub considered: usize,
    pub succeeded: usize,
    pub skipped_absent: usize,
    pub failed: usize,
    pub rows_written: usize,
    pub unresolved: usize,
    pub skipped: Vec<(String, String)>,
    pub failures: Vec<(String, String)>,
    pub halted: Option<Halt>,
}

impl BackfillReport {
    fn totals(&self) -> RunTotals {
        RunTotals {
            succeeded: self.succeeded,
            skipped: self.skipped_absent,
            failed: self.failed,
            rows_written: self.rows_written,
            halted_wait_secs: self.halted.as_ref().map(|h| h.wait.as_secs()),
            errors: self
                .failures
                .iter()
                .map(|(id, reason)| format!("{id}: {reason}"))
                .collect(),
        }
    }
}

/// Games worth fetching, furthest along first, then oldest, then by id.
/// Games dated after `today` are never candidates.
pub fn select_candidates(
    listings: Vec<GameListing>,
    filter: &BackfillFilter,
    teams: &TeamDirectory,
    today: NaiveDate,
) -> Vec<GameRecord> {
    let team_id = filter.team.as_deref().map(|raw| {
        teams
            .resolve_code(raw)
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string())
    });
    let mut games: Vec<GameRecord> = listings
        .into_iter()
        .filter(|l| !(filter.only_missing && l.has_box_score))
        .map(|l| l.game)
        .filter(|g| g.game_date <= today)
        .filter(|g| {
            if filter.statuses.is_empty() {
                !g.status.is_side_state()
            } else {
                filter.statuses.contains(&g.status)
            }
        })
        .filter(|g| team_id.as_deref().is_none_or(|t| g.side_of(t).is_some()))
        .collect();
    games.sort_by(|a, b| {
        b.status
            .progress_rank()
            .cmp(&a.status.progress_rank())
            .then_with(|| a.game_date.cmp(&b.game_date))
            .then_with(|| a.game_id.cmp(&b.game_id))
    });
    if let Some(max) = filter.max_items {
        games.truncate(max);
    }
    games
}

/// Processes candidates one at a time with a fixed pause between items.
/// A rate-limit outcome stops the batch; everything else is recorded and
/// the next game proceeds.
pub fn run_backfill(ctx: &mut Context, filter: &BackfillFilter) -> Result<BackfillReport> {
    let listings = store::list_games(&ctx.conn, filter.from, filter.to)?;
    let today = ctx.as_of.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let games = select_candidates(listings, filter, &ctx.teams, today);
    let run_id = if filter.dry_run {
        None
    } else {
        Some(store::start_ingest_run(&ctx.conn, "backfill", games.len())?)
    };
    info!(candidates = games.len(), dry_run = filter.dry_run, "backfill starting");

    let mut report = BackfillReport {
        considered: games.len(),
        ..BackfillReport::default()
    };
    for (idx, game) in games.iter().enumerate() {
        if idx > 0 {
            ctx.sleeper.sleep(ctx.item_delay);
        }
        let outcome = match pipeline::process_game(ctx, &game.game_id, filter.dry_run) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(game_id = game.game_id.as_str(), error = %format!("{err:#}"), "game failed");
                GameOutcome::Failed {
                    reason: format!("{err:#}"),
                }
            }
        };
        match outcome {
            GameOutcome::Succeeded {
                rows_written,
                unresolved,
                ..
            } => {
                report.succeeded += 1;
                report.rows_written += rows_written;
                report.unresolved += unresolved;
            }
            GameOutcome::SkippedAbsent { reason } => {
                report.skipped_absent += 1;
                report.skipped.push((game.game_id.clone(), reason));
            }
            GameOutcome::Failed { reason } => {
                report.failed += 1;
                report.failures.push((game.game_id.clone(), reason));
            }
            GameOutcome::RateLimited { wait, reason } => {
                let remaining = games.len() - idx;
                warn!(
                    remaining,
                    wait_secs = wait.as_secs(),
                    "backfill halted by rate limit"
                );
                report.halted = Some(Halt {
                    wait,
                    reason,
                    remaining,
                });
                break;
            }
        }
    }

    if let Some(run_id) = run_id {
        store::finish_ingest_run(&ctx.conn, run_id, &report.totals())?;
    }
    info!(
        succeeded = report.succeeded,
        skipped = report.skipped_absent,
        failed = report.failed,
        rows_written = report.rows_written,
        "backfill finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, day: u32, status: GameStatus, has_box_score: bool) -> GameListing {
        GameListing {
            game: GameRecord {
                game_id: id.into(),
                game_date: NaiveDate::from_ymd_opt(2025, 11, day).unwrap(),
                start_time: None,
                home_team_id: "BOS".into(),
                away_team_id: if id.ends_with('m') { "MIA".into() } else { "NYK".into() },
                home_score: None,
                away_score: None,
                status,
                created_at: String::new(),
            },
            has_box_score,
        }
    }

    fn listings() -> Vec<GameListing> {
        vec![
            listing("s-old", 10, GameStatus::Scheduled, false),
            listing("f-new", 18, GameStatus::Final, false),
            listing("f-old", 12, GameStatus::Final, true),
            listing("p", 11, GameStatus::Postponed, false),
            listing("f-future", 30, GameStatus::Final, false),
            listing("i-m", 19, GameStatus::InProgress, false),
        ]
    }

    fn ids(games: &[GameRecord]) -> Vec<&str> {
        games.iter().map(|g| g.game_id.as_str()).collect()
    }

    #[test]
    fn furthest_status_then_oldest() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        let games = select_candidates(
            listings(),
            &BackfillFilter::default(),
            &TeamDirectory::default(),
            today,
        );
        assert_eq!(ids(&games), vec!["f-old", "f-new", "i-m", "s-old"]);
    }

    #[test]
    fn filters_combine() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        let filter = BackfillFilter {
            only_missing: true,
            team: Some("MIA".into()),
            ..BackfillFilter::default()
        };
        let games = select_candidates(listings(), &filter, &TeamDirectory::default(), today);
        assert_eq!(ids(&games), vec!["i-m"]);

        let filter = BackfillFilter {
            statuses: vec![GameStatus::Final],
            max_items: Some(1),
            ..BackfillFilter::default()
        };
        let games = select_candidates(listings(), &filter, &TeamDirectory::default(), today);
        assert_eq!(ids(&games), vec!["f-old"]);
    }
}
