//! Schedule ingestion: creates canonical games ahead of their box scores and
//! moves status and final scores forward as sources report them.

use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::game_resolver::{self, GameKey, SourceRef};
use crate::merge;
use crate::model::{GameUpdate, SourceKind};
use crate::pipeline::Context;
use crate::schedule::{self, ScheduleEntry};
use crate::stats_api;
use crate::store::{self, LinkOutcome, RunTotals};
use crate::teams::TeamDirectory;

/// Guard against a cursor that never ends.
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub requests: usize,
    pub entries: usize,
    pub created: usize,
    pub linked: usize,
    pub updated: usize,
    pub conflicts: usize,
    pub unmapped: Vec<String>,
    pub failures: Vec<String>,
    pub halted_wait: Option<Duration>,
}

impl SyncReport {
    pub fn rows_written(&self) -> usize {
        self.created + self.linked + self.updated
    }
}

enum PullError {
    RateLimited(FetchError),
    Failed(String),
}

impl From<FetchError> for PullError {
    fn from(err: FetchError) -> Self {
        if err.is_rate_limit() {
            PullError::RateLimited(err)
        } else {
            PullError::Failed(err.to_string())
        }
    }
}

impl From<anyhow::Error> for PullError {
    fn from(err: anyhow::Error) -> Self {
        PullError::Failed(format!("{err:#}"))
    }
}

/// The month page lists a whole month; fetch each once and keep the
/// requested days.
fn plan_requests(ctx: &Context, source: SourceKind, dates: &[NaiveDate]) -> Vec<(String, Vec<NaiveDate>)> {
    let mut plan: Vec<(String, Vec<NaiveDate>)> = Vec::new();
    for &date in dates {
        let key = match source {
            SourceKind::ReferenceSite => ctx.urls.reference_schedule(date),
            SourceKind::ScheduleApi => ctx.urls.schedule_games(date, None),
            SourceKind::StatsApi => ctx.urls.stats_scoreboard(date),
        };
        match plan.iter_mut().find(|(k, _)| *k == key) {
            Some((_, days)) => days.push(date),
            None => plan.push((key, vec![date])),
        }
    }
    plan
}

fn pull(
    ctx: &mut Context,
    source: SourceKind,
    url: &str,
    days: &[NaiveDate],
) -> Result<Vec<ScheduleEntry>, PullError> {
    let entries = match source {
        SourceKind::ReferenceSite => {
            let doc = ctx.clients.reference.fetch(url)?;
            schedule::parse_reference_schedule(&doc.body)?
        }
        SourceKind::StatsApi => {
            let doc = ctx.clients.stats.fetch(url)?;
            stats_api::parse_scoreboard(&doc.body)?
        }
        SourceKind::ScheduleApi => {
            let mut entries = Vec::new();
            let mut next_url = url.to_string();
            for page_no in 1..=MAX_PAGES {
                let doc = ctx.clients.schedule.fetch(&next_url)?;
                let page = schedule::parse_schedule_api(&doc.body)?;
                entries.extend(page.entries);
                let (Some(cursor), Some(&date)) = (page.next_cursor, days.first()) else {
                    break;
                };
                if page_no == MAX_PAGES {
                    warn!(url, "schedule pagination cut off");
                }
                next_url = ctx.urls.schedule_games(date, Some(&cursor));
            }
            entries
        }
    };
    Ok(entries.into_iter().filter(|e| days.contains(&e.date)).collect())
}

/// Fetches the schedule for `dates` from `source` and reconciles every
/// listed game into the store. A rate-limit stops the run; other failures
/// are recorded per request.
pub fn sync_schedule(ctx: &mut Context, source: SourceKind, dates: &[NaiveDate]) -> Result<SyncReport> {
    let plan = plan_requests(ctx, source, dates);
    let run_id = store::start_ingest_run(&ctx.conn, &format!("schedule_sync:{source}"), plan.len())?;
    let mut report = SyncReport::default();
    let mut succeeded = 0;

    for (idx, (url, days)) in plan.iter().enumerate() {
        if idx > 0 {
            ctx.sleeper.sleep(ctx.item_delay);
        }
        report.requests += 1;
        let entries = match pull(ctx, source, url, days) {
            Ok(entries) => entries,
            Err(PullError::RateLimited(err)) => {
                warn!(url = url.as_str(), error = %err, "schedule sync halted by rate limit");
                report.halted_wait = Some(err.resume_after().unwrap_or_default());
                report.failures.push(err.to_string());
                break;
            }
            Err(PullError::Failed(reason)) => {
                warn!(url = url.as_str(), reason = reason.as_str(), "schedule request failed");
                report.failures.push(format!("{url}: {reason}"));
                continue;
            }
        };

        let tx = ctx.conn.transaction().context("begin schedule transaction")?;
        for entry in &entries {
            apply_entry(&tx, &ctx.teams, entry, &mut report)?;
        }
        tx.commit().context("commit schedule transaction")?;
        report.entries += entries.len();
        succeeded += 1;
    }

    store::finish_ingest_run(
        &ctx.conn,
        run_id,
        &RunTotals {
            succeeded,
            skipped: 0,
            failed: report.failures.len(),
            rows_written: report.rows_written(),
            halted_wait_secs: report.halted_wait.map(|d| d.as_secs()),
            errors: report.failures.clone(),
        },
    )?;
    info!(
        source = %source,
        entries = report.entries,
        created = report.created,
        updated = report.updated,
        "schedule sync finished"
    );
    Ok(report)
}

/// Reconciles one schedule entry. Unknown team codes are reported, not
/// created.
pub fn apply_entry(
    conn: &Connection,
    teams: &TeamDirectory,
    entry: &ScheduleEntry,
    report: &mut SyncReport,
) -> Result<()> {
    let (Some(home), Some(away)) = (
        teams.resolve_code(&entry.home_code),
        teams.resolve_code(&entry.away_code),
    ) else {
        for code in [&entry.home_code, &entry.away_code] {
            if teams.resolve_code(code).is_none() && !report.unmapped.contains(code) {
                report.unmapped.push(code.clone());
            }
        }
        return Ok(());
    };
    if home == away {
        warn!(source_id = entry.source_game_id.as_str(), "same team on both sides; skipped");
        return Ok(());
    }

    let resolved = game_resolver::resolve_either_orientation(
        conn,
        &GameKey::new(entry.date, home, away),
        Some(SourceRef {
            source: entry.source,
            source_id: &entry.source_game_id,
        }),
    )?;
    if resolved.created {
        report.created += 1;
    }
    match resolved.link {
        Some(LinkOutcome::Linked) => report.linked += 1,
        Some(LinkOutcome::Conflict { .. }) => report.conflicts += 1,
        _ => {}
    }

    let game = store::get_game(conn, &resolved.game_id)?
        .ok_or_else(|| anyhow!("game {} vanished after resolution", resolved.game_id))?;
    // Scores follow the stored orientation, not the listing's.
    let (home_score, away_score) = if game.home_team_id == home {
        (entry.home_score, entry.away_score)
    } else {
        (entry.away_score, entry.home_score)
    };
    let outcome = merge::merge_game(
        &game,
        &GameUpdate {
            status: entry.status,
            home_score,
            away_score,
            start_time: entry.start_time.clone(),
        },
    );
    if outcome.changed && store::write_game_state(conn, &outcome.record)? {
        report.updated += 1;
    }
    Ok(())
}
