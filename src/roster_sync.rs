//! Team rosters from the stats API. Keeps `players.team_id` current so the
//! team-scoped match stages see trades, and records each player's stats id.

use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::model::{PlayerRecord, SourceKind};
use crate::pipeline::Context;
use crate::player_resolver::{Cascade, PlayerDirectory, Resolution};
use crate::stats_api::{self, RosterEntry};
use crate::store::{self, RunTotals};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterReport {
    /// Teams whose roster was fetched and applied.
    pub teams: usize,
    pub players: usize,
    pub created: usize,
    pub linked: usize,
    pub moved: usize,
    pub failures: Vec<String>,
    pub halted_wait: Option<Duration>,
}

impl RosterReport {
    pub fn rows_written(&self) -> usize {
        self.created + self.linked + self.moved
    }
}

/// Fetches `season` rosters for every team with a stats id, or only for
/// `only_team` (any known code). Each team is applied in its own
/// transaction; a rate limit stops the run.
pub fn sync_rosters(ctx: &mut Context, season: &str, only_team: Option<&str>) -> Result<RosterReport> {
    let mut targets = store::team_source_ids(&ctx.conn, SourceKind::StatsApi)?;
    if let Some(code) = only_team {
        let team_id = ctx
            .teams
            .resolve_code(code)
            .ok_or_else(|| anyhow!("unknown team {code:?}"))?
            .to_string();
        targets.retain(|(id, _)| *id == team_id);
        if targets.is_empty() {
            return Err(anyhow!("team {team_id} has no stats api id"));
        }
    }

    let run_id = store::start_ingest_run(&ctx.conn, "roster_sync", targets.len())?;
    let mut report = RosterReport::default();

    for (idx, (team_id, stats_team_id)) in targets.iter().enumerate() {
        if idx > 0 {
            ctx.sleeper.sleep(ctx.item_delay);
        }
        let url = ctx.urls.stats_roster(stats_team_id, season);
        let doc = match ctx.clients.stats.fetch(&url) {
            Ok(doc) => doc,
            Err(err) if err.is_rate_limit() => {
                warn!(team_id = team_id.as_str(), error = %err, "roster sync halted by rate limit");
                report.halted_wait = Some(err.resume_after().unwrap_or_default());
                report.failures.push(err.to_string());
                break;
            }
            Err(err) => {
                warn!(team_id = team_id.as_str(), error = %err, "roster request failed");
                report.failures.push(format!("{team_id}: {err}"));
                continue;
            }
        };
        let roster = match stats_api::parse_roster(&doc.body) {
            Ok(roster) if roster.is_empty() => {
                warn!(team_id = team_id.as_str(), season, "roster came back empty");
                report.failures.push(format!("{team_id}: empty roster"));
                continue;
            }
            Ok(roster) => roster,
            Err(err) => {
                report.failures.push(format!("{team_id}: {err:#}"));
                continue;
            }
        };

        let tx = ctx.conn.transaction().context("begin roster transaction")?;
        apply_roster(&tx, &ctx.players, &ctx.cascade, team_id, &roster, &mut report)?;
        tx.commit().context("commit roster transaction")?;
        report.teams += 1;
        report.players += roster.len();
        ctx.reload_reference()?;
        debug!(team_id = team_id.as_str(), directory = ctx.players.len(), "roster applied");
    }

    store::finish_ingest_run(
        &ctx.conn,
        run_id,
        &RunTotals {
            succeeded: report.teams,
            skipped: 0,
            failed: report.failures.len(),
            rows_written: report.rows_written(),
            halted_wait_secs: report.halted_wait.map(|d| d.as_secs()),
            errors: report.failures.clone(),
        },
    )?;
    info!(
        season,
        teams = report.teams,
        created = report.created,
        moved = report.moved,
        "roster sync finished"
    );
    Ok(report)
}

/// Maps each roster row to a player: by stats id, then by name through the
/// cascade, otherwise a new `stats-<id>` player. The player then moves to
/// `team_id`.
pub fn apply_roster(
    conn: &Connection,
    players: &PlayerDirectory,
    cascade: &Cascade,
    team_id: &str,
    roster: &[RosterEntry],
    report: &mut RosterReport,
) -> Result<()> {
    for entry in roster {
        let known = store::player_for_source(conn, SourceKind::StatsApi, &entry.source_player_id)?;
        let player_id = match known {
            Some(player_id) => player_id,
            None => match cascade.resolve(players, &entry.full_name, Some(team_id)) {
                Resolution::Matched { player_id, stage } => {
                    debug!(name = entry.full_name.as_str(), player_id = player_id.as_str(), stage, "roster player matched");
                    if store::link_player_source(conn, SourceKind::StatsApi, &entry.source_player_id, &player_id)? {
                        report.linked += 1;
                    }
                    player_id
                }
                Resolution::Unresolved => {
                    let player_id = format!("stats-{}", entry.source_player_id);
                    store::upsert_player(
                        conn,
                        &PlayerRecord {
                            player_id: player_id.clone(),
                            full_name: entry.full_name.clone(),
                            team_id: Some(team_id.to_string()),
                        },
                    )?;
                    store::link_player_source(conn, SourceKind::StatsApi, &entry.source_player_id, &player_id)?;
                    report.created += 1;
                    player_id
                }
            },
        };
        if store::set_player_team(conn, &player_id, team_id)? {
            info!(player_id = player_id.as_str(), team_id, "player moved teams");
            report.moved += 1;
        }
    }
    Ok(())
}
