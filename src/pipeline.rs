//! Box-score ingestion for one canonical game.
//!
//! All network work happens first. The extract is then resolved, aggregated
//! and merged inside a single transaction, which a dry run rolls back.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::aggregate::{self, TeamQuarters};
use crate::config::{IngestConfig, SourceClients};
use crate::error::FetchError;
use crate::fetch::{Sleeper, ThreadSleeper};
use crate::merge;
use crate::model::{GameRecord, GameStatus, GameUpdate, PlayerGameObservation, SourceKind};
use crate::player_resolver::{Cascade, PlayerDirectory, Resolution};
use crate::sources::{self, SourceUrls};
use crate::stats_api;
use crate::store::{self, LinkOutcome};
use crate::tabular::{self, BoxScoreExtract, PlayerLine};
use crate::teams::TeamDirectory;

/// Games this recent prefer the stats API, which publishes within minutes.
const RECENT_DAYS: i64 = 3;

/// Everything a driver needs: the store, one client per source and the
/// reference directories loaded once per run.
pub struct Context {
    pub conn: Connection,
    pub clients: SourceClients,
    pub urls: SourceUrls,
    pub teams: TeamDirectory,
    pub players: PlayerDirectory,
    pub cascade: Cascade,
    pub sleeper: Box<dyn Sleeper>,
    pub item_delay: Duration,
    /// Pins "today" for source ordering; the wall clock when unset.
    pub as_of: Option<NaiveDate>,
}

impl Context {
    pub fn new(conn: Connection, clients: SourceClients, urls: SourceUrls) -> Result<Self> {
        let teams = TeamDirectory::load(&conn)?;
        let players = PlayerDirectory::load(&conn)?;
        if teams.is_empty() {
            warn!("team reference table is empty; run seed_reference first");
        }
        Ok(Self {
            conn,
            clients,
            urls,
            teams,
            players,
            cascade: Cascade::standard(),
            sleeper: Box::new(ThreadSleeper),
            item_delay: Duration::ZERO,
            as_of: None,
        })
    }

    pub fn from_config(config: &IngestConfig, conn: Connection) -> Result<Self> {
        let clients = SourceClients::from_config(config)?;
        let mut ctx = Self::new(conn, clients, config.urls.clone())?;
        ctx.item_delay = config.backfill_item_delay;
        Ok(ctx)
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn reload_reference(&mut self) -> Result<()> {
        self.teams = TeamDirectory::load(&self.conn)?;
        self.players = PlayerDirectory::load(&self.conn)?;
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Succeeded {
        source: SourceKind,
        rows_written: usize,
        unresolved: usize,
    },
    /// Nothing published yet, or a page with no box score on it.
    SkippedAbsent { reason: String },
    Failed { reason: String },
    /// The batch must stop; `wait` is how long to pause before resuming.
    RateLimited { wait: Duration, reason: String },
}

impl GameOutcome {
    pub fn rows_written(&self) -> usize {
        match self {
            GameOutcome::Succeeded { rows_written, .. } => *rows_written,
            _ => 0,
        }
    }
}

struct Fetched {
    source: SourceKind,
    source_game_id: String,
    extract: BoxScoreExtract,
}

enum FetchStep {
    Got(Fetched),
    Absent(String),
    Failed(String),
}

/// Which sources to try, in order.
pub fn source_order(
    game_date: NaiveDate,
    today: NaiveDate,
    stats_game_id: Option<&str>,
) -> Vec<SourceKind> {
    match stats_game_id {
        Some(_) if (today - game_date).num_days() <= RECENT_DAYS => {
            vec![SourceKind::StatsApi, SourceKind::ReferenceSite]
        }
        Some(_) => vec![SourceKind::ReferenceSite, SourceKind::StatsApi],
        None => vec![SourceKind::ReferenceSite],
    }
}

/// Fetches, resolves, aggregates and merges one game. Store errors propagate;
/// every fetch and data problem is reported through the outcome.
pub fn process_game(ctx: &mut Context, game_id: &str, dry_run: bool) -> Result<GameOutcome> {
    let game = store::get_game(&ctx.conn, game_id)?
        .ok_or_else(|| anyhow!("unknown game {game_id}"))?;
    let links = store::source_ids_for_game(&ctx.conn, game_id)?;
    let linked = |kind: SourceKind| {
        links
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
    };
    let stats_id = linked(SourceKind::StatsApi);
    let reference_key = linked(SourceKind::ReferenceSite);

    let mut absent = Vec::new();
    let mut failures = Vec::new();
    let mut fetched = None;
    for source in source_order(game.game_date, ctx.today(), stats_id.as_deref()) {
        let step = match source {
            SourceKind::StatsApi => match stats_id.as_deref() {
                Some(id) => fetch_stats(ctx, id),
                None => continue,
            },
            _ => fetch_reference(ctx, &game, reference_key.as_deref()),
        };
        match step {
            Ok(FetchStep::Got(f)) => {
                fetched = Some(f);
                break;
            }
            Ok(FetchStep::Absent(reason)) => absent.push(reason),
            Ok(FetchStep::Failed(reason)) => failures.push(reason),
            Err(err) => {
                let wait = err.resume_after().unwrap_or_default();
                warn!(game_id, error = %err, "rate limited, stopping");
                return Ok(GameOutcome::RateLimited {
                    wait,
                    reason: err.to_string(),
                });
            }
        }
    }

    let Some(fetched) = fetched else {
        return Ok(if failures.is_empty() {
            GameOutcome::SkippedAbsent {
                reason: join_reasons(&absent, "no box score published"),
            }
        } else {
            GameOutcome::Failed {
                reason: join_reasons(&failures, "fetch failed"),
            }
        });
    };

    let tx = ctx
        .conn
        .transaction()
        .context("begin game ingest transaction")?;
    let applied = apply_extract(
        &tx,
        &ctx.teams,
        &ctx.players,
        &ctx.cascade,
        &game,
        &fetched,
    )?;
    if dry_run {
        tx.rollback().context("roll back dry run")?;
    } else {
        tx.commit().context("commit game ingest transaction")?;
    }
    info!(
        game_id,
        source = %fetched.source,
        rows_written = applied.rows_written,
        unresolved = applied.unresolved,
        dry_run,
        "game processed"
    );
    Ok(GameOutcome::Succeeded {
        source: fetched.source,
        rows_written: applied.rows_written,
        unresolved: applied.unresolved,
    })
}

fn join_reasons(reasons: &[String], fallback: &str) -> String {
    if reasons.is_empty() {
        fallback.to_string()
    } else {
        reasons.join("; ")
    }
}

/// Ok(step) for everything a batch can continue past; Err only for rate
/// limits.
fn classify(err: FetchError) -> Result<FetchStep, FetchError> {
    if err.is_rate_limit() {
        return Err(err);
    }
    if err.is_not_found() {
        return Ok(FetchStep::Absent(err.to_string()));
    }
    Ok(FetchStep::Failed(err.to_string()))
}

fn fetch_stats(ctx: &mut Context, stats_game_id: &str) -> Result<FetchStep, FetchError> {
    let url = ctx.urls.stats_boxscore(stats_game_id);
    let doc = match ctx.clients.stats.fetch(&url) {
        Ok(doc) => doc,
        Err(err) => return classify(err),
    };
    let mut extract = match tabular::extract(&doc) {
        Ok(extract) => extract,
        Err(err) => return Ok(FetchStep::Failed(format!("{url}: {err:#}"))),
    };
    if extract.is_empty() {
        return Ok(FetchStep::Absent(format!("{url}: box score not published")));
    }

    // The line score is optional: a failed summary keeps the box score.
    let summary_url = ctx.urls.stats_summary(stats_game_id);
    match ctx.clients.stats.fetch(&summary_url) {
        Ok(doc) => match stats_api::extract_summary(&doc.body) {
            Ok(summary) => {
                if extract.status.is_none() {
                    extract.status = summary.status;
                }
                if extract.line_scores.is_empty() {
                    extract.line_scores = summary.line_scores;
                }
            }
            Err(err) => debug!(url = summary_url.as_str(), error = %err, "summary unreadable"),
        },
        Err(err) if err.is_rate_limit() => return Err(err),
        Err(err) => debug!(url = summary_url.as_str(), error = %err, "summary unavailable"),
    }

    Ok(FetchStep::Got(Fetched {
        source: SourceKind::StatsApi,
        source_game_id: stats_game_id.to_string(),
        extract,
    }))
}

/// Candidate page keys: a linked key first, then every code of the home
/// team, then every code of the away team for games filed with sides swapped.
fn reference_keys(teams: &TeamDirectory, game: &GameRecord, linked: Option<&str>) -> Vec<String> {
    let mut keys: Vec<String> = linked.map(str::to_string).into_iter().collect();
    for team_id in [&game.home_team_id, &game.away_team_id] {
        let mut codes = teams.codes_of(team_id);
        if codes.is_empty() {
            codes.push(team_id.clone());
        }
        for code in codes {
            let key = sources::reference_boxscore_key(game.game_date, &code);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

fn fetch_reference(
    ctx: &mut Context,
    game: &GameRecord,
    linked: Option<&str>,
) -> Result<FetchStep, FetchError> {
    let mut misses = Vec::new();
    for key in reference_keys(&ctx.teams, game, linked) {
        let url = ctx.urls.reference_boxscore(&key);
        let doc = match ctx.clients.reference.fetch(&url) {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => {
                misses.push(key);
                continue;
            }
            Err(err) => return classify(err),
        };
        return match tabular::extract(&doc) {
            Ok(extract) if extract.is_empty() => {
                Ok(FetchStep::Absent(format!("{url}: page has no box score")))
            }
            Ok(extract) => Ok(FetchStep::Got(Fetched {
                source: SourceKind::ReferenceSite,
                source_game_id: key,
                extract,
            })),
            Err(err) => Ok(FetchStep::Failed(format!("{url}: {err:#}"))),
        };
    }
    Ok(FetchStep::Absent(format!(
        "reference box score not found (tried {})",
        misses.join(", ")
    )))
}

#[derive(Debug, Default)]
struct Applied {
    rows_written: usize,
    unresolved: usize,
}

fn apply_extract(
    conn: &Connection,
    teams: &TeamDirectory,
    players: &PlayerDirectory,
    cascade: &Cascade,
    game: &GameRecord,
    fetched: &Fetched,
) -> Result<Applied> {
    let source = fetched.source;
    let mut applied = Applied::default();
    let mut seen = HashSet::new();
    let mut quarters = Vec::new();
    let mut home_points = None;
    let mut away_points = None;

    for table in &fetched.extract.teams {
        let Some(team_id) = teams
            .resolve_code(&table.team_code)
            .filter(|id| game.side_of(id).is_some())
            .map(str::to_string)
        else {
            warn!(
                game_id = game.game_id.as_str(),
                team_code = table.team_code.as_str(),
                "box score team does not belong to this game; skipped"
            );
            continue;
        };
        if game.side_of(&team_id) == Some(true) {
            home_points = table.team_points();
        } else {
            away_points = table.team_points();
        }
        if let Some(line) = fetched.extract.line_score(&table.team_code) {
            quarters.push(TeamQuarters {
                team_id: team_id.clone(),
                q1: line.quarter(1),
                q2: line.quarter(2),
                q3: line.quarter(3),
                q4: line.quarter(4),
                ot: line.overtime(),
            });
        }

        for line in &table.players {
            let Some(player_id) =
                resolve_player(conn, players, cascade, source, line, &team_id, &mut applied)?
            else {
                let fresh = store::record_unresolved(
                    conn,
                    line.name.trim(),
                    &table.team_code.to_ascii_uppercase(),
                    &game.game_id,
                    source.as_str(),
                    game.game_date,
                )?;
                applied.unresolved += 1;
                if fresh {
                    applied.rows_written += 1;
                }
                continue;
            };
            if !seen.insert(player_id.clone()) {
                warn!(
                    game_id = game.game_id.as_str(),
                    player_id = player_id.as_str(),
                    raw_name = line.name.as_str(),
                    "player appears twice in one box score; later row ignored"
                );
                continue;
            }
            let row = observation(&game.game_id, &player_id, &team_id, line, source);
            if store::upsert_observation(conn, &row)? {
                applied.rows_written += 1;
            }
        }
    }

    applied.rows_written += aggregate::refresh_game(conn, game, Some(&quarters))?;

    let mut status = fetched.extract.status;
    let scores_usable = status != Some(GameStatus::Scheduled);
    if status == Some(GameStatus::Final) && (home_points.is_none() || away_points.is_none()) {
        warn!(
            game_id = game.game_id.as_str(),
            "final box score lacks one team's points; status left as stored"
        );
        status = None;
    }
    let update = GameUpdate {
        status,
        home_score: home_points.filter(|_| scores_usable),
        away_score: away_points.filter(|_| scores_usable),
        start_time: None,
    };
    let outcome = merge::merge_game(game, &update);
    if outcome.changed && store::write_game_state(conn, &outcome.record)? {
        applied.rows_written += 1;
    }

    if store::link_game_source(conn, source, &fetched.source_game_id, &game.game_id)?
        == LinkOutcome::Linked
    {
        applied.rows_written += 1;
    }
    Ok(applied)
}

fn resolve_player(
    conn: &Connection,
    players: &PlayerDirectory,
    cascade: &Cascade,
    source: SourceKind,
    line: &PlayerLine,
    team_id: &str,
    applied: &mut Applied,
) -> Result<Option<String>> {
    if let Some(source_id) = line.source_player_id.as_deref()
        && let Some(player_id) = store::player_for_source(conn, source, source_id)?
    {
        return Ok(Some(player_id));
    }
    match cascade.resolve(players, &line.name, Some(team_id)) {
        Resolution::Matched { player_id, stage } => {
            debug!(raw_name = line.name.as_str(), player_id = player_id.as_str(), stage, "player matched");
            if let Some(source_id) = line.source_player_id.as_deref()
                && store::link_player_source(conn, source, source_id, &player_id)?
            {
                applied.rows_written += 1;
            }
            Ok(Some(player_id))
        }
        Resolution::Unresolved => {
            debug!(raw_name = line.name.as_str(), team_id, "player unresolved");
            Ok(None)
        }
    }
}

fn observation(
    game_id: &str,
    player_id: &str,
    team_id: &str,
    line: &PlayerLine,
    source: SourceKind,
) -> PlayerGameObservation {
    let s = &line.stats;
    PlayerGameObservation {
        game_id: game_id.to_string(),
        player_id: player_id.to_string(),
        team_id: team_id.to_string(),
        minutes: s.minutes,
        points: s.points,
        offensive_rebounds: s.offensive_rebounds,
        defensive_rebounds: s.defensive_rebounds,
        rebounds: s.rebounds,
        assists: s.assists,
        steals: s.steals,
        blocks: s.blocks,
        turnovers: s.turnovers,
        personal_fouls: s.personal_fouls,
        field_goals_made: s.field_goals_made,
        field_goals_attempted: s.field_goals_attempted,
        three_pointers_made: s.three_pointers_made,
        three_pointers_attempted: s.three_pointers_attempted,
        free_throws_made: s.free_throws_made,
        free_throws_attempted: s.free_throws_attempted,
        plus_minus: s.plus_minus,
        started: line.started,
        dnp_reason: line.dnp_reason.clone(),
        source: source.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlayerRecord, TeamRecord};
    use crate::tabular::{StatLine, TeamTable};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn recent_games_try_stats_first() {
        let today = day(2025, 11, 22);
        assert_eq!(
            source_order(day(2025, 11, 21), today, Some("0022500250")),
            vec![SourceKind::StatsApi, SourceKind::ReferenceSite]
        );
        assert_eq!(
            source_order(day(2025, 10, 30), today, Some("0022500001")),
            vec![SourceKind::ReferenceSite, SourceKind::StatsApi]
        );
        assert_eq!(
            source_order(day(2025, 11, 21), today, None),
            vec![SourceKind::ReferenceSite]
        );
    }

    #[test]
    fn reference_keys_cover_aliases_and_swapped_sides() {
        let teams = TeamDirectory::from_parts(
            vec![
                TeamRecord {
                    team_id: "t-bkn".into(),
                    code: "BKN".into(),
                    name: "Brooklyn Nets".into(),
                },
                TeamRecord {
                    team_id: "t-bos".into(),
                    code: "BOS".into(),
                    name: "Boston Celtics".into(),
                },
            ],
            vec![("BRK".into(), "t-bkn".into())],
        );
        let game = GameRecord {
            game_id: "20251120-t-bos-t-bkn".into(),
            game_date: day(2025, 11, 20),
            start_time: None,
            home_team_id: "t-bkn".into(),
            away_team_id: "t-bos".into(),
            home_score: None,
            away_score: None,
            status: GameStatus::Scheduled,
            created_at: String::new(),
        };
        assert_eq!(
            reference_keys(&teams, &game, None),
            vec!["202511200BKN", "202511200BRK", "202511200BOS"]
        );
        assert_eq!(
            reference_keys(&teams, &game, Some("202511200BRK"))[0],
            "202511200BRK"
        );
    }

    #[test]
    fn one_sided_final_box_score_does_not_finish_the_game() {
        let conn = store::open_in_memory().unwrap();
        for (id, name) in [("BOS", "Boston Celtics"), ("NYK", "New York Knicks")] {
            let team = TeamRecord {
                team_id: id.into(),
                code: id.into(),
                name: name.into(),
            };
            store::upsert_team(&conn, &team, &[]).unwrap();
        }
        let game = GameRecord {
            game_id: "20251120-NYK-BOS".into(),
            game_date: day(2025, 11, 20),
            start_time: None,
            home_team_id: "BOS".into(),
            away_team_id: "NYK".into(),
            home_score: None,
            away_score: None,
            status: GameStatus::Scheduled,
            created_at: store::now_ts(),
        };
        store::insert_game(&conn, &game).unwrap();

        let mut bos = TeamTable::new("BOS");
        bos.players.push(PlayerLine {
            name: "Jayson Tatum".into(),
            source_player_id: None,
            started: true,
            dnp_reason: None,
            stats: StatLine {
                minutes: Some(36.0),
                points: Some(30),
                ..StatLine::default()
            },
        });
        bos.totals = Some(StatLine {
            points: Some(103),
            ..StatLine::default()
        });
        let fetched = Fetched {
            source: SourceKind::ReferenceSite,
            source_game_id: "202511200BOS".into(),
            extract: BoxScoreExtract {
                teams: vec![bos, TeamTable::new("XYZ")],
                status: Some(GameStatus::Final),
                ..BoxScoreExtract::default()
            },
        };
        let players = PlayerDirectory::from_players(vec![PlayerRecord {
            player_id: "p-tatum".into(),
            full_name: "Jayson Tatum".into(),
            team_id: Some("BOS".into()),
        }]);
        let teams = TeamDirectory::load(&conn).unwrap();
        apply_extract(&conn, &teams, &players, &Cascade::standard(), &game, &fetched).unwrap();

        let stored = store::get_game(&conn, &game.game_id).unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Scheduled);
        assert_eq!((stored.home_score, stored.away_score), (Some(103), None));
    }
}
