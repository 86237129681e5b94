mod common;

use chrono::NaiveDate;
use rusqlite::Connection;

use common::{RoutedTransport, context, context_with_limit};
use hoops_ingest::backfill::{self, BackfillFilter};
use hoops_ingest::game_resolver::{self, GameKey};
use hoops_ingest::model::{GameRecord, GameStatus, PlayerGameObservation, SourceKind, TeamGameAggregate};
use hoops_ingest::pipeline::{self, Context, GameOutcome};
use hoops_ingest::{schedule_sync, store};

const NYK_AT_BOS: &str = "20251120-NYK-BOS";
const REFERENCE_PAGE: &str = "/boxscores/202511200BOS.html";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn create_game(ctx: &Context, date: NaiveDate, home: &str, away: &str) -> String {
    game_resolver::resolve(&ctx.conn, &GameKey::new(date, home, away), None)
        .expect("game should resolve")
        .game_id
}

fn observation<'a>(rows: &'a [PlayerGameObservation], player_id: &str) -> &'a PlayerGameObservation {
    rows.iter()
        .find(|o| o.player_id == player_id)
        .unwrap_or_else(|| panic!("no observation for {player_id}"))
}

fn aggregate<'a>(rows: &'a [TeamGameAggregate], team_id: &str) -> &'a TeamGameAggregate {
    rows.iter()
        .find(|a| a.team_id == team_id)
        .unwrap_or_else(|| panic!("no aggregate for {team_id}"))
}

struct Snapshot {
    game: Option<GameRecord>,
    observations: Vec<PlayerGameObservation>,
    aggregates: Vec<TeamGameAggregate>,
    links: Vec<(SourceKind, String)>,
}

fn snapshot(conn: &Connection, game_id: &str) -> Snapshot {
    Snapshot {
        game: store::get_game(conn, game_id).unwrap(),
        observations: store::load_observations(conn, game_id).unwrap(),
        aggregates: store::load_team_aggregates(conn, game_id).unwrap(),
        links: store::source_ids_for_game(conn, game_id).unwrap(),
    }
}

#[test]
fn reference_box_score_end_to_end() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    let game_id = create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");
    assert_eq!(game_id, NYK_AT_BOS);

    let outcome = pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    // 11 player links, 11 observations, 1 unresolved sighting, 2 aggregates,
    // the game state and the game link.
    assert_eq!(
        outcome,
        GameOutcome::Succeeded {
            source: SourceKind::ReferenceSite,
            rows_written: 27,
            unresolved: 1,
        }
    );

    let game = store::get_game(&ctx.conn, &game_id).unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Final);
    assert_eq!((game.home_score, game.away_score), (Some(103), Some(100)));

    let rows = store::load_observations(&ctx.conn, &game_id).unwrap();
    assert_eq!(rows.len(), 11);
    assert!(rows.iter().all(|o| o.source == "reference_site"));
    let butler = observation(&rows, "p-butler");
    assert_eq!(butler.team_id, "NYK", "team comes from the box score, not the roster");
    assert_eq!(butler.points, Some(20));
    assert!(butler.started);
    assert_eq!(observation(&rows, "p-porzingis").points, Some(12));
    assert!(!observation(&rows, "p-pritchard").started);

    let aggs = store::load_team_aggregates(&ctx.conn, &game_id).unwrap();
    let bos = aggregate(&aggs, "BOS");
    let nyk = aggregate(&aggs, "NYK");
    assert!(bos.is_home && !nyk.is_home);
    assert_eq!(bos.points, 103);
    assert_eq!(nyk.points, 100);
    assert_eq!(nyk.field_goals_attempted, 74, "unresolved rows are not aggregated");
    assert_eq!(
        (bos.points_q1, bos.points_q2, bos.points_q3, bos.points_q4, bos.points_ot),
        (Some(28), Some(22), Some(27), Some(26), None)
    );
    assert_eq!(nyk.points_q1, Some(24));

    assert_eq!(
        store::source_ids_for_game(&ctx.conn, &game_id).unwrap(),
        vec![(SourceKind::ReferenceSite, "202511200BOS".to_string())]
    );
    assert_eq!(
        store::player_for_source(&ctx.conn, SourceKind::ReferenceSite, "butleji01").unwrap(),
        Some("p-butler".to_string())
    );

    let report = store::unresolved_report(&ctx.conn).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].raw_name, "Unknown Rookie");
    assert_eq!(report[0].team_context, "NYK");
    assert_eq!(report[0].first_seen, "2025-11-20");
    assert_eq!(report[0].occurrences, 1);
}

#[test]
fn second_run_writes_nothing() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    let game_id = create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");

    pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    let before = snapshot(&ctx.conn, &game_id);
    let outcome = pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    assert_eq!(outcome.rows_written(), 0);

    let after = snapshot(&ctx.conn, &game_id);
    assert_eq!(before.game, after.game);
    assert_eq!(before.observations, after.observations);
    assert_eq!(before.aggregates, after.aggregates);
    assert_eq!(before.links, after.links);
    assert_eq!(store::unresolved_report(&ctx.conn).unwrap()[0].occurrences, 1);
}

#[test]
fn dry_run_leaves_store_untouched() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    let game_id = create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");

    let outcome = pipeline::process_game(&mut ctx, &game_id, true).unwrap();
    assert_eq!(outcome.rows_written(), 27, "a dry run still reports what it would write");

    let after = snapshot(&ctx.conn, &game_id);
    let game = after.game.unwrap();
    assert_eq!(game.status, GameStatus::Scheduled);
    assert_eq!(game.home_score, None);
    assert!(after.observations.is_empty());
    assert!(after.aggregates.is_empty());
    assert!(after.links.is_empty());
    assert!(store::unresolved_report(&ctx.conn).unwrap().is_empty());
}

#[test]
fn swapped_sides_find_the_page_under_the_away_code() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    // Stored with NYK at home; the site files the page under BOS.
    let game_id = create_game(&ctx, day(2025, 11, 20), "NYK", "BOS");

    let outcome = pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    assert!(matches!(outcome, GameOutcome::Succeeded { .. }));
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].ends_with("/boxscores/202511200NYK.html"));
    assert!(calls[1].ends_with("/boxscores/202511200NY.html"));
    assert!(calls[2].ends_with(REFERENCE_PAGE));

    let game = store::get_game(&ctx.conn, &game_id).unwrap().unwrap();
    assert_eq!((game.home_score, game.away_score), (Some(100), Some(103)));
    let aggs = store::load_team_aggregates(&ctx.conn, &game_id).unwrap();
    assert!(aggregate(&aggs, "NYK").is_home);
}

#[test]
fn missing_page_is_skipped_not_failed() {
    let transport = RoutedTransport::default();
    let mut ctx = context(&transport);
    let game_id = create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");

    let outcome = pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    assert!(matches!(outcome, GameOutcome::SkippedAbsent { .. }));
    assert!(store::load_observations(&ctx.conn, &game_id).unwrap().is_empty());
}

#[test]
fn access_denied_is_a_failure() {
    let transport = RoutedTransport::default();
    transport.route(REFERENCE_PAGE, 403, "");
    let mut ctx = context(&transport);
    let game_id = create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");

    let outcome = pipeline::process_game(&mut ctx, &game_id, false).unwrap();
    match outcome {
        GameOutcome::Failed { reason } => assert!(reason.contains("access denied")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(transport.calls_matching(REFERENCE_PAGE), 1);
}

#[test]
fn unknown_game_is_an_error() {
    let transport = RoutedTransport::default();
    let mut ctx = context(&transport);
    assert!(pipeline::process_game(&mut ctx, "20991231-X-Y", false).is_err());
}

fn stats_routes(transport: &RoutedTransport) {
    transport.route_fixture("scoreboardv2?GameDate=2025-11-21", "scoreboard.json");
    transport.route_fixture("boxscoretraditionalv3?GameID=0022500260", "stats_boxscore.json");
    transport.route_fixture("boxscoresummaryv2?GameID=0022500260", "stats_summary.json");
}

#[test]
fn recent_game_uses_stats_api() {
    let transport = RoutedTransport::default();
    stats_routes(&transport);
    let mut ctx = context(&transport);
    ctx.as_of = Some(day(2025, 11, 22));

    let sync = schedule_sync::sync_schedule(&mut ctx, SourceKind::StatsApi, &[day(2025, 11, 21)])
        .unwrap();
    assert_eq!(sync.entries, 3);
    assert_eq!(sync.created, 3);
    let game_id = "20251121-BKN-PHX";

    let outcome = pipeline::process_game(&mut ctx, game_id, false).unwrap();
    match &outcome {
        GameOutcome::Succeeded {
            source, unresolved, ..
        } => {
            assert_eq!(*source, SourceKind::StatsApi);
            assert_eq!(*unresolved, 1, "Grayson Allen is not seeded");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(transport.calls_matching("reference.test"), 0);

    let rows = store::load_observations(&ctx.conn, game_id).unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(observation(&rows, "p-mpj").points, Some(30));
    assert_eq!(observation(&rows, "p-oneale").three_pointers_made, Some(3));
    let dunn = observation(&rows, "p-dunn");
    assert_eq!(dunn.dnp_reason.as_deref(), Some("DNP - Coach's Decision"));

    let aggs = store::load_team_aggregates(&ctx.conn, game_id).unwrap();
    assert_eq!(aggregate(&aggs, "BKN").points, 98);
    assert_eq!(aggregate(&aggs, "PHX").points, 92);
    assert_eq!(aggregate(&aggs, "PHX").points_q4, Some(26));

    let game = store::get_game(&ctx.conn, game_id).unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Final);
    assert_eq!((game.home_score, game.away_score), (Some(104), Some(98)));
}

#[test]
fn older_game_tries_reference_before_stats() {
    let transport = RoutedTransport::default();
    stats_routes(&transport);
    let mut ctx = context(&transport);
    ctx.as_of = Some(day(2025, 11, 22));
    schedule_sync::sync_schedule(&mut ctx, SourceKind::StatsApi, &[day(2025, 11, 21)]).unwrap();

    ctx.as_of = Some(day(2025, 12, 30));
    let outcome = pipeline::process_game(&mut ctx, "20251121-BKN-PHX", false).unwrap();
    assert!(matches!(
        outcome,
        GameOutcome::Succeeded {
            source: SourceKind::StatsApi,
            ..
        }
    ));
    let calls = transport.calls();
    let first_reference = calls.iter().position(|u| u.contains("reference.test")).unwrap();
    let first_box = calls.iter().position(|u| u.contains("boxscoretraditionalv3")).unwrap();
    assert!(first_reference < first_box);
}

#[test]
fn backfill_records_run_and_skips() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    ctx.as_of = Some(day(2025, 11, 25));
    create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");
    create_game(&ctx, day(2025, 11, 21), "BOS", "MIA");
    let postponed = create_game(&ctx, day(2025, 11, 22), "BOS", "PHX");
    let mut game = store::get_game(&ctx.conn, &postponed).unwrap().unwrap();
    game.status = GameStatus::Postponed;
    store::write_game_state(&ctx.conn, &game).unwrap();
    create_game(&ctx, day(2025, 11, 30), "NYK", "MIA");

    let report = backfill::run_backfill(&mut ctx, &BackfillFilter::default()).unwrap();
    assert_eq!(report.considered, 2, "postponed and future games are excluded");
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped_absent, 1);
    assert_eq!(report.skipped[0].0, "20251121-MIA-BOS");
    assert_eq!(report.failed, 0);
    assert_eq!(report.rows_written, 27);
    assert!(report.halted.is_none());

    let (kind, total, succeeded, skipped, rows): (String, i64, i64, i64, i64) = ctx
        .conn
        .query_row(
            "SELECT kind, items_total, succeeded, skipped, rows_written FROM ingest_runs",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .unwrap();
    assert_eq!(kind, "backfill");
    assert_eq!((total, succeeded, skipped, rows), (2, 1, 1, 27));

    let again = backfill::run_backfill(
        &mut ctx,
        &BackfillFilter {
            only_missing: true,
            ..BackfillFilter::default()
        },
    )
    .unwrap();
    assert_eq!(again.considered, 1);
}

#[test]
fn backfill_stops_on_server_rate_limit() {
    let transport = RoutedTransport::default();
    transport.route(REFERENCE_PAGE, 429, "");
    let mut ctx = context(&transport);
    ctx.as_of = Some(day(2025, 11, 25));
    create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");
    create_game(&ctx, day(2025, 11, 21), "BOS", "MIA");

    let report = backfill::run_backfill(&mut ctx, &BackfillFilter::default()).unwrap();
    let halt = report.halted.expect("batch should halt");
    assert_eq!(halt.remaining, 2);
    assert!(halt.wait.as_secs() > 0);
    assert_eq!(report.succeeded + report.skipped_absent + report.failed, 0);
    assert_eq!(transport.calls_matching(REFERENCE_PAGE), 4, "one fetch, all retries");
    assert_eq!(transport.calls_matching("202511210BOS"), 0);
}

#[test]
fn backfill_stops_when_local_budget_is_spent() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context_with_limit(&transport, 1);
    ctx.as_of = Some(day(2025, 11, 25));
    create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");
    create_game(&ctx, day(2025, 11, 21), "BOS", "MIA");

    let report = backfill::run_backfill(&mut ctx, &BackfillFilter::default()).unwrap();
    assert_eq!(report.succeeded, 1);
    let halt = report.halted.expect("budget exhaustion halts the batch");
    assert_eq!(halt.remaining, 1);
    assert!(halt.reason.contains("rate budget"));
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn backfill_dry_run_writes_no_run_row() {
    let transport = RoutedTransport::default();
    transport.route_fixture(REFERENCE_PAGE, "reference_boxscore.html");
    let mut ctx = context(&transport);
    ctx.as_of = Some(day(2025, 11, 25));
    create_game(&ctx, day(2025, 11, 20), "BOS", "NYK");

    let report = backfill::run_backfill(
        &mut ctx,
        &BackfillFilter {
            dry_run: true,
            ..BackfillFilter::default()
        },
    )
    .unwrap();
    assert_eq!(report.succeeded, 1);
    let runs: i64 = ctx
        .conn
        .query_row("SELECT COUNT(*) FROM ingest_runs", [], |r| r.get(0))
        .unwrap();
    assert_eq!(runs, 0);
    assert!(store::load_observations(&ctx.conn, NYK_AT_BOS).unwrap().is_empty());
}
