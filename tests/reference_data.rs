mod common;

use common::{read_fixture, seeded_conn};
use hoops_ingest::player_resolver::{Cascade, PlayerDirectory, Resolution};
use hoops_ingest::seed;
use hoops_ingest::teams::TeamDirectory;

fn matched(id: &str, stage: &'static str) -> Resolution {
    Resolution::Matched {
        player_id: id.into(),
        stage,
    }
}

#[test]
fn seed_fixture_loads() {
    let data = seed::parse_seed(&read_fixture("seed.json")).expect("seed fixture should parse");
    assert_eq!(data.teams.len(), 6);
    assert!(data.players.iter().any(|p| p.player_id == "p-butler"));
}

#[test]
fn team_codes_resolve_through_aliases() {
    let conn = seeded_conn();
    let teams = TeamDirectory::load(&conn).unwrap();
    assert_eq!(teams.resolve_code("bkn"), Some("BKN"));
    assert_eq!(teams.resolve_code("BRK"), Some("BKN"));
    assert_eq!(teams.resolve_code("PHO"), Some("PHX"));
    assert_eq!(teams.resolve_code("NY"), Some("NYK"));
    assert_eq!(teams.resolve_code("SEA"), None);
    assert_eq!(teams.codes_of("BKN"), vec!["BKN", "BRK", "NJN"]);
}

#[test]
fn box_score_spellings_resolve_against_seeded_players() {
    let conn = seeded_conn();
    let players = PlayerDirectory::load(&conn).unwrap();
    let cascade = Cascade::standard();

    assert_eq!(
        cascade.resolve(&players, "Jayson Tatum", Some("BOS")),
        matched("p-tatum", "exact")
    );
    assert_eq!(
        cascade.resolve(&players, "Kristaps Porzingis", Some("BOS")),
        matched("p-porzingis", "canonical")
    );
    assert_eq!(
        cascade.resolve(&players, "Royce O'Neale", Some("PHX")),
        matched("p-oneale", "canonical")
    );
    assert_eq!(
        cascade.resolve(&players, "Michael Porter Jr.", Some("BKN")),
        matched("p-mpj", "suffixless")
    );
    assert_eq!(
        cascade.resolve(&players, "Jimmy Butler", Some("NYK")),
        matched("p-butler", "exact_any_team")
    );
    assert_eq!(
        cascade.resolve(&players, "Unknown Rookie", Some("NYK")),
        Resolution::Unresolved
    );
    assert_eq!(
        cascade.resolve(&players, "Grayson Allen", Some("PHX")),
        Resolution::Unresolved
    );
}

#[test]
fn reseeding_is_idempotent() {
    let mut conn = seeded_conn();
    let data = seed::parse_seed(&read_fixture("seed.json")).unwrap();
    let summary = seed::apply_seed(&mut conn, &data).unwrap();
    assert_eq!(summary.teams, 6);
    let players = PlayerDirectory::load(&conn).unwrap();
    assert_eq!(players.len(), data.players.len());
}
