use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use hoops_ingest::aggregate::aggregate_game;
use hoops_ingest::model::{PlayerGameObservation, PlayerRecord};
use hoops_ingest::player_resolver::{Cascade, PlayerDirectory};
use hoops_ingest::seed::parse_seed;
use hoops_ingest::{boxscore_csv, boxscore_html, names, stats_api};

fn bench_reference_html_extract(c: &mut Criterion) {
    c.bench_function("reference_html_extract", |b| {
        b.iter(|| {
            let extract = boxscore_html::extract(black_box(REFERENCE_HTML)).unwrap();
            black_box(extract.teams.len());
        })
    });
}

fn bench_csv_extract(c: &mut Criterion) {
    c.bench_function("csv_extract", |b| {
        b.iter(|| {
            let extract = boxscore_csv::extract(black_box(EXPORT_CSV));
            black_box(extract.teams.len());
        })
    });
}

fn bench_stats_json_extract(c: &mut Criterion) {
    c.bench_function("stats_json_extract", |b| {
        b.iter(|| {
            let extract = stats_api::extract_boxscore(black_box(STATS_JSON)).unwrap();
            black_box(extract.teams.len());
        })
    });
}

fn bench_name_keys(c: &mut Criterion) {
    let raw = ["Kristaps Porziņģis", "Royce O\u{2019}Neale", "Michael Porter Jr.", "Day'Ron Sharpe"];
    c.bench_function("name_keys", |b| {
        b.iter(|| {
            for name in raw {
                black_box(names::suffixless_key(black_box(name)));
            }
        })
    });
}

fn bench_player_cascade(c: &mut Criterion) {
    let seed = parse_seed(SEED_JSON).expect("valid seed fixture");
    let players = PlayerDirectory::from_players(
        seed.players
            .iter()
            .map(|p| PlayerRecord {
                player_id: p.player_id.clone(),
                full_name: p.full_name.clone(),
                team_id: p.team_id.clone(),
            })
            .collect(),
    );
    let cascade = Cascade::standard();
    let extract = boxscore_html::extract(REFERENCE_HTML).expect("valid html fixture");

    c.bench_function("player_cascade", |b| {
        b.iter(|| {
            let mut matched = 0;
            for table in &extract.teams {
                for line in &table.players {
                    let resolution = cascade.resolve(&players, &line.name, Some(&table.team_code));
                    if resolution.player_id().is_some() {
                        matched += 1;
                    }
                }
            }
            black_box(matched);
        })
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let observations: Vec<PlayerGameObservation> = (0..26)
        .map(|i| PlayerGameObservation {
            game_id: "g".into(),
            player_id: format!("p{i}"),
            team_id: if i % 2 == 0 { "BOS".into() } else { "NYK".into() },
            minutes: Some(18.5),
            points: Some(i % 30),
            field_goals_attempted: Some(i % 15),
            free_throws_attempted: Some(i % 7),
            offensive_rebounds: Some(i % 3),
            turnovers: Some(i % 4),
            source: "bench".into(),
            ..PlayerGameObservation::default()
        })
        .collect();

    c.bench_function("aggregate_game", |b| {
        b.iter(|| {
            let aggs = aggregate_game("g", "BOS", black_box(&observations), &[]);
            black_box(aggs.len());
        })
    });
}

criterion_group!(
    perf,
    bench_reference_html_extract,
    bench_csv_extract,
    bench_stats_json_extract,
    bench_name_keys,
    bench_player_cascade,
    bench_aggregate
);
criterion_main!(perf);

static REFERENCE_HTML: &str = include_str!("../tests/fixtures/reference_boxscore.html");
static EXPORT_CSV: &str = include_str!("../tests/fixtures/boxscore_export.csv");
static STATS_JSON: &str = include_str!("../tests/fixtures/stats_boxscore.json");
static SEED_JSON: &str = include_str!("../tests/fixtures/seed.json");
