//! Team rollups derived from player observations.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::model::{GameRecord, PlayerGameObservation, TeamGameAggregate};
use crate::store;

/// Per-period points for one team, already mapped to a canonical team id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamQuarters {
    pub team_id: String,
    pub q1: Option<i32>,
    pub q2: Option<i32>,
    pub q3: Option<i32>,
    pub q4: Option<i32>,
    pub ot: Option<i32>,
}

impl TeamQuarters {
    fn from_aggregate(agg: &TeamGameAggregate) -> Self {
        Self {
            team_id: agg.team_id.clone(),
            q1: agg.points_q1,
            q2: agg.points_q2,
            q3: agg.points_q3,
            q4: agg.points_q4,
            ot: agg.points_ot,
        }
    }
}

/// FGA + 0.44·FTA − OREB + TOV.
pub fn possessions(fga: i32, fta: i32, oreb: i32, tov: i32) -> f64 {
    let raw = fga as f64 + 0.44 * fta as f64 - oreb as f64 + tov as f64;
    (raw * 100.0).round() / 100.0
}

/// One aggregate per team that has at least one observation. Players with a
/// DNP reason are skipped; null counts contribute nothing. Output is sorted
/// home first, so the result does not depend on observation order.
pub fn aggregate_game(
    game_id: &str,
    home_team_id: &str,
    observations: &[PlayerGameObservation],
    quarters: &[TeamQuarters],
) -> Vec<TeamGameAggregate> {
    let mut by_team: BTreeMap<&str, (TeamGameAggregate, i64)> = BTreeMap::new();

    for obs in observations.iter().filter(|o| o.game_id == game_id) {
        let (agg, centi_minutes) = by_team.entry(obs.team_id.as_str()).or_insert_with(|| {
            (
                TeamGameAggregate {
                    game_id: game_id.to_string(),
                    team_id: obs.team_id.clone(),
                    is_home: obs.team_id == home_team_id,
                    ..TeamGameAggregate::default()
                },
                0,
            )
        });
        if !obs.played() {
            continue;
        }
        let add = |total: &mut i32, v: Option<i32>| *total += v.unwrap_or(0);
        add(&mut agg.points, obs.points);
        add(&mut agg.field_goals_made, obs.field_goals_made);
        add(&mut agg.field_goals_attempted, obs.field_goals_attempted);
        add(&mut agg.three_pointers_made, obs.three_pointers_made);
        add(&mut agg.three_pointers_attempted, obs.three_pointers_attempted);
        add(&mut agg.free_throws_made, obs.free_throws_made);
        add(&mut agg.free_throws_attempted, obs.free_throws_attempted);
        add(&mut agg.offensive_rebounds, obs.offensive_rebounds);
        add(&mut agg.defensive_rebounds, obs.defensive_rebounds);
        add(&mut agg.rebounds, obs.rebounds);
        add(&mut agg.assists, obs.assists);
        add(&mut agg.steals, obs.steals);
        add(&mut agg.blocks, obs.blocks);
        add(&mut agg.turnovers, obs.turnovers);
        add(&mut agg.personal_fouls, obs.personal_fouls);
        // Summed in hundredths so the total is exact whatever the order.
        *centi_minutes += obs.minutes.map(|m| (m * 100.0).round() as i64).unwrap_or(0);
    }

    let mut out: Vec<TeamGameAggregate> = by_team
        .into_values()
        .map(|(mut agg, centi_minutes)| {
            agg.minutes = centi_minutes as f64 / 100.0;
            agg.possessions = possessions(
                agg.field_goals_attempted,
                agg.free_throws_attempted,
                agg.offensive_rebounds,
                agg.turnovers,
            );
            if let Some(q) = quarters.iter().find(|q| q.team_id == agg.team_id) {
                agg.points_q1 = q.q1;
                agg.points_q2 = q.q2;
                agg.points_q3 = q.q3;
                agg.points_q4 = q.q4;
                agg.points_ot = q.ot;
            }
            agg
        })
        .collect();
    out.sort_by(|a, b| b.is_home.cmp(&a.is_home).then_with(|| a.team_id.cmp(&b.team_id)));
    out
}

/// Recomputes and stores the aggregates for `game`. Each team takes its
/// quarter points from `line_score` when that covers it, otherwise the
/// stored values are carried over. Returns the number of rows written.
pub fn refresh_game(
    conn: &Connection,
    game: &GameRecord,
    line_score: Option<&[TeamQuarters]>,
) -> Result<usize> {
    let observations = store::load_observations(conn, &game.game_id)?;
    let incoming = line_score.unwrap_or_default();
    let mut quarters: Vec<TeamQuarters> = store::load_team_aggregates(conn, &game.game_id)?
        .iter()
        .filter(|stored| !incoming.iter().any(|q| q.team_id == stored.team_id))
        .map(TeamQuarters::from_aggregate)
        .collect();
    quarters.extend(incoming.iter().cloned());

    let mut written = 0;
    for agg in aggregate_game(&game.game_id, &game.home_team_id, &observations, &quarters) {
        if store::upsert_team_aggregate(conn, &agg)? {
            written += 1;
        }
    }
    Ok(written)
}
