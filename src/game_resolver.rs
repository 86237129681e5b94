//! One canonical game per real-world game, whichever source reports it first.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::model::{GameRecord, GameStatus, SourceKind};
use crate::store::{self, LinkOutcome};

/// What a source knows about a game before it has a canonical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameKey {
    pub date: NaiveDate,
    pub home_team_id: String,
    pub away_team_id: String,
}

impl GameKey {
    pub fn new(date: NaiveDate, home_team_id: &str, away_team_id: &str) -> Self {
        Self {
            date,
            home_team_id: home_team_id.to_string(),
            away_team_id: away_team_id.to_string(),
        }
    }

    fn swapped(&self) -> Self {
        Self {
            date: self.date,
            home_team_id: self.away_team_id.clone(),
            away_team_id: self.home_team_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRef<'a> {
    pub source: SourceKind,
    pub source_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub game_id: String,
    pub created: bool,
    pub link: Option<LinkOutcome>,
}

/// `YYYYMMDD-AWAY-HOME` from canonical team ids.
pub fn canonical_game_id(key: &GameKey) -> String {
    format!(
        "{}-{}-{}",
        key.date.format("%Y%m%d"),
        key.away_team_id,
        key.home_team_id
    )
}

/// Furthest progress first, then earliest creation, then smallest id.
pub fn pick_candidate(candidates: &[GameRecord]) -> Option<&GameRecord> {
    candidates.iter().min_by(|a, b| {
        b.status
            .progress_rank()
            .cmp(&a.status.progress_rank())
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.game_id.cmp(&b.game_id))
    })
}

fn candidates(conn: &Connection, key: &GameKey) -> Result<Vec<GameRecord>> {
    let from = key.date.pred_opt().unwrap_or(key.date);
    let to = key.date.succ_opt().unwrap_or(key.date);
    store::find_games(conn, from, to, &key.home_team_id, &key.away_team_id)
}

fn already_linked(conn: &Connection, source: Option<SourceRef<'_>>) -> Result<Option<String>> {
    match source {
        Some(s) => store::game_for_source(conn, s.source, s.source_id),
        None => Ok(None),
    }
}

fn link(conn: &Connection, game_id: &str, source: Option<SourceRef<'_>>) -> Result<Option<LinkOutcome>> {
    let Some(s) = source else {
        return Ok(None);
    };
    let outcome = store::link_game_source(conn, s.source, s.source_id, game_id)?;
    if let LinkOutcome::Conflict { existing_game_id } = &outcome {
        warn!(
            source = %s.source,
            source_id = s.source_id,
            game_id,
            existing_game_id = existing_game_id.as_str(),
            "source id already points at another game; left unchanged"
        );
    }
    Ok(Some(outcome))
}

fn create(conn: &Connection, key: &GameKey) -> Result<String> {
    let base = canonical_game_id(key);
    let mut game_id = base.clone();
    let mut n = 2;
    while store::get_game(conn, &game_id)?.is_some() {
        game_id = format!("{base}-{n}");
        n += 1;
    }
    store::insert_game(
        conn,
        &GameRecord {
            game_id: game_id.clone(),
            game_date: key.date,
            start_time: None,
            home_team_id: key.home_team_id.clone(),
            away_team_id: key.away_team_id.clone(),
            home_score: None,
            away_score: None,
            status: GameStatus::Scheduled,
            created_at: store::now_ts(),
        },
    )?;
    info!(game_id = game_id.as_str(), "created game record");
    Ok(game_id)
}

/// Finds or creates the canonical game for `key` and links `source` to it.
pub fn resolve(conn: &Connection, key: &GameKey, source: Option<SourceRef<'_>>) -> Result<Resolved> {
    if let Some(game_id) = already_linked(conn, source)? {
        return Ok(Resolved {
            game_id,
            created: false,
            link: Some(LinkOutcome::AlreadyLinked),
        });
    }
    let found = candidates(conn, key)?;
    let (game_id, created) = match pick_candidate(&found) {
        Some(best) => {
            if found.len() > 1 {
                debug!(
                    game_id = best.game_id.as_str(),
                    candidates = found.len(),
                    "picked among several candidate games"
                );
            }
            (best.game_id.clone(), false)
        }
        None => (create(conn, key)?, true),
    };
    let link = link(conn, &game_id, source)?;
    Ok(Resolved {
        game_id,
        created,
        link,
    })
}

/// Like [`resolve`], but accepts a record stored with home and away swapped
/// before creating a new one. Neutral-site games are listed either way round.
pub fn resolve_either_orientation(
    conn: &Connection,
    key: &GameKey,
    source: Option<SourceRef<'_>>,
) -> Result<Resolved> {
    if already_linked(conn, source)?.is_none() && candidates(conn, key)?.is_empty() {
        let swapped = key.swapped();
        let found = candidates(conn, &swapped)?;
        if let Some(best) = pick_candidate(&found) {
            debug!(game_id = best.game_id.as_str(), "matched game with sides swapped");
            let game_id = best.game_id.clone();
            let link = link(conn, &game_id, source)?;
            return Ok(Resolved {
                game_id,
                created: false,
                link,
            });
        }
    }
    resolve(conn, key, source)
}
