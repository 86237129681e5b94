//! Conflict rules for every write to a game record.
//!
//! Status moves forward along `scheduled < in_progress < final`. Postponed
//! and cancelled can only be entered from scheduled and are left only for a
//! final result that carries both scores. A non-null score never yields to a
//! null one, and a score reported under an earlier status never replaces one
//! recorded under a later status. Rejected values keep the stored value and
//! are logged, never raised.
//!
//! Player box-score lines are not merged here: `store::upsert_observation`
//! replaces the stored row with the newest one.

use tracing::warn;

use crate::model::{GameRecord, GameStatus, GameUpdate};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub record: GameRecord,
    pub changed: bool,
    pub rejections: Vec<String>,
}

/// Returns the status to store and, when the incoming one was refused, why.
pub fn merge_status(
    existing: GameStatus,
    incoming: Option<GameStatus>,
    incoming_has_scores: bool,
) -> (GameStatus, Option<String>) {
    let Some(incoming) = incoming else {
        return (existing, None);
    };
    if incoming == existing {
        return (existing, None);
    }
    if incoming.is_side_state() {
        return if existing == GameStatus::Scheduled {
            (incoming, None)
        } else {
            (
                existing,
                Some(format!("status {existing} -> {incoming} refused: only scheduled games can be {incoming}")),
            )
        };
    }
    if existing.is_side_state() {
        return if incoming == GameStatus::Final && incoming_has_scores {
            (incoming, None)
        } else {
            (
                existing,
                Some(format!("status {existing} -> {incoming} refused: needs a final result with scores")),
            )
        };
    }
    if incoming.progress_rank() > existing.progress_rank() {
        (incoming, None)
    } else {
        (
            existing,
            Some(format!("status {existing} -> {incoming} refused: backward transition")),
        )
    }
}

/// One score field. `stored_status` is the status the existing value was
/// recorded under, `incoming_status` the status of the fetch.
pub fn merge_score(
    existing: Option<i32>,
    incoming: Option<i32>,
    stored_status: GameStatus,
    incoming_status: Option<GameStatus>,
) -> (Option<i32>, Option<String>) {
    let Some(new) = incoming else {
        return (existing, None);
    };
    let Some(old) = existing else {
        return (Some(new), None);
    };
    if old == new {
        return (existing, None);
    }
    let accepted = match incoming_status {
        Some(status) => status.progress_rank() >= stored_status.progress_rank(),
        None => stored_status != GameStatus::Final,
    };
    if accepted {
        (Some(new), None)
    } else {
        let label = incoming_status.map_or("unknown", GameStatus::as_str);
        (
            existing,
            Some(format!("score {old} -> {new} refused: {label} report against {stored_status} record")),
        )
    }
}

/// Descriptive fields: a non-null value replaces, a null never erases.
pub fn merge_detail<T: Clone>(existing: &Option<T>, incoming: &Option<T>) -> Option<T> {
    incoming.clone().or_else(|| existing.clone())
}

/// Computes the record to store after applying `update` to `existing`.
pub fn merge_game(existing: &GameRecord, update: &GameUpdate) -> MergeOutcome {
    let mut rejections = Vec::new();
    let incoming_has_scores = update.home_score.is_some() && update.away_score.is_some();

    let (status, refused) = merge_status(existing.status, update.status, incoming_has_scores);
    rejections.extend(refused);

    // Leaving a side state is all or nothing: scores ride on the status change.
    let side_state_held = existing.status.is_side_state() && status == existing.status;
    let (home_score, away_score) = if side_state_held
        && (update.home_score.is_some() || update.away_score.is_some())
    {
        rejections.push(format!(
            "scores refused: game is {} and the update does not finish it",
            existing.status
        ));
        (existing.home_score, existing.away_score)
    } else {
        let (home, r1) = merge_score(existing.home_score, update.home_score, existing.status, update.status);
        let (away, r2) = merge_score(existing.away_score, update.away_score, existing.status, update.status);
        rejections.extend(r1);
        rejections.extend(r2);
        (home, away)
    };

    let record = GameRecord {
        status,
        home_score,
        away_score,
        start_time: merge_detail(&existing.start_time, &update.start_time),
        ..existing.clone()
    };
    for reason in &rejections {
        warn!(game_id = %existing.game_id, "{reason}");
    }
    MergeOutcome {
        changed: record != *existing,
        record,
        rejections,
    }
}
