use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{
    GameRecord, GameStatus, PlayerGameObservation, PlayerRecord, SourceKind, TeamGameAggregate,
    TeamRecord, UnresolvedEntity,
};

const DATE_FMT: &str = "%Y-%m-%d";

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            team_id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS team_codes (
            code TEXT PRIMARY KEY,
            team_id TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS team_source_ids (
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            PRIMARY KEY (source, source_id)
        );

        CREATE TABLE IF NOT EXISTS players (
            player_id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            team_id TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id);
        CREATE TABLE IF NOT EXISTS player_source_ids (
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (source, source_id)
        );

        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            game_date TEXT NOT NULL,
            start_time TEXT NULL,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (home_team_id <> away_team_id)
        );
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
        CREATE INDEX IF NOT EXISTS idx_games_teams ON games(home_team_id, away_team_id);
        CREATE TABLE IF NOT EXISTS game_source_ids (
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            game_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (source, source_id)
        );
        CREATE INDEX IF NOT EXISTS idx_game_source_ids_game ON game_source_ids(game_id);

        CREATE TABLE IF NOT EXISTS player_game_stats (
            game_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            minutes REAL NULL,
            points INTEGER NULL,
            offensive_rebounds INTEGER NULL,
            defensive_rebounds INTEGER NULL,
            rebounds INTEGER NULL,
            assists INTEGER NULL,
            steals INTEGER NULL,
            blocks INTEGER NULL,
            turnovers INTEGER NULL,
            personal_fouls INTEGER NULL,
            field_goals_made INTEGER NULL,
            field_goals_attempted INTEGER NULL,
            three_pointers_made INTEGER NULL,
            three_pointers_attempted INTEGER NULL,
            free_throws_made INTEGER NULL,
            free_throws_attempted INTEGER NULL,
            plus_minus INTEGER NULL,
            started INTEGER NOT NULL,
            dnp_reason TEXT NULL,
            source TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game_id, player_id)
        );

        CREATE TABLE IF NOT EXISTS team_game_stats (
            game_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            is_home INTEGER NOT NULL,
            points INTEGER NOT NULL,
            field_goals_made INTEGER NOT NULL,
            field_goals_attempted INTEGER NOT NULL,
            three_pointers_made INTEGER NOT NULL,
            three_pointers_attempted INTEGER NOT NULL,
            free_throws_made INTEGER NOT NULL,
            free_throws_attempted INTEGER NOT NULL,
            offensive_rebounds INTEGER NOT NULL,
            defensive_rebounds INTEGER NOT NULL,
            rebounds INTEGER NOT NULL,
            assists INTEGER NOT NULL,
            steals INTEGER NOT NULL,
            blocks INTEGER NOT NULL,
            turnovers INTEGER NOT NULL,
            personal_fouls INTEGER NOT NULL,
            minutes REAL NOT NULL,
            possessions REAL NOT NULL,
            points_q1 INTEGER NULL,
            points_q2 INTEGER NULL,
            points_q3 INTEGER NULL,
            points_q4 INTEGER NULL,
            points_ot INTEGER NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game_id, team_id)
        );

        CREATE TABLE IF NOT EXISTS unresolved_players (
            raw_name TEXT NOT NULL,
            team_context TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            PRIMARY KEY (raw_name, team_context)
        );
        CREATE TABLE IF NOT EXISTS unresolved_sightings (
            raw_name TEXT NOT NULL,
            team_context TEXT NOT NULL,
            game_id TEXT NOT NULL,
            source TEXT NOT NULL,
            PRIMARY KEY (raw_name, team_context, game_id)
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            items_total INTEGER NOT NULL,
            succeeded INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            halted_wait_secs INTEGER NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Microsecond timestamps keep `created_at` ordering meaningful within a run.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

// ---- reference data -------------------------------------------------------

pub fn upsert_team(conn: &Connection, team: &TeamRecord, aliases: &[String]) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO teams (team_id, code, name) VALUES (?1, ?2, ?3)
        ON CONFLICT(team_id) DO UPDATE SET code = excluded.code, name = excluded.name
        "#,
        params![team.team_id, team.code.to_ascii_uppercase(), team.name],
    )
    .context("upsert team")?;
    for code in std::iter::once(&team.code).chain(aliases) {
        conn.execute(
            r#"
            INSERT INTO team_codes (code, team_id) VALUES (?1, ?2)
            ON CONFLICT(code) DO UPDATE SET team_id = excluded.team_id
            "#,
            params![code.trim().to_ascii_uppercase(), team.team_id],
        )
        .context("upsert team code")?;
    }
    Ok(())
}

pub fn load_teams(conn: &Connection) -> Result<Vec<TeamRecord>> {
    let mut stmt = conn
        .prepare("SELECT team_id, code, name FROM teams ORDER BY team_id")
        .context("prepare load teams query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TeamRecord {
                team_id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        })
        .context("query teams")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team row")?);
    }
    Ok(out)
}

pub fn load_team_codes(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT code, team_id FROM team_codes ORDER BY code")
        .context("prepare load team codes query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .context("query team codes")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team code row")?);
    }
    Ok(out)
}

/// A team's id at an upstream source, e.g. the stats API's numeric team id.
pub fn link_team_source(
    conn: &Connection,
    source: SourceKind,
    source_id: &str,
    team_id: &str,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO team_source_ids (source, source_id, team_id) VALUES (?1, ?2, ?3)
        ON CONFLICT(source, source_id) DO UPDATE SET team_id = excluded.team_id
        "#,
        params![source.as_str(), source_id.trim(), team_id],
    )
    .context("link team source id")?;
    Ok(())
}

/// `(team_id, source_id)` pairs for one source, ordered by team.
pub fn team_source_ids(conn: &Connection, source: SourceKind) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT team_id, source_id FROM team_source_ids WHERE source = ?1 ORDER BY team_id, source_id",
        )
        .context("prepare team source ids query")?;
    let rows = stmt
        .query_map(params![source.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
        .context("query team source ids")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team source id row")?);
    }
    Ok(out)
}

pub fn upsert_player(conn: &Connection, player: &PlayerRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO players (player_id, full_name, team_id) VALUES (?1, ?2, ?3)
        ON CONFLICT(player_id) DO UPDATE SET
            full_name = excluded.full_name,
            team_id = excluded.team_id
        "#,
        params![player.player_id, player.full_name, player.team_id],
    )
    .context("upsert player")?;
    Ok(())
}

/// Returns true when the player's team actually changed.
pub fn set_player_team(conn: &Connection, player_id: &str, team_id: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE players SET team_id = ?2 WHERE player_id = ?1 AND team_id IS NOT ?2",
            params![player_id, team_id],
        )
        .context("update player team")?;
    Ok(changed > 0)
}

pub fn load_players(conn: &Connection) -> Result<Vec<PlayerRecord>> {
    let mut stmt = conn
        .prepare("SELECT player_id, full_name, team_id FROM players ORDER BY player_id")
        .context("prepare load players query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerRecord {
                player_id: row.get(0)?,
                full_name: row.get(1)?,
                team_id: row.get(2)?,
            })
        })
        .context("query players")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player row")?);
    }
    Ok(out)
}

pub fn player_for_source(
    conn: &Connection,
    source: SourceKind,
    source_id: &str,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT player_id FROM player_source_ids WHERE source = ?1 AND source_id = ?2",
        params![source.as_str(), source_id],
        |row| row.get(0),
    )
    .optional()
    .context("query player source link")
}

/// Returns true when a new link was written. An existing link is never moved.
pub fn link_player_source(
    conn: &Connection,
    source: SourceKind,
    source_id: &str,
    player_id: &str,
) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            INSERT INTO player_source_ids (source, source_id, player_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(source, source_id) DO NOTHING
            "#,
            params![source.as_str(), source_id, player_id, now_ts()],
        )
        .context("link player source id")?;
    Ok(changed > 0)
}

// ---- games ----------------------------------------------------------------

const GAME_COLUMNS: &str = "game_id, game_date, start_time, home_team_id, away_team_id, \
                            home_score, away_score, status, created_at";

struct GameRow {
    game_id: String,
    game_date: String,
    start_time: Option<String>,
    home_team_id: String,
    away_team_id: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
    status: String,
    created_at: String,
}

impl GameRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            game_id: row.get(0)?,
            game_date: row.get(1)?,
            start_time: row.get(2)?,
            home_team_id: row.get(3)?,
            away_team_id: row.get(4)?,
            home_score: row.get(5)?,
            away_score: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<GameRecord> {
        let game_date = NaiveDate::parse_from_str(&self.game_date, DATE_FMT)
            .with_context(|| format!("bad game_date {} on {}", self.game_date, self.game_id))?;
        let status = GameStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("bad status {} on {}", self.status, self.game_id))?;
        Ok(GameRecord {
            game_id: self.game_id,
            game_date,
            start_time: self.start_time,
            home_team_id: self.home_team_id,
            away_team_id: self.away_team_id,
            home_score: self.home_score,
            away_score: self.away_score,
            status,
            created_at: self.created_at,
        })
    }
}

pub fn get_game(conn: &Connection, game_id: &str) -> Result<Option<GameRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {GAME_COLUMNS} FROM games WHERE game_id = ?1"),
            params![game_id],
            GameRow::read,
        )
        .optional()
        .context("query game")?;
    row.map(GameRow::into_record).transpose()
}

/// Games for one pairing with `from <= game_date <= to`.
pub fn find_games(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    home_team_id: &str,
    away_team_id: &str,
) -> Result<Vec<GameRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {GAME_COLUMNS} FROM games
             WHERE game_date BETWEEN ?1 AND ?2 AND home_team_id = ?3 AND away_team_id = ?4
             ORDER BY game_id"
        ))
        .context("prepare find games query")?;
    let rows = stmt
        .query_map(
            params![fmt_date(from), fmt_date(to), home_team_id, away_team_id],
            GameRow::read,
        )
        .context("query games")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode game row")?.into_record()?);
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct GameListing {
    pub game: GameRecord,
    pub has_box_score: bool,
}

/// Every game in an optional date range, with whether observations exist.
pub fn list_games(
    conn: &Connection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<GameListing>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {GAME_COLUMNS},
                    EXISTS (SELECT 1 FROM player_game_stats p WHERE p.game_id = games.game_id)
             FROM games
             WHERE (?1 IS NULL OR game_date >= ?1) AND (?2 IS NULL OR game_date <= ?2)
             ORDER BY game_date, game_id"
        ))
        .context("prepare list games query")?;
    let rows = stmt
        .query_map(params![from.map(fmt_date), to.map(fmt_date)], |row| {
            Ok((GameRow::read(row)?, row.get::<_, i64>(9)? != 0))
        })
        .context("query game listing")?;
    let mut out = Vec::new();
    for row in rows {
        let (game, has_box_score) = row.context("decode game listing row")?;
        out.push(GameListing {
            game: game.into_record()?,
            has_box_score,
        });
    }
    Ok(out)
}

pub fn insert_game(conn: &Connection, game: &GameRecord) -> Result<()> {
    if game.home_team_id == game.away_team_id {
        return Err(anyhow!(
            "game {} has the same team on both sides",
            game.game_id
        ));
    }
    conn.execute(
        r#"
        INSERT INTO games (
            game_id, game_date, start_time, home_team_id, away_team_id,
            home_score, away_score, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
        params![
            game.game_id,
            fmt_date(game.game_date),
            game.start_time,
            game.home_team_id,
            game.away_team_id,
            game.home_score,
            game.away_score,
            game.status.as_str(),
            game.created_at,
        ],
    )
    .context("insert game")?;
    Ok(())
}

/// Writes the mutable part of a game record. Callers compute the values
/// through `merge`; returns true when a row changed.
pub fn write_game_state(conn: &Connection, game: &GameRecord) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            UPDATE games SET
                status = ?2, home_score = ?3, away_score = ?4, start_time = ?5, updated_at = ?6
            WHERE game_id = ?1
              AND (status IS NOT ?2 OR home_score IS NOT ?3 OR away_score IS NOT ?4
                   OR start_time IS NOT ?5)
            "#,
            params![
                game.game_id,
                game.status.as_str(),
                game.home_score,
                game.away_score,
                game.start_time,
                now_ts(),
            ],
        )
        .context("update game state")?;
    Ok(changed > 0)
}

pub fn game_for_source(
    conn: &Connection,
    source: SourceKind,
    source_id: &str,
) -> Result<Option<String>> {
    conn.query_row(
        "SELECT game_id FROM game_source_ids WHERE source = ?1 AND source_id = ?2",
        params![source.as_str(), source_id],
        |row| row.get(0),
    )
    .optional()
    .context("query game source link")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
    /// The source id already points at another canonical game.
    Conflict { existing_game_id: String },
}

pub fn link_game_source(
    conn: &Connection,
    source: SourceKind,
    source_id: &str,
    game_id: &str,
) -> Result<LinkOutcome> {
    if let Some(existing) = game_for_source(conn, source, source_id)? {
        return Ok(if existing == game_id {
            LinkOutcome::AlreadyLinked
        } else {
            LinkOutcome::Conflict {
                existing_game_id: existing,
            }
        });
    }
    conn.execute(
        r#"
        INSERT INTO game_source_ids (source, source_id, game_id, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![source.as_str(), source_id, game_id, now_ts()],
    )
    .context("link game source id")?;
    Ok(LinkOutcome::Linked)
}

pub fn source_ids_for_game(conn: &Connection, game_id: &str) -> Result<Vec<(SourceKind, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT source, source_id FROM game_source_ids WHERE game_id = ?1
             ORDER BY source, source_id",
        )
        .context("prepare game source ids query")?;
    let rows = stmt
        .query_map(params![game_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .context("query game source ids")?;
    let mut out = Vec::new();
    for row in rows {
        let (source, id) = row.context("decode game source id row")?;
        if let Some(kind) = SourceKind::parse(&source) {
            out.push((kind, id));
        }
    }
    Ok(out)
}

// ---- observations and aggregates -----------------------------------------

/// Last write wins per field. Returns false when the stored row already
/// matches, so re-ingesting identical data writes nothing.
pub fn upsert_observation(conn: &Connection, obs: &PlayerGameObservation) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            INSERT INTO player_game_stats (
                game_id, player_id, team_id, minutes, points,
                offensive_rebounds, defensive_rebounds, rebounds, assists, steals,
                blocks, turnovers, personal_fouls, field_goals_made, field_goals_attempted,
                three_pointers_made, three_pointers_attempted, free_throws_made,
                free_throws_attempted, plus_minus, started, dnp_reason, source, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18,
                ?19, ?20, ?21, ?22, ?23, ?24
            )
            ON CONFLICT(game_id, player_id) DO UPDATE SET
                team_id = excluded.team_id,
                minutes = excluded.minutes,
                points = excluded.points,
                offensive_rebounds = excluded.offensive_rebounds,
                defensive_rebounds = excluded.defensive_rebounds,
                rebounds = excluded.rebounds,
                assists = excluded.assists,
                steals = excluded.steals,
                blocks = excluded.blocks,
                turnovers = excluded.turnovers,
                personal_fouls = excluded.personal_fouls,
                field_goals_made = excluded.field_goals_made,
                field_goals_attempted = excluded.field_goals_attempted,
                three_pointers_made = excluded.three_pointers_made,
                three_pointers_attempted = excluded.three_pointers_attempted,
                free_throws_made = excluded.free_throws_made,
                free_throws_attempted = excluded.free_throws_attempted,
                plus_minus = excluded.plus_minus,
                started = excluded.started,
                dnp_reason = excluded.dnp_reason,
                source = excluded.source,
                updated_at = excluded.updated_at
            WHERE team_id IS NOT excluded.team_id
               OR minutes IS NOT excluded.minutes
               OR points IS NOT excluded.points
               OR offensive_rebounds IS NOT excluded.offensive_rebounds
               OR defensive_rebounds IS NOT excluded.defensive_rebounds
               OR rebounds IS NOT excluded.rebounds
               OR assists IS NOT excluded.assists
               OR steals IS NOT excluded.steals
               OR blocks IS NOT excluded.blocks
               OR turnovers IS NOT excluded.turnovers
               OR personal_fouls IS NOT excluded.personal_fouls
               OR field_goals_made IS NOT excluded.field_goals_made
               OR field_goals_attempted IS NOT excluded.field_goals_attempted
               OR three_pointers_made IS NOT excluded.three_pointers_made
               OR three_pointers_attempted IS NOT excluded.three_pointers_attempted
               OR free_throws_made IS NOT excluded.free_throws_made
               OR free_throws_attempted IS NOT excluded.free_throws_attempted
               OR plus_minus IS NOT excluded.plus_minus
               OR started IS NOT excluded.started
               OR dnp_reason IS NOT excluded.dnp_reason
               OR source IS NOT excluded.source
            "#,
            params![
                obs.game_id,
                obs.player_id,
                obs.team_id,
                obs.minutes,
                obs.points,
                obs.offensive_rebounds,
                obs.defensive_rebounds,
                obs.rebounds,
                obs.assists,
                obs.steals,
                obs.blocks,
                obs.turnovers,
                obs.personal_fouls,
                obs.field_goals_made,
                obs.field_goals_attempted,
                obs.three_pointers_made,
                obs.three_pointers_attempted,
                obs.free_throws_made,
                obs.free_throws_attempted,
                obs.plus_minus,
                bool_to_i64(obs.started),
                obs.dnp_reason,
                obs.source,
                now_ts(),
            ],
        )
        .context("upsert player game stats")?;
    Ok(changed > 0)
}

pub fn load_observations(conn: &Connection, game_id: &str) -> Result<Vec<PlayerGameObservation>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                game_id, player_id, team_id, minutes, points,
                offensive_rebounds, defensive_rebounds, rebounds, assists, steals,
                blocks, turnovers, personal_fouls, field_goals_made, field_goals_attempted,
                three_pointers_made, three_pointers_attempted, free_throws_made,
                free_throws_attempted, plus_minus, started, dnp_reason, source
            FROM player_game_stats
            WHERE game_id = ?1
            ORDER BY team_id, player_id
            "#,
        )
        .context("prepare load observations query")?;
    let rows = stmt
        .query_map(params![game_id], |row| {
            Ok(PlayerGameObservation {
                game_id: row.get(0)?,
                player_id: row.get(1)?,
                team_id: row.get(2)?,
                minutes: row.get(3)?,
                points: row.get(4)?,
                offensive_rebounds: row.get(5)?,
                defensive_rebounds: row.get(6)?,
                rebounds: row.get(7)?,
                assists: row.get(8)?,
                steals: row.get(9)?,
                blocks: row.get(10)?,
                turnovers: row.get(11)?,
                personal_fouls: row.get(12)?,
                field_goals_made: row.get(13)?,
                field_goals_attempted: row.get(14)?,
                three_pointers_made: row.get(15)?,
                three_pointers_attempted: row.get(16)?,
                free_throws_made: row.get(17)?,
                free_throws_attempted: row.get(18)?,
                plus_minus: row.get(19)?,
                started: row.get::<_, i64>(20)? != 0,
                dnp_reason: row.get(21)?,
                source: row.get(22)?,
            })
        })
        .context("query observations")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode observation row")?);
    }
    Ok(out)
}

/// Full replace keyed by (game, team). Unchanged aggregates are not rewritten.
pub fn upsert_team_aggregate(conn: &Connection, agg: &TeamGameAggregate) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            INSERT INTO team_game_stats (
                game_id, team_id, is_home, points,
                field_goals_made, field_goals_attempted, three_pointers_made,
                three_pointers_attempted, free_throws_made, free_throws_attempted,
                offensive_rebounds, defensive_rebounds, rebounds, assists, steals,
                blocks, turnovers, personal_fouls, minutes, possessions,
                points_q1, points_q2, points_q3, points_q4, points_ot, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24, ?25, ?26
            )
            ON CONFLICT(game_id, team_id) DO UPDATE SET
                is_home = excluded.is_home,
                points = excluded.points,
                field_goals_made = excluded.field_goals_made,
                field_goals_attempted = excluded.field_goals_attempted,
                three_pointers_made = excluded.three_pointers_made,
                three_pointers_attempted = excluded.three_pointers_attempted,
                free_throws_made = excluded.free_throws_made,
                free_throws_attempted = excluded.free_throws_attempted,
                offensive_rebounds = excluded.offensive_rebounds,
                defensive_rebounds = excluded.defensive_rebounds,
                rebounds = excluded.rebounds,
                assists = excluded.assists,
                steals = excluded.steals,
                blocks = excluded.blocks,
                turnovers = excluded.turnovers,
                personal_fouls = excluded.personal_fouls,
                minutes = excluded.minutes,
                possessions = excluded.possessions,
                points_q1 = excluded.points_q1,
                points_q2 = excluded.points_q2,
                points_q3 = excluded.points_q3,
                points_q4 = excluded.points_q4,
                points_ot = excluded.points_ot,
                updated_at = excluded.updated_at
            WHERE is_home IS NOT excluded.is_home
               OR points IS NOT excluded.points
               OR field_goals_made IS NOT excluded.field_goals_made
               OR field_goals_attempted IS NOT excluded.field_goals_attempted
               OR three_pointers_made IS NOT excluded.three_pointers_made
               OR three_pointers_attempted IS NOT excluded.three_pointers_attempted
               OR free_throws_made IS NOT excluded.free_throws_made
               OR free_throws_attempted IS NOT excluded.free_throws_attempted
               OR offensive_rebounds IS NOT excluded.offensive_rebounds
               OR defensive_rebounds IS NOT excluded.defensive_rebounds
               OR rebounds IS NOT excluded.rebounds
               OR assists IS NOT excluded.assists
               OR steals IS NOT excluded.steals
               OR blocks IS NOT excluded.blocks
               OR turnovers IS NOT excluded.turnovers
               OR personal_fouls IS NOT excluded.personal_fouls
               OR minutes IS NOT excluded.minutes
               OR possessions IS NOT excluded.possessions
               OR points_q1 IS NOT excluded.points_q1
               OR points_q2 IS NOT excluded.points_q2
               OR points_q3 IS NOT excluded.points_q3
               OR points_q4 IS NOT excluded.points_q4
               OR points_ot IS NOT excluded.points_ot
            "#,
            params![
                agg.game_id,
                agg.team_id,
                bool_to_i64(agg.is_home),
                agg.points,
                agg.field_goals_made,
                agg.field_goals_attempted,
                agg.three_pointers_made,
                agg.three_pointers_attempted,
                agg.free_throws_made,
                agg.free_throws_attempted,
                agg.offensive_rebounds,
                agg.defensive_rebounds,
                agg.rebounds,
                agg.assists,
                agg.steals,
                agg.blocks,
                agg.turnovers,
                agg.personal_fouls,
                agg.minutes,
                agg.possessions,
                agg.points_q1,
                agg.points_q2,
                agg.points_q3,
                agg.points_q4,
                agg.points_ot,
                now_ts(),
            ],
        )
        .context("upsert team game stats")?;
    Ok(changed > 0)
}

pub fn load_team_aggregates(conn: &Connection, game_id: &str) -> Result<Vec<TeamGameAggregate>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                game_id, team_id, is_home, points,
                field_goals_made, field_goals_attempted, three_pointers_made,
                three_pointers_attempted, free_throws_made, free_throws_attempted,
                offensive_rebounds, defensive_rebounds, rebounds, assists, steals,
                blocks, turnovers, personal_fouls, minutes, possessions,
                points_q1, points_q2, points_q3, points_q4, points_ot
            FROM team_game_stats
            WHERE game_id = ?1
            ORDER BY is_home DESC, team_id
            "#,
        )
        .context("prepare load team aggregates query")?;
    let rows = stmt
        .query_map(params![game_id], |row| {
            Ok(TeamGameAggregate {
                game_id: row.get(0)?,
                team_id: row.get(1)?,
                is_home: row.get::<_, i64>(2)? != 0,
                points: row.get(3)?,
                field_goals_made: row.get(4)?,
                field_goals_attempted: row.get(5)?,
                three_pointers_made: row.get(6)?,
                three_pointers_attempted: row.get(7)?,
                free_throws_made: row.get(8)?,
                free_throws_attempted: row.get(9)?,
                offensive_rebounds: row.get(10)?,
                defensive_rebounds: row.get(11)?,
                rebounds: row.get(12)?,
                assists: row.get(13)?,
                steals: row.get(14)?,
                blocks: row.get(15)?,
                turnovers: row.get(16)?,
                personal_fouls: row.get(17)?,
                minutes: row.get(18)?,
                possessions: row.get(19)?,
                points_q1: row.get(20)?,
                points_q2: row.get(21)?,
                points_q3: row.get(22)?,
                points_q4: row.get(23)?,
                points_ot: row.get(24)?,
            })
        })
        .context("query team aggregates")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team aggregate row")?);
    }
    Ok(out)
}

// ---- unresolved players ---------------------------------------------------

/// Records one sighting. Returns true when this (name, team, game) was new.
pub fn record_unresolved(
    conn: &Connection,
    raw_name: &str,
    team_context: &str,
    game_id: &str,
    source: &str,
    seen_on: NaiveDate,
) -> Result<bool> {
    conn.execute(
        r#"
        INSERT INTO unresolved_players (raw_name, team_context, first_seen)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(raw_name, team_context) DO UPDATE SET first_seen = excluded.first_seen
        WHERE excluded.first_seen < first_seen
        "#,
        params![raw_name, team_context, fmt_date(seen_on)],
    )
    .context("upsert unresolved player")?;
    let changed = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO unresolved_sightings (raw_name, team_context, game_id, source)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![raw_name, team_context, game_id, source],
        )
        .context("insert unresolved sighting")?;
    Ok(changed > 0)
}

/// Names awaiting manual review, most frequently seen first.
pub fn unresolved_report(conn: &Connection) -> Result<Vec<UnresolvedEntity>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT u.raw_name, u.team_context, u.first_seen, COUNT(s.game_id)
            FROM unresolved_players u
            LEFT JOIN unresolved_sightings s
              ON s.raw_name = u.raw_name AND s.team_context = u.team_context
            GROUP BY u.raw_name, u.team_context, u.first_seen
            ORDER BY COUNT(s.game_id) DESC, u.raw_name ASC, u.team_context ASC
            "#,
        )
        .context("prepare unresolved report query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UnresolvedEntity {
                raw_name: row.get(0)?,
                team_context: row.get(1)?,
                first_seen: row.get(2)?,
                occurrences: row.get::<_, i64>(3)?.max(0) as u32,
            })
        })
        .context("query unresolved report")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode unresolved row")?);
    }
    Ok(out)
}

// ---- ingest runs ----------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows_written: usize,
    pub halted_wait_secs: Option<u64>,
    pub errors: Vec<String>,
}

pub fn start_ingest_run(conn: &Connection, kind: &str, items_total: usize) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO ingest_runs (
            kind, started_at, finished_at, items_total, succeeded, skipped, failed,
            rows_written, halted_wait_secs, errors_json
        ) VALUES (?1, ?2, NULL, ?3, 0, 0, 0, 0, NULL, '[]')
        "#,
        params![kind, now_ts(), items_total as i64],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_ingest_run(conn: &Connection, run_id: i64, totals: &RunTotals) -> Result<()> {
    let errors_json = serde_json::to_string(&totals.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        r#"
        UPDATE ingest_runs
        SET finished_at = ?1, succeeded = ?2, skipped = ?3, failed = ?4,
            rows_written = ?5, halted_wait_secs = ?6, errors_json = ?7
        WHERE run_id = ?8
        "#,
        params![
            now_ts(),
            totals.succeeded as i64,
            totals.skipped as i64,
            totals.failed as i64,
            totals.rows_written as i64,
            totals.halted_wait_secs.map(|s| s as i64),
            errors_json,
            run_id,
        ],
    )
    .context("update ingest run")?;
    Ok(())
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
