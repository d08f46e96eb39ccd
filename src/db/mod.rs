// Database access layer (SQLite via sqlx).
//
// Timestamps are stored as integer milliseconds since the Unix epoch so that
// window queries compare numerically.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Executor, FromRow, Row, Transaction};

/// Scope written on every snapshot produced by a recorded match.
pub const ALL_TIME_SCOPE: &str = "all-time";

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub player_a_id: i64,
    pub player_b_id: i64,
    pub games_a: i32,
    pub games_b: i32,
    pub played_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, player_id: i64) -> bool {
        self.player_a_id == player_id || self.player_b_id == player_id
    }

    pub fn winner_id(&self) -> i64 {
        if self.games_a > self.games_b {
            self.player_a_id
        } else {
            self.player_b_id
        }
    }

    /// `(games won, games lost)` from one participant's side.
    pub fn games_for(&self, player_id: i64) -> Option<(i32, i32)> {
        if player_id == self.player_a_id {
            Some((self.games_a, self.games_b))
        } else if player_id == self.player_b_id {
            Some((self.games_b, self.games_a))
        } else {
            None
        }
    }

    pub fn opponent_of(&self, player_id: i64) -> Option<i64> {
        if player_id == self.player_a_id {
            Some(self.player_b_id)
        } else if player_id == self.player_b_id {
            Some(self.player_a_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub id: i64,
    pub player_id: i64,
    pub strength: f64,
    pub dynamic_points: f64,
    pub at_time: DateTime<Utc>,
    /// Games won in the match that produced this snapshot.
    pub wins: i32,
    /// Games lost in the match that produced this snapshot.
    pub losses: i32,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Championship {
    pub id: i64,
    pub year: i32,
    pub month: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub player_a_id: i64,
    pub player_b_id: i64,
    pub games_a: i32,
    pub games_b: i32,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub player_id: i64,
    pub strength: f64,
    pub dynamic_points: f64,
    pub at_time: DateTime<Utc>,
    pub wins: i32,
    pub losses: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Match ledger query: optional inclusive time range, optional limit.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery {
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub limit: Option<i64>,
    pub order: SortOrder,
}

impl MatchQuery {
    /// Every match, oldest first.
    pub fn all() -> Self {
        Self {
            range: None,
            limit: None,
            order: SortOrder::Ascending,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            range: Some((start, end)),
            ..Self::all()
        }
    }

    /// The newest `limit` matches.
    pub fn recent(limit: i64) -> Self {
        Self {
            range: None,
            limit: Some(limit),
            order: SortOrder::Descending,
        }
    }
}

// ── Row decoding ──────────────────────────────────────────────────────

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp out of range: {millis}").into(),
    })
}

impl<'r> FromRow<'r, SqliteRow> for Player {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Match {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            player_a_id: row.try_get("player_a_id")?,
            player_b_id: row.try_get("player_b_id")?,
            games_a: row.try_get("games_a")?,
            games_b: row.try_get("games_b")?,
            played_at: timestamp(row, "played_at")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for RatingSnapshot {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            player_id: row.try_get("player_id")?,
            strength: row.try_get("strength")?,
            dynamic_points: row.try_get("dynamic_points")?,
            at_time: timestamp(row, "at_time")?,
            wins: row.try_get("wins")?,
            losses: row.try_get("losses")?,
            scope: row.try_get("scope")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Championship {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            year: row.try_get("year")?,
            month: row.try_get("month")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

// ── Queries shared by the pool and open transactions ─────────────────

async fn fetch_player<'e, E>(executor: E, id: i64) -> Result<Option<Player>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Player>(
        "SELECT id, name, created_at FROM players WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

async fn fetch_latest_rating<'e, E>(
    executor: E,
    player_id: i64,
) -> Result<Option<RatingSnapshot>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, RatingSnapshot>(
        "SELECT id, player_id, strength, dynamic_points, at_time, wins, losses, scope FROM ratings WHERE player_id = ? AND scope = ? ORDER BY at_time DESC, id DESC LIMIT 1",
    )
    .bind(player_id)
    .bind(ALL_TIME_SCOPE)
    .fetch_optional(executor)
    .await
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        // Every connection to `:memory:` opens its own empty database.
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            // Readers never block the writer under WAL; writers queue on the busy timeout.
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL COLLATE NOCASE UNIQUE,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_a_id INTEGER NOT NULL REFERENCES players(id),
                player_b_id INTEGER NOT NULL REFERENCES players(id),
                games_a INTEGER NOT NULL CHECK (games_a >= 0),
                games_b INTEGER NOT NULL CHECK (games_b >= 0),
                played_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                CHECK (games_a <> games_b),
                CHECK (player_a_id <> player_b_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_played_at ON matches (played_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(id),
                strength REAL NOT NULL,
                dynamic_points REAL NOT NULL DEFAULT 0,
                at_time INTEGER NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                scope TEXT NOT NULL DEFAULT 'all-time'
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ratings_player_time ON ratings (player_id, at_time)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS championships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(year, month)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Open a write transaction. Dropping it without `commit` rolls back.
    ///
    /// The write lock is taken up front, so a transaction that reads before
    /// writing waits for other writers instead of failing on lock upgrade.
    pub async fn begin(&self) -> Result<StoreTx, sqlx::Error> {
        Ok(StoreTx {
            tx: self.pool.begin_with("BEGIN IMMEDIATE").await?,
        })
    }

    // ── Players ───────────────────────────────────────────────────────

    pub async fn create_player(&self, name: &str) -> Result<Player, sqlx::Error> {
        sqlx::query_as::<_, Player>(
            "INSERT INTO players (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_player(&self, id: i64) -> Result<Option<Player>, sqlx::Error> {
        fetch_player(&self.pool, id).await
    }

    pub async fn list_players(&self) -> Result<Vec<Player>, sqlx::Error> {
        sqlx::query_as::<_, Player>(
            "SELECT id, name, created_at FROM players ORDER BY name COLLATE NOCASE, id",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Players with at least one match on record, at any time.
    pub async fn players_with_matches(&self) -> Result<Vec<Player>, sqlx::Error> {
        sqlx::query_as::<_, Player>(
            "SELECT id, name, created_at FROM players p WHERE EXISTS (
                    SELECT 1 FROM matches m WHERE m.player_a_id = p.id OR m.player_b_id = p.id
                ) ORDER BY p.id",
        )
        .fetch_all(&self.pool)
        .await
    }

    // ── Match ledger ──────────────────────────────────────────────────

    pub async fn list_matches(&self, query: MatchQuery) -> Result<Vec<Match>, sqlx::Error> {
        let (start, end) = query
            .range
            .map(|(start, end)| (start.timestamp_millis(), end.timestamp_millis()))
            .unwrap_or((i64::MIN, i64::MAX));
        let sql = match query.order {
            SortOrder::Ascending => "SELECT id, player_a_id, player_b_id, games_a, games_b, played_at, created_at FROM matches WHERE played_at >= ? AND played_at <= ? ORDER BY played_at ASC, id ASC LIMIT ?",
            SortOrder::Descending => "SELECT id, player_a_id, player_b_id, games_a, games_b, played_at, created_at FROM matches WHERE played_at >= ? AND played_at <= ? ORDER BY played_at DESC, id DESC LIMIT ?",
        };
        // SQLite treats a negative LIMIT as unbounded.
        let limit = query.limit.unwrap_or(-1);

        sqlx::query_as::<_, Match>(sql)
            .bind(start)
            .bind(end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    /// A player's matches, newest first.
    pub async fn matches_for_player(
        &self,
        player_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Match>, sqlx::Error> {
        sqlx::query_as::<_, Match>(
            "SELECT id, player_a_id, player_b_id, games_a, games_b, played_at, created_at FROM matches WHERE player_a_id = ? OR player_b_id = ? ORDER BY played_at DESC, id DESC LIMIT ?",
        )
        .bind(player_id)
        .bind(player_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
    }

    // ── Rating history ────────────────────────────────────────────────

    pub async fn latest_rating(&self, player_id: i64) -> Result<Option<RatingSnapshot>, sqlx::Error> {
        fetch_latest_rating(&self.pool, player_id).await
    }

    /// The current snapshot of every rated player.
    pub async fn latest_ratings(&self) -> Result<Vec<RatingSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, RatingSnapshot>(
            "SELECT id, player_id, strength, dynamic_points, at_time, wins, losses, scope FROM ratings r WHERE r.scope = ? AND r.id = (
                    SELECT r2.id FROM ratings r2
                    WHERE r2.player_id = r.player_id AND r2.scope = ?
                    ORDER BY r2.at_time DESC, r2.id DESC LIMIT 1
                ) ORDER BY r.player_id",
        )
        .bind(ALL_TIME_SCOPE)
        .bind(ALL_TIME_SCOPE)
        .fetch_all(&self.pool)
        .await
    }

    /// Every snapshot of one player, oldest first.
    pub async fn rating_history(&self, player_id: i64) -> Result<Vec<RatingSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, RatingSnapshot>(
            "SELECT id, player_id, strength, dynamic_points, at_time, wins, losses, scope FROM ratings WHERE player_id = ? AND scope = ? ORDER BY at_time, id",
        )
        .bind(player_id)
        .bind(ALL_TIME_SCOPE)
        .fetch_all(&self.pool)
        .await
    }

    // ── Championships ─────────────────────────────────────────────────

    /// Months with at least one match, newest first.
    pub async fn list_championships(&self) -> Result<Vec<Championship>, sqlx::Error> {
        sqlx::query_as::<_, Championship>(
            "SELECT id, year, month, created_at FROM championships ORDER BY year DESC, month DESC",
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// An open write transaction over the ledger, history and championship log.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn get_player(&mut self, id: i64) -> Result<Option<Player>, sqlx::Error> {
        fetch_player(&mut *self.tx, id).await
    }

    pub async fn latest_rating(
        &mut self,
        player_id: i64,
    ) -> Result<Option<RatingSnapshot>, sqlx::Error> {
        fetch_latest_rating(&mut *self.tx, player_id).await
    }

    pub async fn insert_match(&mut self, m: &NewMatch) -> Result<Match, sqlx::Error> {
        sqlx::query_as::<_, Match>(
            "INSERT INTO matches (player_a_id, player_b_id, games_a, games_b, played_at, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id, player_a_id, player_b_id, games_a, games_b, played_at, created_at",
        )
        .bind(m.player_a_id)
        .bind(m.player_b_id)
        .bind(m.games_a)
        .bind(m.games_b)
        .bind(m.played_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&mut *self.tx)
        .await
    }

    pub async fn insert_ratings(&mut self, ratings: &[NewRating]) -> Result<(), sqlx::Error> {
        for r in ratings {
            sqlx::query(
                "INSERT INTO ratings (player_id, strength, dynamic_points, at_time, wins, losses, scope) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.player_id)
            .bind(r.strength)
            .bind(r.dynamic_points)
            .bind(r.at_time.timestamp_millis())
            .bind(r.wins)
            .bind(r.losses)
            .bind(ALL_TIME_SCOPE)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    /// Insert the marker for a month unless it exists. Returns true if created.
    pub async fn ensure_championship(&mut self, year: i32, month: u32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO championships (year, month, created_at) VALUES (?, ?, ?) ON CONFLICT(year, month) DO NOTHING",
        )
        .bind(year)
        .bind(month)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
