//! SQLite-backed progress store.
//!
//! All persistence I/O lives here; transition decisions live in `progress`.
//! Every mutation is a single guarded statement (or one small transaction),
//! so the row-level atomic update is the only serialization point for
//! concurrent requests on the same (user, challenge) pair:
//!
//! - `ensure_started` is an `INSERT OR IGNORE` upsert against the unique
//!   (user_id, challenge_id) constraint.
//! - `complete` updates `WHERE status <> 'completed'`; `rows_affected`
//!   decides which of two racing completions earns the points.
//! - `save_snapshot` is one upsert that never downgrades status.
//!
//! Timestamps are stored as RFC 3339 TEXT. Embedded migrations
//! (`sqlx::migrate!("./migrations")`) run on connect and are idempotent.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{ProgressRecord, ProgressStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failure: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One completed record, reduced to what the read-side aggregation needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedRow {
    pub user_id: String,
    pub challenge_id: String,
    pub completed_on: NaiveDate,
}

/// Durable progress + favorites storage over a shared connection pool.
#[derive(Clone)]
pub struct ProgressStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore").finish()
    }
}

impl ProgressStore {
    /// Connect (or create) the SQLite database at `database_url` and run
    /// embedded migrations. Example URL: "sqlite://academy.db"
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get-or-create the record for (user, challenge). New records start as
    /// `attempted` with `last_saved_ok = true` (nothing unsaved yet).
    /// Idempotent: a create race loses to the unique constraint and both
    /// callers read back the surviving row.
    #[instrument(skip(self), fields(%user_id, %challenge_id))]
    pub async fn ensure_started(&self, user_id: &str, challenge_id: &str) -> Result<ProgressRecord> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO challenge_progress
                (user_id, challenge_id, status, last_saved_ok, started_at, updated_at, created_at)
            VALUES (?1, ?2, 'attempted', 1, ?3, ?3, ?3)
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&*self.pool)
        .await?;

        self.fetch(user_id, challenge_id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("record vanished after upsert: {user_id}/{challenge_id}"))
        })
    }

    /// Read one record, if present.
    pub async fn fetch(&self, user_id: &str, challenge_id: &str) -> Result<Option<ProgressRecord>> {
        let row: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT user_id, challenge_id, status, last_state, last_saved_ok,
                   started_at, updated_at, completed_at, created_at
            FROM challenge_progress
            WHERE user_id = ?1 AND challenge_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    /// Editable view-open: get-or-create, promote idle states to
    /// `in_progress`, and pessimistically mark the record unsaved. One
    /// transaction; the caller decides whether a failure here may be
    /// swallowed.
    #[instrument(skip(self), fields(%user_id, %challenge_id))]
    pub async fn open_editable(&self, user_id: &str, challenge_id: &str) -> Result<ProgressRecord> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO challenge_progress
                (user_id, challenge_id, status, last_saved_ok, started_at, updated_at, created_at)
            VALUES (?1, ?2, 'attempted', 1, ?3, ?3, ?3)
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE challenge_progress SET
                status = CASE WHEN status IN ('attempted', 'unsolved')
                              THEN 'in_progress' ELSE status END,
                last_saved_ok = 0,
                updated_at = ?3
            WHERE user_id = ?1 AND challenge_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.fetch(user_id, challenge_id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("record vanished after open: {user_id}/{challenge_id}"))
        })
    }

    /// Persist an opaque snapshot. One atomic upsert: a missing record is
    /// created directly in `in_progress`; an existing one gets its snapshot
    /// overwritten, `last_saved_ok` set, and `attempted` promoted. Status is
    /// never downgraded. On error nothing is written, so `last_saved_ok`
    /// keeps its prior value.
    #[instrument(skip(self, snapshot), fields(%user_id, %challenge_id))]
    pub async fn save_snapshot(
        &self,
        user_id: &str,
        challenge_id: &str,
        snapshot: &serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO challenge_progress
                (user_id, challenge_id, status, last_state, last_saved_ok,
                 started_at, updated_at, created_at)
            VALUES (?1, ?2, 'in_progress', ?3, 1, ?4, ?4, ?4)
            ON CONFLICT (user_id, challenge_id) DO UPDATE SET
                last_state = excluded.last_state,
                last_saved_ok = 1,
                status = CASE WHEN challenge_progress.status = 'attempted'
                              THEN 'in_progress' ELSE challenge_progress.status END,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&payload)
        .bind(&now)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Promote a record to `in_progress`. Returns false when the guard left
    /// the row untouched (already in progress, or completed in the meantime).
    #[instrument(skip(self), fields(%user_id, %challenge_id))]
    pub async fn set_in_progress(&self, user_id: &str, challenge_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            r#"
            UPDATE challenge_progress SET status = 'in_progress', updated_at = ?3
            WHERE user_id = ?1 AND challenge_id = ?2
              AND status NOT IN ('in_progress', 'completed')
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&*self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Mark a record completed. Returns true only for the call that actually
    /// flipped the row; racing completions observe false and must not award
    /// points. `completed_at` is written exactly once since only this guarded
    /// statement ever touches it.
    #[instrument(skip(self), fields(%user_id, %challenge_id))]
    pub async fn complete(&self, user_id: &str, challenge_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            r#"
            UPDATE challenge_progress
            SET status = 'completed', completed_at = ?3, updated_at = ?3
            WHERE user_id = ?1 AND challenge_id = ?2 AND status <> 'completed'
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&*self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Idempotent membership toggle. Delete-first: a deleted row means the
    /// pair is now unfavorited; otherwise insert (the unique constraint
    /// absorbs create races — two concurrent toggles can never yield two
    /// rows). Returns the membership state after the call.
    #[instrument(skip(self), fields(%user_id, %challenge_id))]
    pub async fn toggle_favorite(&self, user_id: &str, challenge_id: &str) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM favorites WHERE user_id = ?1 AND challenge_id = ?2",
        )
        .bind(user_id)
        .bind(challenge_id)
        .execute(&*self.pool)
        .await?
        .rows_affected();

        if deleted > 0 {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO favorites (user_id, challenge_id, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(&*self.pool)
        .await?;
        Ok(true)
    }

    /// All completed records, reduced for the read-side fold (leaderboard,
    /// streaks). Rows whose `completed_at` fails to parse are rejected as
    /// corrupt rather than silently skewing totals.
    pub async fn completed_rows(&self) -> Result<Vec<CompletedRow>> {
        let rows: Vec<SqliteRow> = sqlx::query(
            r#"
            SELECT user_id, challenge_id, completed_at
            FROM challenge_progress
            WHERE status = 'completed'
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let completed_at: Option<String> = row.try_get("completed_at")?;
                let completed_at = completed_at.ok_or_else(|| {
                    StoreError::Corrupt("completed record without completed_at".into())
                })?;
                Ok(CompletedRow {
                    user_id: row.try_get("user_id")?,
                    challenge_id: row.try_get("challenge_id")?,
                    completed_on: parse_ts(&completed_at)?.date_naive(),
                })
            })
            .collect()
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn row_to_record(row: &SqliteRow) -> Result<ProgressRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = ProgressStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown status {status_raw:?}")))?;

    let last_state: Option<String> = row.try_get("last_state")?;
    let last_state = last_state
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    let started_at: String = row.try_get("started_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(ProgressRecord {
        user_id: row.try_get("user_id")?,
        challenge_id: row.try_get("challenge_id")?,
        status,
        last_state,
        last_saved_ok: row.try_get("last_saved_ok")?,
        started_at: parse_ts(&started_at)?,
        updated_at: parse_ts(&updated_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> (tempfile::TempDir, ProgressStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("progress.db").display());
        let store = ProgressStore::connect(&url).await.expect("connect");
        (dir, store)
    }

    #[tokio::test]
    async fn ensure_started_is_idempotent() {
        let (_dir, store) = test_store().await;

        let first = store.ensure_started("alice", "c1").await.expect("create");
        assert_eq!(first.status, ProgressStatus::Attempted);
        assert!(first.last_saved_ok);
        assert!(first.completed_at.is_none());
        assert_eq!(first.created_at, first.started_at);

        let second = store.ensure_started("alice", "c1").await.expect("reread");
        assert_eq!(second.status, ProgressStatus::Attempted);
        assert_eq!(second.started_at, first.started_at);
    }

    #[tokio::test]
    async fn editable_open_promotes_and_marks_unsaved() {
        let (_dir, store) = test_store().await;

        store.ensure_started("alice", "c1").await.expect("create");
        let opened = store.open_editable("alice", "c1").await.expect("open");
        assert_eq!(opened.status, ProgressStatus::InProgress);
        assert!(!opened.last_saved_ok);

        // Saving flips the flag back; a later open resets it again.
        store
            .save_snapshot("alice", "c1", &json!({"cursor": 5}))
            .await
            .expect("save");
        let saved = store.fetch("alice", "c1").await.expect("fetch").expect("row");
        assert!(saved.last_saved_ok);

        let reopened = store.open_editable("alice", "c1").await.expect("reopen");
        assert!(!reopened.last_saved_ok);
        assert_eq!(reopened.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn editable_open_promotes_unsolved_rows() {
        let (_dir, store) = test_store().await;

        // A reserved-state row left behind by a future feature.
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO challenge_progress
                (user_id, challenge_id, status, last_saved_ok, started_at, updated_at, created_at)
            VALUES ('bob', 'c9', 'unsolved', 1, ?1, ?1, ?1)
            "#,
        )
        .bind(&now)
        .execute(&*store.pool)
        .await
        .expect("seed row");

        let opened = store.open_editable("bob", "c9").await.expect("open");
        assert_eq!(opened.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn save_creates_record_directly_in_progress() {
        let (_dir, store) = test_store().await;

        store
            .save_snapshot("alice", "c2", &json!({"editor": "x"}))
            .await
            .expect("save");
        let rec = store.fetch("alice", "c2").await.expect("fetch").expect("row");
        assert_eq!(rec.status, ProgressStatus::InProgress);
        assert!(rec.last_saved_ok);
        assert_eq!(rec.last_state, Some(json!({"editor": "x"})));
    }

    #[tokio::test]
    async fn save_promotes_attempted_records() {
        let (_dir, store) = test_store().await;

        store.ensure_started("alice", "c10").await.expect("create");
        store
            .save_snapshot("alice", "c10", &json!({"step": 1}))
            .await
            .expect("save");
        let rec = store.fetch("alice", "c10").await.expect("fetch").expect("row");
        assert_eq!(rec.status, ProgressStatus::InProgress);
        assert!(rec.last_saved_ok);
    }

    #[tokio::test]
    async fn save_never_downgrades_completed() {
        let (_dir, store) = test_store().await;

        store.ensure_started("alice", "c3").await.expect("create");
        assert!(store.complete("alice", "c3").await.expect("complete"));

        store
            .save_snapshot("alice", "c3", &json!({"late": true}))
            .await
            .expect("save");
        let rec = store.fetch("alice", "c3").await.expect("fetch").expect("row");
        assert_eq!(rec.status, ProgressStatus::Completed);
        assert_eq!(rec.last_state, Some(json!({"late": true})));
    }

    #[tokio::test]
    async fn complete_awards_exactly_once() {
        let (_dir, store) = test_store().await;

        store.ensure_started("alice", "c4").await.expect("create");
        assert!(store.complete("alice", "c4").await.expect("first"));
        let first = store.fetch("alice", "c4").await.expect("fetch").expect("row");

        assert!(!store.complete("alice", "c4").await.expect("second"));
        let second = store.fetch("alice", "c4").await.expect("fetch").expect("row");

        assert_eq!(first.completed_at, second.completed_at, "completed_at is immutable");
        assert_eq!(second.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn racing_completions_produce_a_single_winner() {
        let (_dir, store) = test_store().await;
        store.ensure_started("alice", "c5").await.expect("create");

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.complete("alice", "c5").await }),
            tokio::spawn(async move { b.complete("alice", "c5").await }),
        );
        let won_a = ra.expect("join").expect("complete");
        let won_b = rb.expect("join").expect("complete");

        assert!(won_a ^ won_b, "exactly one completion may win");
        let rec = store.fetch("alice", "c5").await.expect("fetch").expect("row");
        assert_eq!(rec.status, ProgressStatus::Completed);
        assert!(rec.completed_at.is_some());
    }

    #[tokio::test]
    async fn favorite_toggle_is_self_inverse() {
        let (_dir, store) = test_store().await;

        assert!(store.toggle_favorite("alice", "c6").await.expect("on"));
        assert!(!store.toggle_favorite("alice", "c6").await.expect("off"));
        assert!(store.toggle_favorite("alice", "c6").await.expect("on again"));

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM favorites WHERE user_id = 'alice' AND challenge_id = 'c6'",
        )
        .fetch_one(&*store.pool)
        .await
        .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn completed_rows_cover_only_completed_records() {
        let (_dir, store) = test_store().await;

        store.ensure_started("alice", "c7").await.expect("create");
        store.ensure_started("alice", "c8").await.expect("create");
        store.complete("alice", "c7").await.expect("complete");

        let rows = store.completed_rows().await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "alice");
        assert_eq!(rows[0].challenge_id, "c7");
        assert_eq!(rows[0].completed_on, Utc::now().date_naive());
    }
}
