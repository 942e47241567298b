//! Core operations shared by the HTTP handlers.
//!
//! This includes:
//!   - View-open bookkeeping (lazy record creation, editable-mode promotion)
//!   - Persisting and resuming editor snapshots
//!   - Explicit status updates with one-time point award
//!   - The favorite toggle
//!   - The leaderboard fold over completed records
//!
//! Errors cross this boundary as values (`OpError`); the route layer maps
//! them to transport responses. The one exception to surfacing errors is the
//! view-open path, which logs and swallows store failures so a page render
//! never hard-fails over bookkeeping.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::domain::ProgressStatus;
use crate::progress::{plan_status, streak_days, StatusIntent};
use crate::protocol::{to_progress_out, ProgressOut};
use crate::state::AppState;
use crate::store::StoreError;
use crate::util::trunc_for_log;

#[derive(Debug, Error)]
pub enum OpError {
  #[error("unknown challenge: {0}")]
  UnknownChallenge(String),

  #[error("{0}")]
  InvalidInput(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Result of an explicit status request. `points_awarded` is present for
/// completion requests (zero when the record was already completed) and
/// absent for in-progress requests, which never award.
#[derive(Clone, Debug)]
pub struct StatusOutcome {
  pub status: ProgressStatus,
  pub points_awarded: Option<u32>,
  pub message: String,
}

/// Per-user leaderboard line: completed count, point total, current streak.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
  pub user: String,
  pub completed: u32,
  pub points: u64,
  pub streak_days: u32,
}

/// View used when the store is unreachable on open: render proceeds with an
/// untouched default. Editable opens stay pessimistic about saved state.
fn fallback_view(read_only: bool) -> ProgressOut {
  ProgressOut {
    status: ProgressStatus::Attempted,
    last_state: None,
    last_save_ok: read_only,
    started_at: None,
    completed_at: None,
  }
}

/// Open a challenge page. Read-only opens lazily create the record in
/// `attempted`; editable opens additionally promote idle states to
/// `in_progress` and force `last_saved_ok = false` (the server cannot know
/// the client's editor still matches the persisted snapshot).
///
/// Unknown challenges are an error; store failures are not — the page must
/// still render, so they are logged and the last-known (or default) view is
/// returned.
#[instrument(level = "info", skip(state), fields(%user, %key, read_only))]
pub async fn open_challenge(
  state: &AppState,
  user: &str,
  key: &str,
  read_only: bool,
) -> Result<ProgressOut, OpError> {
  let ch = state
    .find_challenge(key)
    .ok_or_else(|| OpError::UnknownChallenge(key.to_string()))?;

  let attempt = if read_only {
    state.store.ensure_started(user, &ch.id).await
  } else {
    state.store.open_editable(user, &ch.id).await
  };

  match attempt {
    Ok(rec) => Ok(to_progress_out(&rec)),
    Err(e) => {
      error!(target: "progress", %user, challenge = %ch.id, error = %e, "Progress bookkeeping failed on open; rendering with prior state");
      let prior = state.store.fetch(user, &ch.id).await.ok().flatten();
      Ok(
        prior
          .map(|r| to_progress_out(&r))
          .unwrap_or_else(|| fallback_view(read_only)),
      )
    }
  }
}

/// Persist an opaque editor snapshot. Creates the record in `in_progress` if
/// absent, promotes `attempted`, and never downgrades. Store failures are
/// surfaced: the client must not believe unsaved work is safe.
#[instrument(level = "info", skip(state, snapshot), fields(%user, %key))]
pub async fn save_snapshot(
  state: &AppState,
  user: &str,
  key: &str,
  snapshot: serde_json::Value,
) -> Result<(), OpError> {
  let ch = state
    .find_challenge(key)
    .ok_or_else(|| OpError::UnknownChallenge(key.to_string()))?;

  state.store.save_snapshot(user, &ch.id, &snapshot).await?;
  debug!(target: "progress", %user, challenge = %ch.id, payload = %trunc_for_log(&snapshot.to_string(), 256), "Snapshot persisted");
  Ok(())
}

/// Apply an explicit status request. The pure plan decides legality and the
/// message; the store's guarded update decides which of two racing
/// completions actually earns the points.
#[instrument(level = "info", skip(state), fields(%user, %key, target = %target_raw))]
pub async fn update_status(
  state: &AppState,
  user: &str,
  key: &str,
  target_raw: &str,
) -> Result<StatusOutcome, OpError> {
  let ch = state
    .find_challenge(key)
    .ok_or_else(|| OpError::UnknownChallenge(key.to_string()))?;
  let intent = StatusIntent::parse(target_raw)
    .ok_or_else(|| OpError::InvalidInput(format!("unknown status value: {target_raw:?}")))?;

  // A status request may arrive before any page open; make sure the record
  // exists, then plan off its current state.
  let rec = state.store.ensure_started(user, &ch.id).await?;
  let plan = plan_status(rec.status, intent);

  if !plan.changed {
    return Ok(StatusOutcome {
      status: plan.next,
      points_awarded: matches!(intent, StatusIntent::Completed).then_some(0),
      message: plan.note.to_string(),
    });
  }

  match intent {
    StatusIntent::Completed => {
      let won = state.store.complete(user, &ch.id).await?;
      let points = if won { ch.points } else { 0 };
      if won {
        info!(target: "progress", %user, challenge = %ch.id, points, "Challenge completed; points awarded");
      }
      Ok(StatusOutcome {
        status: ProgressStatus::Completed,
        points_awarded: Some(points),
        message: if won {
          plan.note.to_string()
        } else {
          "Challenge already completed.".to_string()
        },
      })
    }
    StatusIntent::InProgress => {
      let changed = state.store.set_in_progress(user, &ch.id).await?;
      if changed {
        return Ok(StatusOutcome {
          status: ProgressStatus::InProgress,
          points_awarded: None,
          message: plan.note.to_string(),
        });
      }
      // Guard refused: the record moved under us (e.g. a racing completion).
      // Re-read and report the state that won.
      let rec = state.store.ensure_started(user, &ch.id).await?;
      let replan = plan_status(rec.status, intent);
      Ok(StatusOutcome {
        status: replan.next,
        points_awarded: None,
        message: replan.note.to_string(),
      })
    }
  }
}

/// Idempotent favorite toggle; returns the membership state after the call.
#[instrument(level = "info", skip(state), fields(%user, %key))]
pub async fn toggle_favorite(state: &AppState, user: &str, key: &str) -> Result<bool, OpError> {
  let ch = state
    .find_challenge(key)
    .ok_or_else(|| OpError::UnknownChallenge(key.to_string()))?;
  let favorited = state.store.toggle_favorite(user, &ch.id).await?;
  info!(target: "progress", %user, challenge = %ch.id, favorited, "Favorite toggled");
  Ok(favorited)
}

/// Fold completed records into per-user totals: count, catalog points, and
/// the consecutive-day streak ending today or yesterday. Completions of
/// challenges no longer in the catalog still count but carry no points.
#[instrument(level = "info", skip(state))]
pub async fn leaderboard(state: &AppState) -> Result<Vec<LeaderboardEntry>, OpError> {
  let rows = state.store.completed_rows().await?;
  let today = Utc::now().date_naive();

  let mut per_user: HashMap<String, (u32, u64, Vec<NaiveDate>)> = HashMap::new();
  for row in rows {
    let points = state
      .find_challenge(&row.challenge_id)
      .map(|c| c.points as u64)
      .unwrap_or(0);
    let entry = per_user.entry(row.user_id).or_default();
    entry.0 += 1;
    entry.1 += points;
    entry.2.push(row.completed_on);
  }

  let mut out: Vec<LeaderboardEntry> = per_user
    .into_iter()
    .map(|(user, (completed, points, dates))| LeaderboardEntry {
      user,
      completed,
      points,
      streak_days: streak_days(&dates, today),
    })
    .collect();
  out.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user.cmp(&b.user)));
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::ProgressStore;
  use serde_json::json;

  async fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("progress.db").display());
    let store = ProgressStore::connect(&url).await.expect("connect");
    (dir, AppState::with_store(store))
  }

  #[tokio::test]
  async fn full_challenge_lifecycle() {
    let (_dir, state) = test_state().await;

    // First detail-page view: record created lazily, nothing unsaved yet.
    let viewed = open_challenge(&state, "alice", "caesar-salad", true)
      .await
      .expect("view");
    assert_eq!(viewed.status, ProgressStatus::Attempted);
    assert!(viewed.last_save_ok);
    assert!(viewed.completed_at.is_none());

    // Opening the editor promotes and goes pessimistic about saved state.
    let edited = open_challenge(&state, "alice", "caesar-salad", false)
      .await
      .expect("edit");
    assert_eq!(edited.status, ProgressStatus::InProgress);
    assert!(!edited.last_save_ok);

    // A save round-trips the snapshot and clears the warning flag.
    save_snapshot(&state, "alice", "caesar-salad", json!({"cursor": 5}))
      .await
      .expect("save");
    let resumed = open_challenge(&state, "alice", "caesar-salad", true)
      .await
      .expect("resume");
    assert!(resumed.last_save_ok);
    assert_eq!(resumed.last_state, Some(json!({"cursor": 5})));

    // Completion awards the catalog points exactly once.
    let done = update_status(&state, "alice", "caesar-salad", "completed")
      .await
      .expect("complete");
    assert_eq!(done.status, ProgressStatus::Completed);
    assert_eq!(done.points_awarded, Some(100));

    let again = update_status(&state, "alice", "caesar-salad", "completed")
      .await
      .expect("re-complete");
    assert_eq!(again.status, ProgressStatus::Completed);
    assert_eq!(again.points_awarded, Some(0));
    assert!(again.message.contains("already completed"));

    // No revert out of the terminal state.
    let revert = update_status(&state, "alice", "caesar-salad", "in_progress")
      .await
      .expect("revert attempt");
    assert_eq!(revert.status, ProgressStatus::Completed);
    assert_eq!(revert.points_awarded, None);
  }

  #[tokio::test]
  async fn status_request_creates_missing_record() {
    let (_dir, state) = test_state().await;

    // No open ever happened; the status update still lands.
    let outcome = update_status(&state, "bob", "cookie-monster", "in_progress")
      .await
      .expect("status");
    assert_eq!(outcome.status, ProgressStatus::InProgress);
    assert_eq!(outcome.points_awarded, None);
  }

  #[tokio::test]
  async fn unknown_challenge_is_rejected_everywhere() {
    let (_dir, state) = test_state().await;

    assert!(matches!(
      open_challenge(&state, "alice", "no-such", true).await,
      Err(OpError::UnknownChallenge(_))
    ));
    assert!(matches!(
      save_snapshot(&state, "alice", "no-such", json!({})).await,
      Err(OpError::UnknownChallenge(_))
    ));
    assert!(matches!(
      update_status(&state, "alice", "no-such", "completed").await,
      Err(OpError::UnknownChallenge(_))
    ));
    assert!(matches!(
      toggle_favorite(&state, "alice", "no-such").await,
      Err(OpError::UnknownChallenge(_))
    ));
  }

  #[tokio::test]
  async fn bogus_status_value_is_invalid_input() {
    let (_dir, state) = test_state().await;
    let err = update_status(&state, "alice", "caesar-salad", "solved")
      .await
      .expect_err("must reject");
    assert!(matches!(err, OpError::InvalidInput(_)));
    // Rejected before any record was created.
    let rec = state.store.fetch("alice", "ch-001").await.expect("fetch");
    assert!(rec.is_none());
  }

  #[tokio::test]
  async fn favorite_toggle_round_trips() {
    let (_dir, state) = test_state().await;
    assert!(toggle_favorite(&state, "alice", "caesar-salad").await.expect("on"));
    assert!(!toggle_favorite(&state, "alice", "caesar-salad").await.expect("off"));
  }

  #[tokio::test]
  async fn leaderboard_folds_counts_points_and_streaks() {
    let (_dir, state) = test_state().await;

    for key in ["caesar-salad", "cookie-monster"] {
      update_status(&state, "alice", key, "completed").await.expect("alice");
    }
    update_status(&state, "bob", "stack-overdrive", "completed").await.expect("bob");
    // A completion whose challenge has left the catalog: counted, no points.
    state.store.ensure_started("carol", "gone-challenge").await.expect("create");
    state.store.complete("carol", "gone-challenge").await.expect("complete");

    let board = leaderboard(&state).await.expect("board");
    assert_eq!(board.len(), 3);

    assert_eq!(board[0].user, "bob");
    assert_eq!(board[0].points, 400);
    assert_eq!(board[0].completed, 1);
    assert_eq!(board[0].streak_days, 1);

    assert_eq!(board[1].user, "alice");
    assert_eq!(board[1].points, 200);
    assert_eq!(board[1].completed, 2);
    assert_eq!(board[1].streak_days, 1);

    assert_eq!(board[2].user, "carol");
    assert_eq!(board[2].points, 0);
    assert_eq!(board[2].completed, 1);
  }
}
