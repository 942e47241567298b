//! Pure progress-transition logic.
//!
//! Flow:
//! 1) A handler loads (or lazily creates) the current record.
//! 2) `plan_status` / `plan_open` / `plan_save` decide the next status and
//!    whether points are due.
//! 3) The store applies the plan with a guarded single-row update, which is
//!    the only serialization point for concurrent requests on one record.
//!
//! No I/O happens here, so every rule is unit-testable in isolation.

use chrono::NaiveDate;

use crate::domain::ProgressStatus;

/// Requested target for an explicit status update. Anything the client sends
/// outside these two values is rejected as invalid input before it gets here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusIntent {
  InProgress,
  Completed,
}

impl StatusIntent {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "in_progress" => Some(StatusIntent::InProgress),
      "completed" => Some(StatusIntent::Completed),
      _ => None,
    }
  }
}

/// Outcome of planning a status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusPlan {
  pub next: ProgressStatus,
  /// False when the request is an idempotent no-op.
  pub changed: bool,
  /// True when this transition earns the challenge's points. Set at most
  /// once per record; re-completion never awards again.
  pub award: bool,
  pub note: &'static str,
}

/// Decide the legal next status for an explicit status request.
///
/// `Completed` is terminal: requests against a completed record are no-ops,
/// including re-completion (the guard, not locking, is what prevents a
/// double award under concurrency).
pub fn plan_status(current: ProgressStatus, target: StatusIntent) -> StatusPlan {
  use ProgressStatus::*;
  match (current, target) {
    (Completed, StatusIntent::Completed) => StatusPlan {
      next: Completed,
      changed: false,
      award: false,
      note: "Challenge already completed.",
    },
    (Completed, StatusIntent::InProgress) => StatusPlan {
      next: Completed,
      changed: false,
      award: false,
      note: "Challenge already completed; status not reverted.",
    },
    (_, StatusIntent::Completed) => StatusPlan {
      next: Completed,
      changed: true,
      award: true,
      note: "Challenge completed.",
    },
    (InProgress, StatusIntent::InProgress) => StatusPlan {
      next: InProgress,
      changed: false,
      award: false,
      note: "Challenge already in progress.",
    },
    (_, StatusIntent::InProgress) => StatusPlan {
      next: InProgress,
      changed: true,
      award: false,
      note: "Challenge marked in progress.",
    },
  }
}

/// Opening a challenge in editable mode means active work began.
pub fn plan_open(current: ProgressStatus) -> ProgressStatus {
  match current {
    ProgressStatus::Attempted | ProgressStatus::Unsolved => ProgressStatus::InProgress,
    other => other,
  }
}

/// A successful snapshot save implies active work began; it never downgrades
/// a record that is already in progress or completed.
pub fn plan_save(current: ProgressStatus) -> ProgressStatus {
  match current {
    ProgressStatus::Attempted => ProgressStatus::InProgress,
    other => other,
  }
}

/// Length of the consecutive-day completion run ending today or yesterday.
///
/// `dates` may contain duplicates and arrive in any order. A run that ended
/// before yesterday counts as zero: the streak is broken.
pub fn streak_days(dates: &[NaiveDate], today: NaiveDate) -> u32 {
  let mut uniq: Vec<NaiveDate> = dates.to_vec();
  uniq.sort_unstable();
  uniq.dedup();

  let mut expected = today;
  if !uniq.contains(&today) {
    expected = match today.pred_opt() {
      Some(p) => p,
      None => return 0,
    };
  }

  let mut run = 0u32;
  for d in uniq.iter().rev() {
    if *d > expected {
      continue;
    }
    if *d == expected {
      run += 1;
      expected = match expected.pred_opt() {
        Some(p) => p,
        None => break,
      };
    } else {
      break;
    }
  }
  run
}
