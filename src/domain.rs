//! Domain models used by the backend: progress status/records and the
//! read-only challenge catalog entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one user's work on one challenge.
///
/// `Completed` is terminal: no request may move a record out of it.
/// `Unsolved` is reserved for a future explicit give-up action; nothing in
/// this service ever sets it, but stored rows carrying it are honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
  Attempted,
  InProgress,
  Completed,
  Unsolved,
}

impl ProgressStatus {
  /// Storage/wire form. Must stay in sync with `parse`.
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgressStatus::Attempted => "attempted",
      ProgressStatus::InProgress => "in_progress",
      ProgressStatus::Completed => "completed",
      ProgressStatus::Unsolved => "unsolved",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "attempted" => Some(ProgressStatus::Attempted),
      "in_progress" => Some(ProgressStatus::InProgress),
      "completed" => Some(ProgressStatus::Completed),
      "unsolved" => Some(ProgressStatus::Unsolved),
      _ => None,
    }
  }
}

/// Durable per-(user, challenge) progress row. Unique on that pair.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressRecord {
  pub user_id: String,
  pub challenge_id: String,
  pub status: ProgressStatus,
  /// Opaque client snapshot, stored verbatim for resume.
  pub last_state: Option<serde_json::Value>,
  /// True iff the most recent persisted snapshot matches what the client
  /// believes was saved.
  pub last_saved_ok: bool,
  pub started_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  /// Historical schema artifact; always equal to `started_at` for rows
  /// created by this service.
  pub created_at: DateTime<Utc>,
}

/// Challenge difficulty tiers mirrored from the catalog.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Easy }
}

/// Catalog entry. The catalog is a read-only collaborator: entries come from
/// the TOML bank or built-in seeds and never change after startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub slug: String,
  pub title: String,
  pub category: String,
  pub difficulty: Difficulty,
  pub points: u32,
  #[serde(default)] pub description: String,
}
