//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Challenge, Difficulty, ProgressRecord, ProgressStatus};

/// DTO for challenge catalog delivery.
#[derive(Debug, Serialize)]
pub struct ChallengeOut {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub points: u32,
    pub description: String,
}

/// Convert a catalog `Challenge` (internal) to the public DTO.
pub fn to_out(c: &Challenge) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        slug: c.slug.clone(),
        title: c.title.clone(),
        category: c.category.clone(),
        difficulty: c.difficulty,
        points: c.points,
        description: c.description.clone(),
    }
}

/// Progress view consumed by the page-render collaborator: everything needed
/// to hydrate the editor and decide whether to warn about unsaved work.
#[derive(Debug, Serialize)]
pub struct ProgressOut {
    pub status: ProgressStatus,
    #[serde(rename = "lastState")]
    pub last_state: Option<serde_json::Value>,
    #[serde(rename = "lastSaveOk")]
    pub last_save_ok: bool,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
}

pub fn to_progress_out(r: &ProgressRecord) -> ProgressOut {
    ProgressOut {
        status: r.status,
        last_state: r.last_state.clone(),
        last_save_ok: r.last_saved_ok,
        started_at: Some(r.started_at),
        completed_at: r.completed_at,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct OpenIn {
    #[serde(default, rename = "readOnly")]
    pub read_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveIn {
    #[serde(rename = "lastState")]
    pub last_state: serde_json::Value,
}
#[derive(Serialize)]
pub struct SaveOut {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusIn {
    pub status: String,
}
#[derive(Serialize)]
pub struct StatusOut {
    pub ok: bool,
    pub status: ProgressStatus,
    #[serde(rename = "pointsAwarded", skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<u32>,
    pub message: String,
}

#[derive(Serialize)]
pub struct FavoriteOut {
    pub favorited: bool,
}

#[derive(Serialize)]
pub struct LeaderboardEntryOut {
    pub user: String,
    pub completed: u32,
    pub points: u64,
    #[serde(rename = "streakDays")]
    pub streak_days: u32,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
