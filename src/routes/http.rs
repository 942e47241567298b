//! HTTP endpoint handlers. These are thin wrappers that forward to core
//! logic; the subsystem's structured errors are mapped to transport codes
//! here and nowhere else.

use std::sync::Arc;
use axum::{
  extract::{FromRequestParts, Path, State},
  http::{request::Parts, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::logic::{self, OpError};
use crate::protocol::*;
use crate::state::AppState;

/// Stable user identifier supplied per request by the upstream auth
/// collaborator (`x-user-id`). Requests without it are rejected; credential
/// verification is not this service's job.
pub struct UserId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserId
where
  S: Send + Sync,
{
  type Rejection = (StatusCode, Json<ErrorOut>);

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get("x-user-id")
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| UserId(s.to_string()))
      .ok_or((
        StatusCode::UNAUTHORIZED,
        Json(ErrorOut { error: "missing x-user-id header".into() }),
      ))
  }
}

fn error_response(e: OpError) -> Response {
  let code = match &e {
    OpError::UnknownChallenge(_) => StatusCode::NOT_FOUND,
    OpError::InvalidInput(_) => StatusCode::BAD_REQUEST,
    OpError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
  };
  (code, Json(ErrorOut { error: e.to_string() })).into_response()
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let out: Vec<ChallengeOut> = state.challenges().into_iter().map(to_out).collect();
  Json(out)
}

#[instrument(level = "info", skip(state), fields(%key))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Path(key): Path<String>,
) -> Response {
  match state.find_challenge(&key) {
    Some(ch) => Json(to_out(ch)).into_response(),
    None => error_response(OpError::UnknownChallenge(key)),
  }
}

#[instrument(level = "info", skip(state, body), fields(%user, %key, read_only = body.read_only))]
pub async fn http_open_challenge(
  State(state): State<Arc<AppState>>,
  UserId(user): UserId,
  Path(key): Path<String>,
  Json(body): Json<OpenIn>,
) -> Response {
  match logic::open_challenge(&state, &user, &key, body.read_only).await {
    Ok(view) => {
      info!(target: "progress", %user, %key, status = ?view.status, "HTTP challenge opened");
      Json(view).into_response()
    }
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state, body), fields(%user, %key))]
pub async fn http_save_snapshot(
  State(state): State<Arc<AppState>>,
  UserId(user): UserId,
  Path(key): Path<String>,
  Json(body): Json<SaveIn>,
) -> Response {
  match logic::save_snapshot(&state, &user, &key, body.last_state).await {
    Ok(()) => Json(SaveOut { ok: true, message: None }).into_response(),
    // Persistence failure keeps the { ok, message } shape so the client can
    // warn about unsaved work.
    Err(OpError::Store(e)) => (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(SaveOut { ok: false, message: Some(format!("save failed: {e}")) }),
    )
      .into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state, body), fields(%user, %key, target = %body.status))]
pub async fn http_update_status(
  State(state): State<Arc<AppState>>,
  UserId(user): UserId,
  Path(key): Path<String>,
  Json(body): Json<StatusIn>,
) -> Response {
  match logic::update_status(&state, &user, &key, &body.status).await {
    Ok(outcome) => {
      info!(target: "progress", %user, %key, status = ?outcome.status, points = ?outcome.points_awarded, "HTTP status updated");
      Json(StatusOut {
        ok: true,
        status: outcome.status,
        points_awarded: outcome.points_awarded,
        message: outcome.message,
      })
      .into_response()
    }
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state), fields(%user, %key))]
pub async fn http_toggle_favorite(
  State(state): State<Arc<AppState>>,
  UserId(user): UserId,
  Path(key): Path<String>,
) -> Response {
  match logic::toggle_favorite(&state, &user, &key).await {
    Ok(favorited) => Json(FavoriteOut { favorited }).into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_leaderboard(State(state): State<Arc<AppState>>) -> Response {
  match logic::leaderboard(&state).await {
    Ok(entries) => {
      let out: Vec<LeaderboardEntryOut> = entries
        .into_iter()
        .map(|e| LeaderboardEntryOut {
          user: e.user,
          completed: e.completed,
          points: e.points,
          streak_days: e.streak_days,
        })
        .collect();
      Json(out).into_response()
    }
    Err(e) => error_response(e),
  }
}
