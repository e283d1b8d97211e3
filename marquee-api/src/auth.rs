use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::auth::{issue_token, HolderClaims, ROLE_GUEST};
use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    holder: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/guest", post(login_guest))
}

async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let lifetime = i64::try_from(state.auth.expiration)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| AppError::InternalServerError("Token lifetime out of range".to_string()))?;
    let claims = HolderClaims {
        sub: format!("guest-{}", Uuid::new_v4()),
        role: ROLE_GUEST.to_owned(),
        exp: (Utc::now() + lifetime).timestamp() as usize,
    };

    let token = issue_token(&state.auth, &claims)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::debug!("Issued guest identity {}", claims.sub);
    Ok(Json(AuthResponse {
        token,
        holder: claims.sub,
    }))
}
