use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::AuthUser;
use crate::AppState;

/// Resolve a session token to its user. Returns None for unknown or expired
/// tokens.
pub async fn lookup_session(db: &sqlx::SqlitePool, token: &str) -> Option<AuthUser> {
    let row = sqlx::query_as::<_, (String, String, String, bool, String, String)>(
        r#"SELECT u.id, u.vitrocad_id, u.name, u.is_admin, s.vitrocad_token, s.expires_at
           FROM sessions s
           JOIN users u ON u.id = s.user_id
           WHERE s.token = ?"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await
    .ok()??;

    let (id, vitrocad_id, name, is_admin, vitrocad_token, expires_at) = row;

    let now = chrono::Utc::now().to_rfc3339();
    if expires_at < now {
        return None;
    }

    Some(AuthUser {
        id,
        vitrocad_id,
        name,
        is_admin,
        vitrocad_token,
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(ApiError::Unauthenticated.into_response()),
        };

        lookup_session(&state.db, token)
            .await
            .ok_or_else(|| ApiError::Unauthenticated.into_response())
    }
}
