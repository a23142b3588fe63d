use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{
    self, AuthUser, LoginRequest, UpdateSettingsRequest, UpdateStatusRequest, User, UserProfile,
    UserSettings, ValidateTokenRequest,
};
use crate::AppState;

/// POST /api/auth/login
///
/// Forwards credentials to VitroCAD, upserts the local user from the
/// returned profile, and issues a session carrying the provider token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.login.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation("Login and password are required".into()));
    }

    let auth = state.vitrocad.authenticate(&body.login, &body.password).await?;

    let user = upsert_user(&state.db, &auth.user).await?;

    models::set_user_status(&state.db, &user.id, "online").await?;

    let session_token = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let expires_at = (chrono::Utc::now()
        + chrono::Duration::days(nexus_shared::constants::SESSION_TTL_DAYS))
    .to_rfc3339();

    sqlx::query(
        r#"INSERT INTO sessions (id, user_id, token, vitrocad_token, expires_at, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&session_token)
    .bind(&auth.token)
    .bind(&expires_at)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let user = fetch_user(&state.db, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "token": session_token,
        "user": UserProfile::from(user),
        "vitrocadToken": auth.token,
        "vitrocadExpires": auth.expires,
    })))
}

/// Create-or-update keyed on the stable VitroCAD id.
async fn upsert_user(
    db: &sqlx::SqlitePool,
    profile: &crate::vitrocad::VitrocadUser,
) -> Result<User, ApiError> {
    let now = chrono::Utc::now().to_rfc3339();
    let group_list =
        serde_json::to_string(&profile.group_list).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        r#"INSERT INTO users (id, vitrocad_id, name, email, login, last_seen, group_list, is_admin, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(vitrocad_id) DO UPDATE SET
               name = excluded.name,
               email = excluded.email,
               login = excluded.login,
               group_list = excluded.group_list,
               is_admin = excluded.is_admin,
               is_active = excluded.is_active,
               updated_at = excluded.updated_at"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&profile.id)
    .bind(&profile.name)
    .bind(&profile.email)
    .bind(&profile.login)
    .bind(&now)
    .bind(&group_list)
    .bind(profile.is_admin)
    .bind(profile.is_active)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE vitrocad_id = ?")
        .bind(&profile.id)
        .fetch_one(db)
        .await?;

    Ok(user)
}

async fn fetch_user(db: &sqlx::SqlitePool, user_id: &str) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(user)
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    models::set_user_status(&state.db, &user.id, "offline").await?;

    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&state.db)
            .await?;
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Logged out",
    })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = fetch_user(&state.db, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserProfile::from(user),
    })))
}

/// PUT /api/auth/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(theme) = &body.theme {
        if theme != "light" && theme != "dark" {
            return Err(ApiError::Validation("Invalid theme".into()));
        }
    }

    let current = fetch_user(&state.db, &user.id).await?;

    let notifications = body.notifications.unwrap_or(current.notifications);
    let sound_enabled = body.sound_enabled.unwrap_or(current.sound_enabled);
    let theme = body.theme.unwrap_or(current.theme);
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "UPDATE users SET notifications = ?, sound_enabled = ?, theme = ?, updated_at = ? WHERE id = ?",
    )
    .bind(notifications)
    .bind(sound_enabled)
    .bind(&theme)
    .bind(&now)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "settings": UserSettings {
            notifications,
            sound_enabled,
            theme,
        },
    })))
}

/// PUT /api/auth/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    nexus_shared::validation::validate_status(&body.status)
        .map_err(ApiError::Validation)?;

    models::set_user_status(&state.db, &user.id, &body.status).await?;

    let user = fetch_user(&state.db, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "status": user.status,
        "lastSeen": user.last_seen,
    })))
}

/// POST /api/auth/validate-vitrocad-token
///
/// Opportunistic liveness check of a previously issued provider token.
pub async fn validate_vitrocad_token(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(body): Json<ValidateTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.vitrocad_token.is_empty() {
        return Err(ApiError::Validation("VitroCAD token is required".into()));
    }

    let valid = state
        .vitrocad
        .validate_token(&body.vitrocad_token)
        .await
        .is_ok();

    Ok(Json(serde_json::json!({
        "success": valid,
        "valid": valid,
    })))
}
