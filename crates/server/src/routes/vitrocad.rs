use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{AuthUser, MonitorControlRequest, SearchUsersQuery, SyncUserRequest, UserSummary};
use crate::monitor::FileUploadEvent;
use crate::AppState;

fn provider_token(user: &AuthUser) -> Result<&str, ApiError> {
    if user.vitrocad_token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(&user.vitrocad_token)
}

/// GET /api/vitrocad/users/{listId} — fetch the provider's user list and
/// sync unseen principals into the local store.
pub async fn get_users_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(list_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = provider_token(&user)?;

    let items = state.vitrocad.get_list(&list_id, token).await?;

    let mut synced = Vec::new();
    for item in items {
        if item.field("name").is_none() {
            continue;
        }
        let local = state
            .monitor
            .find_or_create_user(&item.id, Some(token))
            .await?;
        synced.push(UserSummary {
            id: local.id,
            vitrocad_id: local.vitrocad_id,
            name: local.name,
            email: local.email,
            login: local.login,
            avatar: local.avatar,
            status: local.status,
        });
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "users": synced,
    })))
}

/// GET /api/vitrocad/file/{fileId}
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = provider_token(&user)?;

    let file = state.vitrocad.get_item(&file_id, token).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "file": file,
    })))
}

/// GET /api/vitrocad/file/{fileId}/permissions
pub async fn get_file_permissions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let token = provider_token(&user)?;

    let permissions = state.vitrocad.get_item_permissions(&file_id, token).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "permissions": permissions,
    })))
}

/// POST /api/vitrocad/webhook/file-uploaded
///
/// Push producer for the reconciler. Unauthenticated by design: VitroCAD
/// calls this directly.
pub async fn webhook_file_uploaded(
    State(state): State<Arc<AppState>>,
    Json(event): Json<FileUploadEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.monitor.handle_file_upload(&event).await?;

    let message = match outcome.action {
        crate::monitor::UploadAction::Created => "Chat created successfully",
        crate::monitor::UploadAction::Updated => "Chat updated successfully",
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "chatId": outcome.chat_id,
        "action": outcome.action,
        "message": message,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkUploadRequest {
    #[serde(default)]
    pub files: Vec<FileUploadEvent>,
}

/// POST /api/vitrocad/webhook/bulk-file-uploaded
pub async fn webhook_bulk_file_uploaded(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkUploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.files.is_empty() {
        return Err(ApiError::Validation("File list is required".into()));
    }

    let results = state.monitor.handle_bulk_file_upload(&body.files).await;

    let successful = results.iter().filter(|r| r.success).count();
    let failed = results.len() - successful;

    Ok(Json(serde_json::json!({
        "success": true,
        "results": results,
        "processed": results.len(),
        "successful": successful,
        "failed": failed,
    })))
}

/// GET /api/vitrocad/monitoring/stats
pub async fn monitoring_stats(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.monitor.stats().await;

    Ok(Json(serde_json::json!({
        "success": true,
        "stats": stats,
    })))
}

/// POST /api/vitrocad/monitoring/control — admin-only start/stop.
pub async fn monitoring_control(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<MonitorControlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.is_admin {
        return Err(ApiError::Forbidden("Insufficient permissions".into()));
    }

    match body.action.as_str() {
        "start" => {
            let interval = body
                .interval
                .unwrap_or(nexus_shared::constants::DEFAULT_MONITOR_INTERVAL_MS);
            state.monitor.clone().start(interval).await;
            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Monitoring started",
            })))
        }
        "stop" => {
            state.monitor.stop().await;
            Ok(Json(serde_json::json!({
                "success": true,
                "message": "Monitoring stopped",
            })))
        }
        _ => Err(ApiError::Validation("Unknown action".into())),
    }
}

/// GET /api/vitrocad/search-users — local directory search.
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<SearchUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.query.unwrap_or_default();
    nexus_shared::validation::validate_search_query(&q).map_err(ApiError::Validation)?;

    let limit = query
        .limit
        .unwrap_or(nexus_shared::constants::USER_SEARCH_LIMIT)
        .clamp(1, 50);
    let pattern = format!("%{}%", q.trim());

    let users = sqlx::query_as::<_, UserSummary>(
        r#"SELECT id, vitrocad_id, name, email, login, avatar, status
           FROM users
           WHERE is_active = 1
             AND (name LIKE ? OR email LIKE ? OR login LIKE ?)
           ORDER BY name
           LIMIT ?"#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "users": users,
    })))
}

/// POST /api/vitrocad/sync-user — refresh one local profile from the
/// provider, creating it if unseen.
pub async fn sync_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<SyncUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = provider_token(&user)?;

    if body.vitrocad_user_id.trim().is_empty() {
        return Err(ApiError::Validation("VitroCAD user id is required".into()));
    }

    let item = state.vitrocad.get_item(&body.vitrocad_user_id, token).await?;

    let local = state
        .monitor
        .find_or_create_user(&body.vitrocad_user_id, Some(token))
        .await?;

    // Refresh mutable profile fields from the provider item
    let name = item.field("name").unwrap_or(&local.name).to_string();
    let email = item.field("email").unwrap_or(&local.email).to_string();
    let login = item.field("login").unwrap_or(&local.login).to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query("UPDATE users SET name = ?, email = ?, login = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(&login)
        .bind(&now)
        .bind(&local.id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "user": UserSummary {
            id: local.id,
            vitrocad_id: local.vitrocad_id,
            name,
            email,
            login,
            avatar: local.avatar,
            status: local.status,
        },
    })))
}
