pub mod auth;
pub mod chats;
pub mod vitrocad;

use crate::ws;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/settings", put(auth::update_settings))
        .route("/status", put(auth::update_status))
        .route("/validate-vitrocad-token", post(auth::validate_vitrocad_token));

    let chat_routes = Router::new()
        .route("/list", get(chats::list_chats))
        .route("/create-file-chat", post(chats::create_file_chat))
        .route("/{chatId}", get(chats::get_chat))
        .route("/{chatId}/add-member", post(chats::add_member))
        .route("/{chatId}/remove-member", post(chats::remove_member))
        .route("/{chatId}/messages", get(chats::get_messages))
        .route("/{chatId}/mark-read", post(chats::mark_read));

    let vitrocad_routes = Router::new()
        .route("/users/{listId}", get(vitrocad::get_users_list))
        .route("/file/{fileId}", get(vitrocad::get_file))
        .route("/file/{fileId}/permissions", get(vitrocad::get_file_permissions))
        .route("/webhook/file-uploaded", post(vitrocad::webhook_file_uploaded))
        .route(
            "/webhook/bulk-file-uploaded",
            post(vitrocad::webhook_bulk_file_uploaded),
        )
        .route("/monitoring/stats", get(vitrocad::monitoring_stats))
        .route("/monitoring/control", post(vitrocad::monitoring_control))
        .route("/search-users", get(vitrocad::search_users))
        .route("/sync-user", post(vitrocad::sync_user));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/chat", chat_routes)
        .nest("/api/vitrocad", vitrocad_routes)
        .route("/health", get(health))
        .route("/gateway", get(ws::handler::ws_handler))
        .with_state(state)
}

/// Liveness probe for external orchestration; no auth.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
