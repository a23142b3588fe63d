use crate::models::{self, AuthUser};
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// Mark the user online and tell everyone else. The presence broadcast is
/// deliberately global, not scoped to shared chats.
pub async fn handle_connect(state: &AppState, client_id: ClientId, user: &AuthUser) {
    tracing::info!("User connected: {} ({})", user.name, user.id);

    set_status(state, &user.id, "online").await;

    let last_seen = current_last_seen(state, &user.id).await;
    state
        .gateway
        .broadcast_all(
            &ServerEvent::UserStatusChanged {
                user_id: user.id.clone(),
                status: "online".into(),
                last_seen,
            },
            Some(client_id),
        )
        .await;
}

pub async fn handle_disconnect(state: &AppState, client_id: ClientId, user: &AuthUser) {
    tracing::info!("User disconnected: {} ({})", user.name, user.id);

    state.gateway.unregister(client_id).await;

    set_status(state, &user.id, "offline").await;

    let last_seen = current_last_seen(state, &user.id).await;
    state
        .gateway
        .broadcast_all(
            &ServerEvent::UserStatusChanged {
                user_id: user.id.clone(),
                status: "offline".into(),
                last_seen,
            },
            None,
        )
        .await;
}

/// Bulk-join the rooms of every active chat the user belongs to.
pub async fn handle_join_chats(state: &AppState, client_id: ClientId, user: &AuthUser) {
    let chat_ids = sqlx::query_scalar::<_, String>(
        r#"SELECT c.id FROM chats c
           JOIN chat_members m ON m.chat_id = c.id
           WHERE m.user_id = ? AND c.is_active = 1"#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let joined = chat_ids.len();
    for chat_id in chat_ids {
        state.gateway.subscribe_chat(client_id, &chat_id).await;
    }

    tracing::debug!("User {} joined {} chat rooms", user.name, joined);
}

pub async fn handle_update_status(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    status: &str,
) {
    if nexus_shared::validation::validate_status(status).is_err() {
        return;
    }

    set_status(state, &user.id, status).await;

    let last_seen = current_last_seen(state, &user.id).await;
    state
        .gateway
        .broadcast_all(
            &ServerEvent::UserStatusChanged {
                user_id: user.id.clone(),
                status: status.to_string(),
                last_seen,
            },
            Some(client_id),
        )
        .await;
}

pub async fn set_status(state: &AppState, user_id: &str, status: &str) {
    models::set_user_status(&state.db, user_id, status)
        .await
        .unwrap_or_else(|e| tracing::error!("Failed to persist status: {:?}", e));
}

async fn current_last_seen(state: &AppState, user_id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT last_seen FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339())
}
