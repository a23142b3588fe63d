pub mod chat;
mod lifecycle;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::middleware::auth::lookup_session;
use crate::models::AuthUser;
use crate::ws::events::ClientEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

/// WebSocket upgrade handler. An absent or invalid session credential
/// rejects the handshake with 401 instead of upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    query: axum::extract::Query<std::collections::HashMap<String, String>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let auth_user = extract_session(&state, &headers, &query).await;

    match auth_user {
        Some(user) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, user))
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"error": "Not authenticated"})),
        )
            .into_response(),
    }
}

async fn extract_session(
    state: &AppState,
    headers: &axum::http::HeaderMap,
    query: &std::collections::HashMap<String, String>,
) -> Option<AuthUser> {
    let token_from_query = query.get("token").cloned();

    let token_from_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    let token = token_from_query.or(token_from_header)?;
    if token.is_empty() {
        return None;
    }

    lookup_session(&state.db, &token).await
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let client_id = state.gateway.next_client_id().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state
        .gateway
        .register(client_id, user.id.clone(), user.name.clone(), tx)
        .await;

    lifecycle::handle_connect(&state, client_id, &user).await;

    // Task to forward messages from mpsc to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Receive loop
    let state_clone = state.clone();
    let user_clone = user.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let text_str: &str = &text;
                    if let Ok(event) = serde_json::from_str::<ClientEvent>(text_str) {
                        handle_client_event(&state_clone, client_id, &user_clone, event).await;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    lifecycle::handle_disconnect(&state, client_id, &user).await;
}

async fn handle_client_event(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinChats => {
            lifecycle::handle_join_chats(state, client_id, user).await;
        }
        ClientEvent::JoinChat { chat_id } => {
            chat::handle_join_chat(state, client_id, user, &chat_id).await;
        }
        ClientEvent::LeaveChat { chat_id } => {
            state.gateway.unsubscribe_chat(client_id, &chat_id).await;
        }
        ClientEvent::SendMessage {
            chat_id,
            content,
            kind,
            reply_to,
        } => {
            chat::handle_send_message(state, client_id, user, chat_id, content, kind, reply_to)
                .await;
        }
        ClientEvent::EditMessage {
            message_id,
            new_content,
        } => {
            chat::handle_edit_message(state, client_id, user, message_id, new_content).await;
        }
        ClientEvent::DeleteMessage { message_id } => {
            chat::handle_delete_message(state, client_id, user, message_id).await;
        }
        ClientEvent::TypingStart { chat_id } => {
            chat::handle_typing(state, client_id, user, &chat_id, true).await;
        }
        ClientEvent::TypingStop { chat_id } => {
            chat::handle_typing(state, client_id, user, &chat_id, false).await;
        }
        ClientEvent::UpdateStatus { status } => {
            lifecycle::handle_update_status(state, client_id, user, &status).await;
        }
        ClientEvent::Ping => {}
    }
}
