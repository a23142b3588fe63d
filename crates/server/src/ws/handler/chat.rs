use crate::models::{self, AuthUser, MessageView};
use crate::ws::events::ServerEvent;
use crate::ws::gateway::ClientId;
use crate::AppState;

const KINDS_FROM_CLIENTS: [&str; 3] = ["text", "file", "image"];

async fn emit_error(state: &AppState, client_id: ClientId, message: &str) {
    state
        .gateway
        .send_to(
            client_id,
            &ServerEvent::Error {
                message: message.to_string(),
            },
        )
        .await;
}

/// Membership is re-checked against the store on every join; non-members get
/// an error event and are never subscribed. A successful join also marks the
/// chat read and tells the room.
pub async fn handle_join_chat(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    chat_id: &str,
) {
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM chats WHERE id = ? AND is_active = 1",
    )
    .bind(chat_id)
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    let is_member = models::is_member(&state.db, chat_id, &user.id)
        .await
        .unwrap_or(false);

    if exists == 0 || !is_member {
        emit_error(state, client_id, "Access to chat denied").await;
        return;
    }

    state.gateway.subscribe_chat(client_id, chat_id).await;

    match models::mark_chat_read(&state.db, chat_id, &user.id).await {
        Ok(_) => {
            state
                .gateway
                .broadcast_chat(
                    chat_id,
                    &ServerEvent::MessagesRead {
                        chat_id: chat_id.to_string(),
                        user_id: user.id.clone(),
                    },
                    Some(client_id),
                )
                .await;
        }
        Err(e) => tracing::error!("Failed to mark chat read: {:?}", e),
    }
}

pub async fn handle_send_message(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    chat_id: String,
    content: String,
    kind: Option<String>,
    reply_to: Option<String>,
) {
    if let Err(e) = nexus_shared::validation::validate_message_content(&content) {
        emit_error(state, client_id, &e).await;
        return;
    }

    let kind = kind.unwrap_or_else(|| "text".to_string());
    if !KINDS_FROM_CLIENTS.contains(&kind.as_str()) {
        emit_error(state, client_id, "Invalid message kind").await;
        return;
    }

    let is_member = models::is_member(&state.db, &chat_id, &user.id)
        .await
        .unwrap_or(false);
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM chats WHERE id = ? AND is_active = 1",
    )
    .bind(&chat_id)
    .fetch_one(&state.db)
    .await
    .unwrap_or(0);

    if active == 0 || !is_member {
        emit_error(state, client_id, "Access to chat denied").await;
        return;
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"INSERT INTO messages (id, chat_id, sender_id, kind, content, reply_to, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&chat_id)
    .bind(&user.id)
    .bind(&kind)
    .bind(&content)
    .bind(&reply_to)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::error!("Failed to insert message: {:?}", e);
        emit_error(state, client_id, "Failed to send message").await;
        return;
    }

    if let Err(e) = models::touch_last_message(&state.db, &chat_id, &id).await {
        tracing::error!("Failed to update chat last message: {:?}", e);
    }

    // Fan out the fully-populated message, sender's own connections included
    match MessageView::load(&state.db, &id).await {
        Ok(Some(message)) => {
            state
                .gateway
                .broadcast_chat(
                    &chat_id,
                    &ServerEvent::NewMessage {
                        message,
                        chat_id: chat_id.clone(),
                    },
                    None,
                )
                .await;
        }
        Ok(None) => {}
        Err(e) => tracing::error!("Failed to load message for fan-out: {:?}", e),
    }
}

pub async fn handle_edit_message(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: String,
    new_content: String,
) {
    if let Err(e) = nexus_shared::validation::validate_message_content(&new_content) {
        emit_error(state, client_id, &e).await;
        return;
    }

    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT sender_id, chat_id FROM messages WHERE id = ?",
    )
    .bind(&message_id)
    .fetch_optional(&state.db)
    .await
    .ok()
    .flatten();

    let (sender_id, chat_id) = match row {
        Some(r) => r,
        None => {
            emit_error(state, client_id, "Message not found").await;
            return;
        }
    };

    if sender_id != user.id {
        emit_error(state, client_id, "No permission to edit").await;
        return;
    }

    let now = chrono::Utc::now().to_rfc3339();

    // Archive the immediately-prior content, then overwrite
    let result = sqlx::query(
        r#"UPDATE messages
           SET original_content = content, content = ?, edited = 1, edited_at = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&new_content)
    .bind(&now)
    .bind(&now)
    .bind(&message_id)
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::error!("Failed to edit message: {:?}", e);
        emit_error(state, client_id, "Failed to edit message").await;
        return;
    }

    match MessageView::load(&state.db, &message_id).await {
        Ok(Some(message)) => {
            state
                .gateway
                .broadcast_chat(&chat_id, &ServerEvent::MessageEdited { message }, None)
                .await;
        }
        Ok(None) => {}
        Err(e) => tracing::error!("Failed to load edited message: {:?}", e),
    }
}

pub async fn handle_delete_message(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    message_id: String,
) {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT sender_id, chat_id FROM messages WHERE id = ?",
    )
    .bind(&message_id)
    .fetch_optional(&state.db)
    .await
    .ok()
    .flatten();

    let (sender_id, chat_id) = match row {
        Some(r) => r,
        None => {
            emit_error(state, client_id, "Message not found").await;
            return;
        }
    };

    // The sender may always delete; chat admins may delete anything
    if sender_id != user.id {
        let role = models::member_role(&state.db, &chat_id, &user.id)
            .await
            .unwrap_or(None);
        if role.as_deref() != Some("admin") {
            emit_error(state, client_id, "No permission to delete").await;
            return;
        }
    }

    let now = chrono::Utc::now().to_rfc3339();

    // Soft delete: content stays in the row, flagged
    let result = sqlx::query(
        "UPDATE messages SET deleted = 1, deleted_at = ?, deleted_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&now)
    .bind(&user.id)
    .bind(&now)
    .bind(&message_id)
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::error!("Failed to delete message: {:?}", e);
        emit_error(state, client_id, "Failed to delete message").await;
        return;
    }

    state
        .gateway
        .broadcast_chat(
            &chat_id,
            &ServerEvent::MessageDeleted {
                message_id,
                deleted_by: user.id.clone(),
            },
            None,
        )
        .await;
}

/// Unpersisted, room-scoped, excludes the originating connection. No
/// server-side expiry; receivers age the indicator out themselves.
pub async fn handle_typing(
    state: &AppState,
    client_id: ClientId,
    user: &AuthUser,
    chat_id: &str,
    active: bool,
) {
    let event = if active {
        ServerEvent::UserTyping {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            chat_id: chat_id.to_string(),
        }
    } else {
        ServerEvent::UserStoppedTyping {
            user_id: user.id.clone(),
            chat_id: chat_id.to_string(),
        }
    };

    state
        .gateway
        .broadcast_chat(chat_id, &event, Some(client_id))
        .await;
}
