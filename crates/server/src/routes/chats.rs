use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{
    self, AuthUser, Chat, ChatMember, ChatView, CreateFileChatRequest, MemberRequest,
    MessageView, MessagesQuery, PublicUser, SystemAction,
};
use crate::monitor::FileUploadEvent;
use crate::ws::events::ServerEvent;
use crate::AppState;

async fn fetch_chat(db: &sqlx::SqlitePool, chat_id: &str) -> Result<Chat, ApiError> {
    sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
        .bind(chat_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("Chat"))
}

/// Populate creator, members, last message, and the caller's unread count.
async fn load_chat_view(
    db: &sqlx::SqlitePool,
    chat: Chat,
    user_id: &str,
) -> Result<ChatView, ApiError> {
    let creator = sqlx::query_as::<_, PublicUser>(
        "SELECT id, name, email, avatar, status FROM users WHERE id = ?",
    )
    .bind(&chat.creator_id)
    .fetch_one(db)
    .await?;

    let members = sqlx::query_as::<_, ChatMember>(
        r#"SELECT m.user_id, m.role, m.joined_at, m.last_read_message_id,
                  u.name, u.email, u.avatar, u.status
           FROM chat_members m JOIN users u ON u.id = m.user_id
           WHERE m.chat_id = ?
           ORDER BY m.joined_at"#,
    )
    .bind(&chat.id)
    .fetch_all(db)
    .await?;

    let last_message = match &chat.last_message_id {
        Some(id) => MessageView::load(db, id).await?,
        None => None,
    };

    let unread_count = models::unread_count(db, &chat.id, user_id).await?;

    Ok(ChatView {
        chat,
        creator,
        members,
        last_message,
        unread_count,
    })
}

/// GET /api/chat/list
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let chats = sqlx::query_as::<_, Chat>(
        r#"SELECT c.* FROM chats c
           JOIN chat_members m ON m.chat_id = c.id
           WHERE m.user_id = ? AND c.is_active = 1
           ORDER BY c.updated_at DESC"#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let mut views = Vec::with_capacity(chats.len());
    for chat in chats {
        views.push(load_chat_view(&state.db, chat, &user.id).await?);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "chats": views,
    })))
}

/// POST /api/chat/create-file-chat
///
/// Explicit user-driven counterpart of the upload webhook; same semantics,
/// so a pre-existing chat for the file just gains the caller as a member.
pub async fn create_file_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<CreateFileChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.file_id.trim().is_empty() || body.file_name.trim().is_empty() {
        return Err(ApiError::Validation("File id and file name are required".into()));
    }
    nexus_shared::validation::validate_chat_name(&body.file_name)
        .map_err(ApiError::Validation)?;

    let event = FileUploadEvent {
        file_id: body.file_id,
        file_name: body.file_name,
        uploader_id: user.vitrocad_id.clone(),
        list_id: body.list_id,
        parent_id: body.parent_id,
        vitrocad_token: Some(user.vitrocad_token.clone()).filter(|t| !t.is_empty()),
    };

    let outcome = state.monitor.handle_file_upload(&event).await?;

    let chat = fetch_chat(&state.db, &outcome.chat_id).await?;
    let view = load_chat_view(&state.db, chat, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "chat": view,
        "action": outcome.action,
    })))
}

/// GET /api/chat/{chatId}
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = fetch_chat(&state.db, &chat_id).await?;

    if !models::is_member(&state.db, &chat.id, &user.id).await? {
        return Err(ApiError::Forbidden("Access denied".into()));
    }

    let view = load_chat_view(&state.db, chat, &user.id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "chat": view,
    })))
}

/// POST /api/chat/{chatId}/add-member
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<MemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.user_id.trim().is_empty() {
        return Err(ApiError::Validation("User id is required".into()));
    }

    let chat = fetch_chat(&state.db, &chat_id).await?;

    let role = models::member_role(&state.db, &chat.id, &user.id).await?;
    if role.as_deref() != Some("admin") {
        return Err(ApiError::Forbidden("Only chat admins can add members".into()));
    }

    let new_member = sqlx::query_as::<_, PublicUser>(
        "SELECT id, name, email, avatar, status FROM users WHERE id = ?",
    )
    .bind(&body.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("User"))?;

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT OR IGNORE INTO chat_members (chat_id, user_id, role, joined_at) VALUES (?, ?, 'member', ?)",
    )
    .bind(&chat.id)
    .bind(&new_member.id)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let action = SystemAction::UserJoined {
        user_id: new_member.id.clone(),
        user_name: new_member.name.clone(),
        added_by: user.id.clone(),
    };
    let message_id =
        models::create_system_message(&state.db, &chat.id, &user.id, &action).await?;
    models::touch_last_message(&state.db, &chat.id, &message_id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Member added to chat",
    })))
}

/// POST /api/chat/{chatId}/remove-member
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<MemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = fetch_chat(&state.db, &chat_id).await?;

    // Admins may remove anyone; everyone may remove themselves
    let role = models::member_role(&state.db, &chat.id, &user.id).await?;
    if role.as_deref() != Some("admin") && user.id != body.user_id {
        return Err(ApiError::Forbidden("Insufficient permissions".into()));
    }

    sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
        .bind(&chat.id)
        .bind(&body.user_id)
        .execute(&state.db)
        .await?;

    let action = SystemAction::UserLeft {
        user_id: body.user_id.clone(),
        removed_by: user.id.clone(),
    };
    let message_id =
        models::create_system_message(&state.db, &chat.id, &user.id, &action).await?;
    models::touch_last_message(&state.db, &chat.id, &message_id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Member removed from chat",
    })))
}

/// GET /api/chat/{chatId}/messages — paged, chronological, deleted excluded.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = fetch_chat(&state.db, &chat_id).await?;

    if !models::is_member(&state.db, &chat.id, &user.id).await? {
        return Err(ApiError::Forbidden("Access denied".into()));
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(nexus_shared::constants::MESSAGE_PAGE_SIZE)
        .clamp(1, 100);
    let offset = (page - 1) * limit;

    let ids = sqlx::query_scalar::<_, String>(
        r#"SELECT id FROM messages
           WHERE chat_id = ? AND deleted = 0
           ORDER BY created_at DESC, id DESC
           LIMIT ? OFFSET ?"#,
    )
    .bind(&chat.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let has_more = ids.len() as i64 == limit;

    let mut messages = Vec::with_capacity(ids.len());
    for id in ids.iter().rev() {
        if let Some(view) = MessageView::load(&state.db, id).await? {
            messages.push(view);
        }
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "messages": messages,
        "pagination": {
            "page": page,
            "limit": limit,
            "hasMore": has_more,
        },
    })))
}

/// POST /api/chat/{chatId}/mark-read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = fetch_chat(&state.db, &chat_id).await?;

    if !models::is_member(&state.db, &chat.id, &user.id).await? {
        return Err(ApiError::Forbidden("Access denied".into()));
    }

    models::mark_chat_read(&state.db, &chat.id, &user.id).await?;

    state
        .gateway
        .broadcast_chat(
            &chat.id,
            &ServerEvent::MessagesRead {
                chat_id: chat.id.clone(),
                user_id: user.id.clone(),
            },
            None,
        )
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Messages marked as read",
    })))
}
