use serde::{Deserialize, Serialize};

use super::{MessageView, PublicUser};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
    pub creator_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub is_private: bool,
    pub allow_file_sharing: bool,
    pub max_members: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Membership row joined with the member's profile.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<String>,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub status: String,
}

/// Fully populated chat as returned by list/get endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: Chat,
    pub creator: PublicUser,
    pub members: Vec<ChatMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileChatRequest {
    pub file_id: String,
    pub file_name: String,
    pub list_id: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchUsersQuery {
    pub query: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MonitorControlRequest {
    pub action: String,
    pub interval: Option<u64>,
}

// ── Store helpers shared by the WS handler, REST routes, and the reconciler ──

pub async fn member_role(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT role FROM chat_members WHERE chat_id = ? AND user_id = ?",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn is_member(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    Ok(member_role(db, chat_id, user_id).await?.is_some())
}

/// Messages in the chat not authored by the user and not yet receipted.
pub async fn unread_count(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM messages m
           WHERE m.chat_id = ? AND m.sender_id != ? AND m.deleted = 0
             AND NOT EXISTS (
                 SELECT 1 FROM message_reads r
                 WHERE r.message_id = m.id AND r.user_id = ?
             )"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_one(db)
    .await
}

/// Receipt every unread foreign message and advance the member's read
/// pointer. INSERT OR IGNORE keeps repeated calls a no-op.
pub async fn mark_chat_read(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
           SELECT id, ?, ? FROM messages
           WHERE chat_id = ? AND sender_id != ? AND deleted = 0"#,
    )
    .bind(user_id)
    .bind(&now)
    .bind(chat_id)
    .bind(user_id)
    .execute(db)
    .await?;

    sqlx::query(
        r#"UPDATE chat_members
           SET last_read_message_id = (
               SELECT id FROM messages
               WHERE chat_id = ? AND deleted = 0
               ORDER BY created_at DESC, id DESC LIMIT 1
           )
           WHERE chat_id = ? AND user_id = ?"#,
    )
    .bind(chat_id)
    .bind(chat_id)
    .bind(user_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

/// Point the chat at its newest message and bump `updated_at`.
pub async fn touch_last_message(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    message_id: &str,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("UPDATE chats SET last_message_id = ?, updated_at = ? WHERE id = ?")
        .bind(message_id)
        .bind(&now)
        .bind(chat_id)
        .execute(db)
        .await?;
    Ok(())
}
