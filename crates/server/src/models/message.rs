use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::PublicUser;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub kind: String,
    pub content: Option<String>,
    pub file_original_name: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_mime_type: Option<String>,
    pub system_action: Option<String>,
    pub system_data: Option<String>,
    pub reply_to: Option<String>,
    pub status: String,
    pub edited: bool,
    pub edited_at: Option<String>,
    pub original_content: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub original_name: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Structured payload of a system message. Known lifecycle actions get typed
/// variants; anything else survives as `Unknown` with its raw tag and blob.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemAction {
    ChatCreated {
        file_id: String,
        file_name: String,
        creator: String,
    },
    FileUpdated {
        file_id: String,
        file_name: String,
        updated_by: String,
    },
    UserJoined {
        user_id: String,
        user_name: String,
        added_by: String,
    },
    UserLeft {
        user_id: String,
        removed_by: String,
    },
    UserAutoAdded {
        user_id: String,
        user_name: String,
        reason: String,
    },
    Unknown {
        action: String,
        data: Value,
    },
}

impl SystemAction {
    pub fn action(&self) -> &str {
        match self {
            SystemAction::ChatCreated { .. } => "chat_created",
            SystemAction::FileUpdated { .. } => "file_updated",
            SystemAction::UserJoined { .. } => "user_joined",
            SystemAction::UserLeft { .. } => "user_left",
            SystemAction::UserAutoAdded { .. } => "user_auto_added",
            SystemAction::Unknown { action, .. } => action,
        }
    }

    pub fn data(&self) -> Value {
        match self {
            SystemAction::ChatCreated {
                file_id,
                file_name,
                creator,
            } => json!({ "fileId": file_id, "fileName": file_name, "creator": creator }),
            SystemAction::FileUpdated {
                file_id,
                file_name,
                updated_by,
            } => json!({ "fileId": file_id, "fileName": file_name, "updatedBy": updated_by }),
            SystemAction::UserJoined {
                user_id,
                user_name,
                added_by,
            } => json!({ "userId": user_id, "userName": user_name, "addedBy": added_by }),
            SystemAction::UserLeft {
                user_id,
                removed_by,
            } => json!({ "userId": user_id, "removedBy": removed_by }),
            SystemAction::UserAutoAdded {
                user_id,
                user_name,
                reason,
            } => json!({ "userId": user_id, "userName": user_name, "reason": reason }),
            SystemAction::Unknown { data, .. } => data.clone(),
        }
    }

    /// Rebuild from the `system_action`/`system_data` columns. Rows written
    /// by a newer or older build fall back to `Unknown` instead of failing.
    pub fn from_columns(action: &str, data_json: Option<&str>) -> Self {
        let data: Value = data_json
            .and_then(|d| serde_json::from_str(d).ok())
            .unwrap_or(Value::Null);

        let str_field = |key: &str| -> Option<String> {
            data.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let parsed = match action {
            "chat_created" => str_field("fileId").zip(str_field("fileName")).map(
                |(file_id, file_name)| SystemAction::ChatCreated {
                    file_id,
                    file_name,
                    creator: str_field("creator").unwrap_or_default(),
                },
            ),
            "file_updated" => str_field("fileId")
                .zip(str_field("fileName"))
                .zip(str_field("updatedBy"))
                .map(|((file_id, file_name), updated_by)| SystemAction::FileUpdated {
                    file_id,
                    file_name,
                    updated_by,
                }),
            "user_joined" => str_field("userId")
                .zip(str_field("userName"))
                .zip(str_field("addedBy"))
                .map(|((user_id, user_name), added_by)| SystemAction::UserJoined {
                    user_id,
                    user_name,
                    added_by,
                }),
            "user_left" => str_field("userId").zip(str_field("removedBy")).map(
                |(user_id, removed_by)| SystemAction::UserLeft {
                    user_id,
                    removed_by,
                },
            ),
            "user_auto_added" => str_field("userId")
                .zip(str_field("userName"))
                .zip(str_field("reason"))
                .map(|((user_id, user_name), reason)| SystemAction::UserAutoAdded {
                    user_id,
                    user_name,
                    reason,
                }),
            _ => None,
        };

        parsed.unwrap_or(SystemAction::Unknown {
            action: action.to_string(),
            data,
        })
    }
}

impl Serialize for SystemAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SystemAction", 2)?;
        s.serialize_field("action", self.action())?;
        s.serialize_field("data", &self.data())?;
        s.end()
    }
}

/// Short form of the message a reply points at.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fully populated message as broadcast to rooms and returned by REST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub sender: PublicUser,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyPreview>,
    pub status: String,
    pub read_count: i64,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub deleted: bool,
    pub created_at: String,
}

impl MessageView {
    pub fn from_parts(
        msg: Message,
        sender: PublicUser,
        reply_to: Option<ReplyPreview>,
        read_count: i64,
    ) -> Self {
        let file = msg.file_original_name.as_ref().map(|original| FileDescriptor {
            original_name: original.clone(),
            file_name: msg.file_name.clone().unwrap_or_default(),
            file_path: msg.file_path.clone(),
            file_size: msg.file_size,
            mime_type: msg.file_mime_type.clone(),
        });

        let system = msg
            .system_action
            .as_deref()
            .map(|action| SystemAction::from_columns(action, msg.system_data.as_deref()));

        // Coarse delivery status: any receipt upgrades `sent` to `read`.
        let status = if read_count > 0 {
            "read".to_string()
        } else {
            msg.status.clone()
        };

        MessageView {
            id: msg.id,
            chat_id: msg.chat_id,
            sender,
            kind: msg.kind,
            content: msg.content,
            file,
            system,
            reply_to,
            status,
            read_count,
            edited: msg.edited,
            edited_at: msg.edited_at,
            deleted: msg.deleted,
            created_at: msg.created_at,
        }
    }

    /// Resolve sender profile, reply target, and read count for one message.
    pub async fn load(
        db: &sqlx::SqlitePool,
        message_id: &str,
    ) -> Result<Option<MessageView>, sqlx::Error> {
        let msg = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(db)
            .await?;

        let msg = match msg {
            Some(m) => m,
            None => return Ok(None),
        };

        let sender = sqlx::query_as::<_, PublicUser>(
            "SELECT id, name, email, avatar, status FROM users WHERE id = ?",
        )
        .bind(&msg.sender_id)
        .fetch_one(db)
        .await?;

        let reply_to = match &msg.reply_to {
            Some(reply_id) => {
                sqlx::query_as::<_, ReplyPreview>(
                    r#"SELECT m.id, m.sender_id, u.name AS sender_name, m.kind, m.content
                       FROM messages m JOIN users u ON u.id = m.sender_id
                       WHERE m.id = ?"#,
                )
                .bind(reply_id)
                .fetch_optional(db)
                .await?
            }
            None => None,
        };

        let read_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM message_reads WHERE message_id = ?",
        )
        .bind(&msg.id)
        .fetch_one(db)
        .await?;

        Ok(Some(MessageView::from_parts(msg, sender, reply_to, read_count)))
    }
}

/// Insert a synthetic system message and return its id. The caller is
/// expected to advance the chat's last-message pointer afterwards.
pub async fn create_system_message(
    db: &sqlx::SqlitePool,
    chat_id: &str,
    sender_id: &str,
    action: &SystemAction,
) -> Result<String, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO messages (id, chat_id, sender_id, kind, system_action, system_data, created_at, updated_at)
           VALUES (?, ?, ?, 'system', ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(chat_id)
    .bind(sender_id)
    .bind(action.action())
    .bind(action.data().to_string())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(id)
}
