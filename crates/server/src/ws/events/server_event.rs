use serde::Serialize;

use crate::models::MessageView;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage {
        message: MessageView,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    MessageEdited {
        message: MessageView,
    },
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "deletedBy")]
        deleted_by: String,
    },
    MessagesRead {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    UserTyping {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "userName")]
        user_name: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    UserStoppedTyping {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    UserStatusChanged {
        #[serde(rename = "userId")]
        user_id: String,
        status: String,
        #[serde(rename = "lastSeen")]
        last_seen: String,
    },
    Notification {
        kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", rename = "chatId")]
        chat_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", rename = "fileId")]
        file_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", rename = "fileName")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", rename = "creatorName")]
        creator_name: Option<String>,
    },
    Error {
        message: String,
    },
}
