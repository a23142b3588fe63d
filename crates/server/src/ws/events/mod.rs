mod server_event;

pub use server_event::ServerEvent;

use serde::Deserialize;

// ── Client → Server Events ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChats,
    JoinChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    LeaveChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    SendMessage {
        #[serde(rename = "chatId")]
        chat_id: String,
        content: String,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default, rename = "replyTo")]
        reply_to: Option<String>,
    },
    EditMessage {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "newContent")]
        new_content: String,
    },
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TypingStart {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    TypingStop {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    UpdateStatus {
        status: String,
    },
    Ping,
}
