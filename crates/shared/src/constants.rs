pub const APP_NAME: &str = "NexusChat";

// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_CHAT_NAME_LENGTH: usize = 255;
pub const MIN_SEARCH_QUERY_LENGTH: usize = 2;
pub const DEFAULT_MAX_CHAT_MEMBERS: i64 = 100;

pub const MESSAGE_PAGE_SIZE: i64 = 50;
pub const USER_SEARCH_LIMIT: i64 = 10;

// Sessions
pub const SESSION_TTL_DAYS: i64 = 7;

// File monitor
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 60_000;

// Presence values accepted from clients
pub const USER_STATUSES: [&str; 3] = ["online", "away", "offline"];

// Typing indicators carry no server-side timer; receivers expire them
// locally after this window.
pub const TYPING_EXPIRY_MS: u64 = 3_000;
