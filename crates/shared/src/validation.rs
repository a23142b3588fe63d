use crate::constants::*;

pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.is_empty() {
        return Err("Message content is required".into());
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_chat_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Chat name is required".into());
    }
    if trimmed.len() > MAX_CHAT_NAME_LENGTH {
        return Err(format!(
            "Chat name must be at most {} characters",
            MAX_CHAT_NAME_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_status(status: &str) -> Result<(), String> {
    if USER_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err("Invalid status".into())
    }
}

pub fn validate_search_query(query: &str) -> Result<(), String> {
    if query.trim().len() < MIN_SEARCH_QUERY_LENGTH {
        return Err(format!(
            "Query must contain at least {} characters",
            MIN_SEARCH_QUERY_LENGTH
        ));
    }
    Ok(())
}
