use serde::{Deserialize, Serialize};

/// Authenticated caller, resolved from the session token by the extractor.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub vitrocad_id: String,
    pub name: String,
    pub is_admin: bool,
    pub vitrocad_token: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub vitrocad_id: String,
    pub name: String,
    pub email: String,
    pub login: String,
    pub avatar: String,
    pub status: String,
    pub last_seen: String,
    pub notifications: bool,
    pub sound_enabled: bool,
    pub theme: String,
    #[serde(skip)]
    pub group_list: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Sender/member profile embedded in populated payloads.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub status: String,
}

/// Row shape for user-search results.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub vitrocad_id: String,
    pub name: String,
    pub email: String,
    pub login: String,
    pub avatar: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub notifications: bool,
    pub sound_enabled: bool,
    pub theme: String,
}

/// The shape returned by /login and /me: settings nested, groups parsed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub vitrocad_id: String,
    pub name: String,
    pub email: String,
    pub login: String,
    pub avatar: String,
    pub status: String,
    pub last_seen: String,
    pub is_admin: bool,
    pub settings: UserSettings,
    pub group_list: Vec<String>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        let group_list = serde_json::from_str(&user.group_list).unwrap_or_default();
        UserProfile {
            id: user.id,
            vitrocad_id: user.vitrocad_id,
            name: user.name,
            email: user.email,
            login: user.login,
            avatar: user.avatar,
            status: user.status,
            last_seen: user.last_seen,
            is_admin: user.is_admin,
            settings: UserSettings {
                notifications: user.notifications,
                sound_enabled: user.sound_enabled,
                theme: user.theme,
            },
            group_list,
            created_at: user.created_at,
        }
    }
}

/// Persist a presence change. `last_seen` only advances when the user goes
/// offline, so it reads as "last time they were here".
pub async fn set_user_status(
    db: &sqlx::SqlitePool,
    user_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    if status == "offline" {
        sqlx::query("UPDATE users SET status = ?, last_seen = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(&now)
            .bind(user_id)
            .execute(db)
            .await?;
    } else {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(user_id)
            .execute(db)
            .await?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub notifications: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub vitrocad_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUserRequest {
    pub vitrocad_user_id: String,
}
