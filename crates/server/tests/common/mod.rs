#![allow(dead_code)]

pub mod ws_helpers;

use async_trait::async_trait;
use axum::Router;
use nexus_server::config::Config;
use nexus_server::monitor::FileMonitor;
use nexus_server::vitrocad::{
    VitrocadApi, VitrocadAuth, VitrocadError, VitrocadItem, VitrocadPermission, VitrocadUser,
};
use nexus_server::ws::gateway::GatewayState;
use nexus_server::{db, routes, AppState};
use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Create an in-memory SQLite pool with schema applied. A single connection
/// keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();

    db::apply_schema(&pool).await.unwrap();

    pool
}

/// Configurable in-process stand-in for the VitroCAD API.
#[derive(Default)]
pub struct StubVitrocad {
    accounts: Mutex<HashMap<String, (String, VitrocadAuth)>>,
    items: Mutex<HashMap<String, VitrocadItem>>,
    lists: Mutex<HashMap<String, Vec<VitrocadItem>>>,
    permissions: Mutex<HashMap<String, Vec<VitrocadPermission>>>,
    unavailable: AtomicBool,
}

impl StubVitrocad {
    pub fn add_account(&self, login: &str, password: &str, user: VitrocadUser) {
        let auth = VitrocadAuth {
            token: format!("vc-token-{}", login),
            expires: None,
            user,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(login.to_string(), (password.to_string(), auth));
    }

    pub fn add_user_item(&self, vitrocad_id: &str, name: &str, email: &str, login: &str) {
        let item = VitrocadItem {
            id: vitrocad_id.to_string(),
            status: 1,
            field_value_map: json!({
                "name": name,
                "email": email,
                "login": login,
            }),
        };
        self.items
            .lock()
            .unwrap()
            .insert(vitrocad_id.to_string(), item);
    }

    pub fn add_list(&self, list_id: &str, items: Vec<VitrocadItem>) {
        self.lists.lock().unwrap().insert(list_id.to_string(), items);
    }

    pub fn add_permissions(&self, file_id: &str, principal_ids: &[&str]) {
        let perms = principal_ids
            .iter()
            .map(|id| VitrocadPermission {
                principal_id: id.to_string(),
                permission_level: Some("read".into()),
            })
            .collect();
        self.permissions
            .lock()
            .unwrap()
            .insert(file_id.to_string(), perms);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<(), VitrocadError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(VitrocadError::Unavailable("stub offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VitrocadApi for StubVitrocad {
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<VitrocadAuth, VitrocadError> {
        self.check_up()?;
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(login) {
            Some((expected, auth)) if expected == password => Ok(auth.clone()),
            _ => Err(VitrocadError::InvalidCredentials),
        }
    }

    async fn get_item(
        &self,
        item_id: &str,
        _token: &str,
    ) -> Result<VitrocadItem, VitrocadError> {
        self.check_up()?;
        self.items
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .ok_or(VitrocadError::NotFound)
    }

    async fn get_list(
        &self,
        list_id: &str,
        _token: &str,
    ) -> Result<Vec<VitrocadItem>, VitrocadError> {
        self.check_up()?;
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(list_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_item_permissions(
        &self,
        item_id: &str,
        _token: &str,
    ) -> Result<Vec<VitrocadPermission>, VitrocadError> {
        self.check_up()?;
        Ok(self
            .permissions
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn validate_token(&self, token: &str) -> Result<(), VitrocadError> {
        self.check_up()?;
        if token.is_empty() {
            return Err(VitrocadError::InvalidCredentials);
        }
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        vitrocad_base_url: "http://localhost:9".into(),
        vitrocad_api_path: "/api".into(),
        vitrocad_timeout_secs: 1,
        monitor_interval_ms: 60_000,
    }
}

pub fn create_test_state(
    pool: SqlitePool,
    vitrocad: Arc<dyn VitrocadApi>,
) -> Arc<AppState> {
    let gateway = Arc::new(GatewayState::new());
    let monitor = Arc::new(FileMonitor::new(
        pool.clone(),
        gateway.clone(),
        vitrocad.clone(),
    ));

    Arc::new(AppState {
        db: pool,
        config: test_config(),
        gateway,
        vitrocad,
        monitor,
        started_at: std::time::Instant::now(),
    })
}

/// Build a test Axum app with a default (empty) VitroCAD stub.
pub fn create_test_app(pool: SqlitePool) -> Router {
    routes::build_router(create_test_state(pool, Arc::new(StubVitrocad::default())))
}

/// Build a test Axum app around a pre-configured provider stub.
pub fn create_test_app_with(pool: SqlitePool, vitrocad: Arc<dyn VitrocadApi>) -> Router {
    routes::build_router(create_test_state(pool, vitrocad))
}

/// Create a test user directly in the database. Returns (user_id, session_token).
pub async fn create_test_user(
    pool: &SqlitePool,
    vitrocad_id: &str,
    name: &str,
) -> (String, String) {
    create_user_with_admin(pool, vitrocad_id, name, false).await
}

pub async fn create_test_admin(
    pool: &SqlitePool,
    vitrocad_id: &str,
    name: &str,
) -> (String, String) {
    create_user_with_admin(pool, vitrocad_id, name, true).await
}

async fn create_user_with_admin(
    pool: &SqlitePool,
    vitrocad_id: &str,
    name: &str,
    is_admin: bool,
) -> (String, String) {
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, vitrocad_id, name, email, login, last_seen, is_admin, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&user_id)
    .bind(vitrocad_id)
    .bind(name)
    .bind(format!("{}@test.com", name))
    .bind(name)
    .bind(&now)
    .bind(is_admin)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    let session_token = uuid::Uuid::new_v4().to_string();
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(7)).to_rfc3339();

    sqlx::query(
        r#"INSERT INTO sessions (id, user_id, token, vitrocad_token, expires_at, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(&session_token)
    .bind(format!("vc-token-{}", name))
    .bind(&expires_at)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    (user_id, session_token)
}

/// Create a file-bound chat with the creator as its admin member.
pub async fn create_file_chat(
    pool: &SqlitePool,
    creator_id: &str,
    file_id: &str,
    name: &str,
) -> String {
    let chat_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO chats (id, name, kind, creator_id, file_id, file_name, created_at, updated_at)
           VALUES (?, ?, 'file', ?, ?, ?, ?, ?)"#,
    )
    .bind(&chat_id)
    .bind(name)
    .bind(creator_id)
    .bind(file_id)
    .bind(name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();

    add_chat_member(pool, &chat_id, creator_id, "admin").await;

    chat_id
}

pub async fn add_chat_member(pool: &SqlitePool, chat_id: &str, user_id: &str, role: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT OR IGNORE INTO chat_members (chat_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(role)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
}

/// Insert a text message with an explicit timestamp (ordering control).
pub async fn insert_message_at(
    pool: &SqlitePool,
    chat_id: &str,
    sender_id: &str,
    content: &str,
    created_at: &str,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        r#"INSERT INTO messages (id, chat_id, sender_id, kind, content, created_at, updated_at)
           VALUES (?, ?, ?, 'text', ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(created_at)
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn insert_message(
    pool: &SqlitePool,
    chat_id: &str,
    sender_id: &str,
    content: &str,
) -> String {
    let now = chrono::Utc::now().to_rfc3339();
    insert_message_at(pool, chat_id, sender_id, content, &now).await
}
