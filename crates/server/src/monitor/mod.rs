use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::ApiError;
use crate::models::{self, Chat, SystemAction, User};
use crate::vitrocad::VitrocadApi;
use crate::ws::events::ServerEvent;
use crate::ws::gateway::GatewayState;

/// One upload seen in VitroCAD. Webhook pushes and the polling loop both
/// produce this shape; the reconciler does not care which.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadEvent {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub uploader_id: String,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub vitrocad_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadAction {
    Created,
    Updated,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub chat_id: String,
    pub action: UploadAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadResult {
    pub file_id: String,
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<UploadAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub is_monitoring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<String>,
    pub interval_active: bool,
}

/// Translates VitroCAD upload events into chat state: create-or-update the
/// file-bound chat, reconcile membership, and notify affected connections.
pub struct FileMonitor {
    db: sqlx::SqlitePool,
    gateway: Arc<GatewayState>,
    vitrocad: Arc<dyn VitrocadApi>,
    poll_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    is_monitoring: AtomicBool,
    last_check_time: RwLock<Option<String>>,
}

impl FileMonitor {
    pub fn new(
        db: sqlx::SqlitePool,
        gateway: Arc<GatewayState>,
        vitrocad: Arc<dyn VitrocadApi>,
    ) -> Self {
        FileMonitor {
            db,
            gateway,
            vitrocad,
            poll_task: Mutex::new(None),
            is_monitoring: AtomicBool::new(false),
            last_check_time: RwLock::new(None),
        }
    }

    /// Start the polling loop. Calling while already running is a no-op and
    /// never stacks a second timer.
    pub async fn start(self: Arc<Self>, interval_ms: u64) {
        let mut task = self.poll_task.lock().await;
        if task.is_some() {
            tracing::info!("File monitoring already running");
            return;
        }

        tracing::info!("Starting VitroCAD file monitoring ({} ms)", interval_ms);
        self.is_monitoring.store(true, Ordering::SeqCst);

        let monitor = Arc::clone(&self);
        *task = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1_000)));
            loop {
                interval.tick().await;
                monitor.check_for_new_files().await;
            }
        }));
    }

    /// Stop the polling loop. Calling while stopped is a no-op.
    pub async fn stop(&self) {
        let mut task = self.poll_task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            tracing::info!("File monitoring stopped");
        }
        self.is_monitoring.store(false, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> MonitorStats {
        MonitorStats {
            is_monitoring: self.is_monitoring.load(Ordering::SeqCst),
            last_check_time: self.last_check_time.read().await.clone(),
            interval_active: self.poll_task.lock().await.is_some(),
        }
    }

    /// One polling cycle. VitroCAD exposes no recent-uploads enumeration, so
    /// the webhook is the real producer; the tick records liveness. Anything
    /// the cycle may produce in the future goes through handle_file_upload,
    /// and a failed cycle only logs — the loop keeps ticking.
    async fn check_for_new_files(&self) {
        tracing::debug!("Checking for new VitroCAD files");
        *self.last_check_time.write().await = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Reconcile one upload event. Idempotent per file id: re-delivery lands
    /// in the "found" branch instead of creating a second chat.
    pub async fn handle_file_upload(
        &self,
        event: &FileUploadEvent,
    ) -> Result<UploadOutcome, ApiError> {
        if event.file_id.is_empty() || event.file_name.is_empty() || event.uploader_id.is_empty()
        {
            return Err(ApiError::Validation(
                "fileId, fileName and uploaderId are required".into(),
            ));
        }

        tracing::info!(
            "Processing file upload: {} ({})",
            event.file_name,
            event.file_id
        );

        let uploader = self
            .find_or_create_user(&event.uploader_id, event.vitrocad_token.as_deref())
            .await?;

        let existing = self.active_file_chat(&event.file_id).await?;
        if let Some(chat) = existing {
            return self.reconcile_existing(chat, &uploader, event).await;
        }

        match self.insert_file_chat(&uploader, event).await {
            Ok(chat) => self.finish_created(chat, &uploader, event).await,
            // Lost the creation race: someone inserted the chat for this
            // file id between our lookup and insert. Fold into "found".
            Err(e) if is_unique_violation(&e) => {
                let chat = self
                    .active_file_chat(&event.file_id)
                    .await?
                    .ok_or_else(|| ApiError::Internal("chat vanished after conflict".into()))?;
                self.reconcile_existing(chat, &uploader, event).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply every event independently; one failure never aborts the rest.
    pub async fn handle_bulk_file_upload(
        &self,
        events: &[FileUploadEvent],
    ) -> Vec<BulkUploadResult> {
        let mut results = Vec::with_capacity(events.len());

        for event in events {
            let base = BulkUploadResult {
                file_id: event.file_id.clone(),
                file_name: event.file_name.clone(),
                success: false,
                chat_id: None,
                action: None,
                error: None,
            };

            match self.handle_file_upload(event).await {
                Ok(outcome) => results.push(BulkUploadResult {
                    success: true,
                    chat_id: Some(outcome.chat_id),
                    action: Some(outcome.action),
                    ..base
                }),
                Err(e) => {
                    tracing::warn!(
                        "Bulk upload event failed for file {}: {}",
                        event.file_id,
                        e
                    );
                    results.push(BulkUploadResult {
                        error: Some(e.to_string()),
                        ..base
                    });
                }
            }
        }

        results
    }

    async fn active_file_chat(&self, file_id: &str) -> Result<Option<Chat>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE file_id = ? AND is_active = 1",
        )
        .bind(file_id)
        .fetch_optional(&self.db)
        .await
    }

    /// The "found" branch: make sure the uploader is a member and record the
    /// update. An uploader who is already a member changes nothing.
    async fn reconcile_existing(
        &self,
        chat: Chat,
        uploader: &User,
        event: &FileUploadEvent,
    ) -> Result<UploadOutcome, ApiError> {
        if models::is_member(&self.db, &chat.id, &uploader.id).await? {
            tracing::info!("File {} updated in existing chat {}", event.file_name, chat.id);
            return Ok(UploadOutcome {
                chat_id: chat.id,
                action: UploadAction::Updated,
            });
        }

        self.add_member(&chat.id, &uploader.id, "admin").await?;

        let action = SystemAction::FileUpdated {
            file_id: event.file_id.clone(),
            file_name: event.file_name.clone(),
            updated_by: uploader.id.clone(),
        };
        let message_id =
            models::create_system_message(&self.db, &chat.id, &uploader.id, &action).await?;
        models::touch_last_message(&self.db, &chat.id, &message_id).await?;

        self.gateway
            .broadcast_chat_excluding_user(
                &chat.id,
                &ServerEvent::Notification {
                    kind: "file_updated".into(),
                    message: format!("{} updated file {}", uploader.name, event.file_name),
                    chat_id: Some(chat.id.clone()),
                    file_id: Some(event.file_id.clone()),
                    file_name: Some(event.file_name.clone()),
                    creator_name: None,
                },
                &uploader.id,
            )
            .await;

        Ok(UploadOutcome {
            chat_id: chat.id,
            action: UploadAction::Updated,
        })
    }

    /// Insert the chat row plus the creator's admin membership. The partial
    /// unique index on (file_id, active) is what makes this safe to race.
    async fn insert_file_chat(
        &self,
        uploader: &User,
        event: &FileUploadEvent,
    ) -> Result<Chat, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO chats (id, name, kind, creator_id, file_id, file_name, list_id, parent_id, created_at, updated_at)
               VALUES (?, ?, 'file', ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&event.file_name)
        .bind(&uploader.id)
        .bind(&event.file_id)
        .bind(&event.file_name)
        .bind(&event.list_id)
        .bind(&event.parent_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        self.add_member(&id, &uploader.id, "admin").await?;

        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.db)
            .await
    }

    async fn finish_created(
        &self,
        chat: Chat,
        uploader: &User,
        event: &FileUploadEvent,
    ) -> Result<UploadOutcome, ApiError> {
        let action = SystemAction::ChatCreated {
            file_id: event.file_id.clone(),
            file_name: event.file_name.clone(),
            creator: uploader.id.clone(),
        };
        let message_id =
            models::create_system_message(&self.db, &chat.id, &uploader.id, &action).await?;
        models::touch_last_message(&self.db, &chat.id, &message_id).await?;

        // Best-effort: everyone with access to the file joins as a member.
        // Provider trouble here must never undo the chat.
        if let Some(token) = event.vitrocad_token.as_deref() {
            if let Err(e) = self.add_users_with_file_access(&chat, uploader, token).await {
                tracing::warn!("Auto-add by file access failed for {}: {}", chat.id, e);
            }
        }

        self.notify_new_chat(&chat, uploader).await;

        tracing::info!("Created chat {} for file {}", chat.id, event.file_name);

        Ok(UploadOutcome {
            chat_id: chat.id,
            action: UploadAction::Created,
        })
    }

    async fn add_users_with_file_access(
        &self,
        chat: &Chat,
        creator: &User,
        token: &str,
    ) -> Result<(), ApiError> {
        let file_id = match &chat.file_id {
            Some(id) => id.clone(),
            None => return Ok(()),
        };

        let permissions = self.vitrocad.get_item_permissions(&file_id, token).await?;

        for permission in permissions {
            if permission.principal_id.is_empty()
                || permission.principal_id == creator.vitrocad_id
            {
                continue;
            }

            let user = match self
                .find_or_create_user(&permission.principal_id, Some(token))
                .await
            {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(
                        "Skipping principal {}: {}",
                        permission.principal_id,
                        e
                    );
                    continue;
                }
            };

            if models::is_member(&self.db, &chat.id, &user.id).await? {
                continue;
            }

            self.add_member(&chat.id, &user.id, "member").await?;

            let action = SystemAction::UserAutoAdded {
                user_id: user.id.clone(),
                user_name: user.name.clone(),
                reason: "file_access_rights".into(),
            };
            let message_id =
                models::create_system_message(&self.db, &chat.id, &creator.id, &action).await?;
            models::touch_last_message(&self.db, &chat.id, &message_id).await?;

            tracing::info!("Auto-added {} to chat {}", user.name, chat.name);
        }

        Ok(())
    }

    async fn notify_new_chat(&self, chat: &Chat, creator: &User) {
        let member_ids = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM chat_members WHERE chat_id = ?",
        )
        .bind(&chat.id)
        .fetch_all(&self.db)
        .await
        .unwrap_or_default();

        let event = ServerEvent::Notification {
            kind: "new_chat_created".into(),
            message: format!("New chat created: {}", chat.name),
            chat_id: Some(chat.id.clone()),
            file_id: chat.file_id.clone(),
            file_name: chat.file_name.clone(),
            creator_name: Some(creator.name.clone()),
        };

        for user_id in member_ids {
            self.gateway.send_to_user(&user_id, &event).await;
        }
    }

    async fn add_member(
        &self,
        chat_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO chat_members (chat_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(role)
        .bind(&now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Resolve a VitroCAD principal to a local user, creating one on demand.
    /// A provider lookup failure degrades to a placeholder profile instead
    /// of blocking chat creation.
    pub async fn find_or_create_user(
        &self,
        vitrocad_id: &str,
        token: Option<&str>,
    ) -> Result<User, ApiError> {
        if let Some(user) = self.user_by_vitrocad_id(vitrocad_id).await? {
            return Ok(user);
        }

        let (name, email, login, is_active) = match token {
            Some(token) => match self.vitrocad.get_item(vitrocad_id, token).await {
                Ok(item) => (
                    item.field("name")
                        .map(str::to_string)
                        .unwrap_or_else(|| placeholder_name(vitrocad_id)),
                    item.field("email").unwrap_or_default().to_string(),
                    item.field("login").unwrap_or_default().to_string(),
                    item.status == 1,
                ),
                Err(e) => {
                    tracing::warn!("VitroCAD lookup failed for {}: {}", vitrocad_id, e);
                    (placeholder_name(vitrocad_id), String::new(), String::new(), true)
                }
            },
            None => (placeholder_name(vitrocad_id), String::new(), String::new(), true),
        };

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"INSERT INTO users (id, vitrocad_id, name, email, login, last_seen, is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(vitrocad_id)
        .bind(&name)
        .bind(&email)
        .bind(&login)
        .bind(&now)
        .bind(is_active)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            // Two events racing on the same unseen uploader
            Err(e) if is_unique_violation(&e) => {}
            Err(e) => return Err(e.into()),
        }

        self.user_by_vitrocad_id(vitrocad_id)
            .await?
            .ok_or_else(|| ApiError::Internal("user vanished after upsert".into()))
    }

    async fn user_by_vitrocad_id(&self, vitrocad_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE vitrocad_id = ?")
            .bind(vitrocad_id)
            .fetch_optional(&self.db)
            .await
    }
}

fn placeholder_name(vitrocad_id: &str) -> String {
    let prefix: String = vitrocad_id.chars().take(8).collect();
    format!("User {}", prefix)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
