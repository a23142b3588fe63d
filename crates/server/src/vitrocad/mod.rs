use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum VitrocadError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Item not found")]
    NotFound,

    #[error("VitroCAD unavailable: {0}")]
    Unavailable(String),
}

/// Profile fields VitroCAD returns for an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitrocadUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub group_list: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitrocadAuth {
    pub token: String,
    #[serde(default)]
    pub expires: Option<String>,
    pub user: VitrocadUser,
}

/// A list item (file or directory entry). `field_value_map` carries the
/// loosely-typed attribute bag VitroCAD attaches to every item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitrocadItem {
    pub id: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub field_value_map: Value,
}

impl VitrocadItem {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.field_value_map.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitrocadPermission {
    pub principal_id: String,
    #[serde(default)]
    pub permission_level: Option<String>,
}

/// The document-management provider, seen as an opaque authentication and
/// metadata service. Injected as a trait object so tests can stub it.
#[async_trait]
pub trait VitrocadApi: Send + Sync {
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<VitrocadAuth, VitrocadError>;

    async fn get_item(&self, item_id: &str, token: &str)
        -> Result<VitrocadItem, VitrocadError>;

    async fn get_list(
        &self,
        list_id: &str,
        token: &str,
    ) -> Result<Vec<VitrocadItem>, VitrocadError>;

    async fn get_item_permissions(
        &self,
        item_id: &str,
        token: &str,
    ) -> Result<Vec<VitrocadPermission>, VitrocadError>;

    async fn validate_token(&self, token: &str) -> Result<(), VitrocadError>;
}

/// reqwest-backed client for a real VitroCAD instance.
pub struct HttpVitrocad {
    client: reqwest::Client,
    base: String,
}

impl HttpVitrocad {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.vitrocad_timeout_secs))
            .build()
            .expect("Failed to build VitroCAD HTTP client");

        HttpVitrocad {
            client,
            base: format!("{}{}", config.vitrocad_base_url, config.vitrocad_api_path),
        }
    }

    async fn post_authed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T, VitrocadError> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .header("Authorization", token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| VitrocadError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VitrocadError::NotFound);
        }
        if !response.status().is_success() {
            return Err(VitrocadError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| VitrocadError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl VitrocadApi for HttpVitrocad {
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<VitrocadAuth, VitrocadError> {
        let response = self
            .client
            .post(format!("{}/security/login", self.base))
            .json(&serde_json::json!({ "login": login, "password": password }))
            .send()
            .await
            .map_err(|e| VitrocadError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(VitrocadError::InvalidCredentials);
        }
        if !response.status().is_success() {
            return Err(VitrocadError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let auth = response
            .json::<VitrocadAuth>()
            .await
            .map_err(|_| VitrocadError::InvalidCredentials)?;

        if auth.token.is_empty() {
            return Err(VitrocadError::InvalidCredentials);
        }

        Ok(auth)
    }

    async fn get_item(
        &self,
        item_id: &str,
        token: &str,
    ) -> Result<VitrocadItem, VitrocadError> {
        self.post_authed(&format!("/item/get/{}", item_id), token).await
    }

    async fn get_list(
        &self,
        list_id: &str,
        token: &str,
    ) -> Result<Vec<VitrocadItem>, VitrocadError> {
        self.post_authed(&format!("/item/getList/{}", list_id), token).await
    }

    async fn get_item_permissions(
        &self,
        item_id: &str,
        token: &str,
    ) -> Result<Vec<VitrocadPermission>, VitrocadError> {
        self.post_authed(&format!("/security/getItemPermissionList/{}", item_id), token)
            .await
    }

    async fn validate_token(&self, token: &str) -> Result<(), VitrocadError> {
        let _: Value = self.post_authed("/security/getCurrentUser", token).await?;
        Ok(())
    }
}
