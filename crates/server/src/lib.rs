pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod monitor;
pub mod routes;
pub mod vitrocad;
pub mod ws;

use config::Config;
use std::sync::Arc;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub gateway: Arc<ws::gateway::GatewayState>,
    pub vitrocad: Arc<dyn vitrocad::VitrocadApi>,
    pub monitor: Arc<monitor::FileMonitor>,
    pub started_at: std::time::Instant,
}
