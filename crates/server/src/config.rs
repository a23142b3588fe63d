use std::env;

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub vitrocad_base_url: String,
    pub vitrocad_api_path: String,
    pub vitrocad_timeout_secs: u64,
    pub monitor_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "./nexus.db".into()),
            vitrocad_base_url: env::var("VITROCAD_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            vitrocad_api_path: env::var("VITROCAD_API_PATH").unwrap_or_else(|_| "/api".into()),
            vitrocad_timeout_secs: env::var("VITROCAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            monitor_interval_ms: env::var("MONITOR_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(nexus_shared::constants::DEFAULT_MONITOR_INTERVAL_MS),
        }
    }
}
