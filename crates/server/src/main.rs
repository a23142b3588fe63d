use axum::http::{HeaderName, Method};
use nexus_server::monitor::FileMonitor;
use nexus_server::vitrocad::HttpVitrocad;
use nexus_server::ws::gateway::GatewayState;
use nexus_server::{config::Config, db, routes, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_server=info".into()),
        )
        .init();

    let config = Config::from_env();

    // Initialize database
    let pool = db::init_pool(&config.database_path)
        .await
        .expect("Failed to initialize database");

    let gateway = Arc::new(GatewayState::new());
    let vitrocad: Arc<dyn nexus_server::vitrocad::VitrocadApi> =
        Arc::new(HttpVitrocad::new(&config));
    let monitor = Arc::new(FileMonitor::new(
        pool.clone(),
        gateway.clone(),
        vitrocad.clone(),
    ));

    // The polling loop supplements the upload webhooks
    monitor.clone().start(config.monitor_interval_ms).await;

    let state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        gateway,
        vitrocad,
        monitor,
        started_at: std::time::Instant::now(),
    });

    // Build router
    let app = routes::build_router(state.clone()).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                HeaderName::from_static("content-type"),
                HeaderName::from_static("authorization"),
            ])
            .allow_credentials(true),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");

    tracing::info!("Nexus server running on {}", addr);

    axum::serve(listener, app).await.expect("Server error");
}
