use std::sync::Arc;

use tower_http::cors::CorsLayer;

use ladder_backend::api::{self, AppState};
use ladder_backend::calendar::CalendarWindow;
use ladder_backend::config::Config;
use ladder_backend::db::Database;
use ladder_backend::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let calendar = CalendarWindow::new(config.timezone);
    let state = AppState::new(db, config.rating_policy.build(), calendar);
    tracing::info!(
        policy = state.recorder.policy_name(),
        timezone = config.timezone.name(),
        "Rating ladder configured"
    );

    let app = api::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Ladder backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
