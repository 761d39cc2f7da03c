mod args;
mod auth;
mod db;
mod domain;
mod handlers;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use args::parse_args;
use axum::{
    Router,
    routing::{any, post},
};
use db::{create_pool, run_migrations};
use handlers::{budget, expense, login, register};
use logging::setup_logging;
use sqlx::PgPool;

pub struct AppState {
    pool: PgPool,
    token_secret: String,
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir);

    let pool = create_pool(
        &args.database_url,
        args.pool_max_connections,
        Duration::from_millis(args.pool_idle_timeout_ms),
    )
    .await
    .expect("Failed to create PostgreSQL pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let app_state = Arc::new(AppState {
        pool,
        token_secret: args.token_secret,
    });

    // The ledger routes answer every verb; POST and DELETE mutate, anything
    // else just lists.
    let app = Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/budget", any(budget))
        .route("/api/expense", any(expense))
        .with_state(app_state);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
