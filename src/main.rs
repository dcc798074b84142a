mod app;
mod auth;
mod clients;
mod config;
mod db;
mod error;
mod invites;
mod invoices;
mod mailer;
mod payments;
mod pdf;
mod state;
mod storage;
mod templates;
mod uploads;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "invoxa=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if app_state.config.razorpay.webhook_secret.is_none() {
        tracing::warn!("RAZORPAY_WEBHOOK_SECRET not set; webhook signatures will not be checked");
    }

    sqlx::migrate!("./migrations").run(&app_state.db).await?;

    app::serve(app::build_app(app_state)).await
}
