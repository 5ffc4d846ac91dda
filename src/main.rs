mod db;
mod event;
mod llm;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::auth::AuthKeys;
use services::notify::PushConfig;
use services::payment::StripeConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET required");
    let stripe_api_key = std::env::var("STRIPE_API_KEY").expect("STRIPE_API_KEY required");
    let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // LLM client is non-fatal: AI endpoints fall back to canned content.
    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured, AI endpoints will use fallbacks");
            None
        }
    };

    let state = state::AppState::new(
        pool,
        llm,
        AuthKeys::new(&jwt_secret),
        PushConfig::from_env(),
        StripeConfig::new(stripe_api_key, stripe_webhook_secret),
    );

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "servimatch listening");
    axum::serve(listener, app).await.expect("server failed");
}
