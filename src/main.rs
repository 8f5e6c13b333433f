use std::sync::Arc;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use dotenvy::dotenv;
use log::{info, warn};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use supportbot::chatbot::{configure_support_routes, ChatEngine};
use supportbot::config::AppConfig;
use supportbot::escalation::{EscalationNotifier, LogNotifier, SmtpNotifier};
use supportbot::flow::catalog::benefits_flow;
use supportbot::shared::state::AppState;
use supportbot::store::memory::MemoryStore;
use supportbot::store::pg::PgStore;
use supportbot::store::SupportStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();
    let flow = Arc::new(benefits_flow());
    info!("loaded support flow with {} nodes", flow.len());

    let store: Arc<dyn SupportStore> = match Pool::builder()
        .max_size(10)
        .connection_timeout(std::time::Duration::from_secs(5))
        .build(ConnectionManager::<PgConnection>::new(&config.database_url))
    {
        Ok(pool) => Arc::new(PgStore::new(pool)),
        Err(e) => {
            warn!("database unavailable ({e}); falling back to in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier: Arc<dyn EscalationNotifier> = if config.email.smtp_server.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(SmtpNotifier::new(
            config.email.clone(),
            config.support.mailbox.clone(),
        ))
    };

    let engine = ChatEngine::new(flow, store, notifier, config.support.notify_timeout);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, engine);

    let app = configure_support_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("support bot listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
