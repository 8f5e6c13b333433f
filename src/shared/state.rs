use std::sync::Arc;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use crate::chatbot::ChatEngine;
use crate::config::AppConfig;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Shared request state: immutable config plus the engine, which owns the
/// flow graph, store and escalation notifier. Cheap to clone behind the
/// router's `Arc`.
pub struct AppState {
    pub config: AppConfig,
    pub engine: ChatEngine,
}

impl AppState {
    pub fn new(config: AppConfig, engine: ChatEngine) -> Arc<Self> {
        Arc::new(Self { config, engine })
    }
}
