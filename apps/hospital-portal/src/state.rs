use crate::config::AppConfig;
use crate::session::SessionStore;
use anyhow::{anyhow, Result};
use hospital_db::crypto::generate_url_token;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Estado compartilhado entre os handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: Arc<SessionStore>,
    /// URL pública sem barra final
    pub base_url: Arc<str>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self> {
        let secret = if config.session.secret.is_empty() {
            warn!("Segredo de sessão não configurado, usando chave aleatória");
            generate_url_token()
        } else {
            config.session.secret.clone()
        };

        let sessions = SessionStore::new(
            secret.as_bytes(),
            config.session.cookie_name.clone(),
            config.session.secure_cookie,
        )
        .map_err(|e| anyhow!("Chave de sessão inválida: {e}"))?
        .with_expiry(
            Duration::from_secs(config.session.ttl_secs),
            Duration::from_secs(config.session.anonymous_ttl_secs),
        );

        Ok(Self {
            pool,
            sessions: Arc::new(sessions),
            base_url: Arc::from(config.server.base_url.trim_end_matches('/')),
        })
    }

    /// URL absoluta para um caminho do portal
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
