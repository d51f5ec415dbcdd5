use crate::config::{LogConfig, LogFormat};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

// Alvos usados em `info!(target: AUTHENTICATION, ...)`
pub const AUTHENTICATION: &str = "authentication";
pub const SESSION: &str = "session";

static INIT: Once = Once::new();

type Subscriber = Box<dyn tracing::Subscriber + Send + Sync>;

/// Filtro a partir da diretiva configurada; `RUST_LOG` tem precedência
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(&config.level))
}

/// Diretivas inválidas são descartadas em vez de impedir a inicialização
fn configured_filter(level: &str) -> EnvFilter {
    EnvFilter::builder().parse_lossy(level)
}

fn subscriber(config: &LogConfig) -> Subscriber {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
        LogFormat::Text => Box::new(builder.finish()),
    }
}

/// Instala o subscriber global uma única vez
pub fn init(config: &LogConfig) {
    INIT.call_once(|| {
        if tracing::subscriber::set_global_default(subscriber(config)).is_err() {
            eprintln!("Subscriber de tracing já configurado");
        }
    });
}
