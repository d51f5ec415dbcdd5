use anyhow::{Context, Result};
use hospital_db::init_db_pool;
use hospital_portal::{
    app, built_info,
    config::{AppConfig, DEFAULT_CONFIG_FILE_PATH},
    log, AppState,
};
use std::net::SocketAddr;
use tower::limit::ConcurrencyLimitLayer;
use tracing::{info, warn};

/// Variável de ambiente com o caminho do arquivo de configuração
const CONFIG_PATH_ENV: &str = "HOSPITAL_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE_PATH.to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Falha ao carregar a configuração de {config_path}"))?;

    log::init(&config.log);

    if !AppConfig::file_exists(&config_path) {
        warn!(path = %config_path, "Arquivo de configuração não encontrado, usando padrões e ambiente");
    }

    info!(
        version = built_info::PKG_VERSION,
        profile = built_info::PROFILE,
        "Iniciando {}",
        built_info::PKG_NAME
    );

    let pool = init_db_pool(&config.database).await?;
    let state = AppState::new(pool, &config)?;

    let router = app(state).layer(ConcurrencyLimitLayer::new(
        config.server.max_concurrent_requests,
    ));

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("Endereço inválido: {}", config.listen_addr()))?;
    info!(%addr, base_url = %config.server.base_url, "Servidor escutando");

    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Falha no servidor HTTP")?;

    info!("Servidor encerrado");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Falha ao aguardar o sinal de encerramento");
    }
}
