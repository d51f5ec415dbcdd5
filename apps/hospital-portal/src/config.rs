//! Configuração do portal
//!
//! Lida de um arquivo TOML opcional e de variáveis de ambiente com prefixo
//! `HOSPITAL_`. Seções aninhadas usam `__` como separador, por exemplo
//! `HOSPITAL_SERVER__PORT=8080` ou `HOSPITAL_DATABASE__DB_PATH=/var/lib/hospital.db`.

use crate::session::{DEFAULT_ANONYMOUS_TTL, DEFAULT_SESSION_TTL};
use config::{Config, ConfigError, Environment, File};
use hospital_db::DbConfig;
use serde::Deserialize;
use std::path::Path;

pub const ENV_PREFIX: &str = "HOSPITAL";
pub const DEFAULT_CONFIG_FILE_PATH: &str = "hospital-portal.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// URL pública usada para montar links (ex.: redefinição de senha)
    pub base_url: String,
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_url: "http://127.0.0.1:8000".to_string(),
            max_concurrent_requests: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Chave HMAC do cookie de sessão. Vazia = gerada a cada inicialização.
    pub secret: String,
    /// Adiciona o atributo `Secure` ao cookie
    pub secure_cookie: bool,
    /// Inatividade máxima de uma sessão autenticada, em segundos
    pub ttl_secs: u64,
    /// Inatividade máxima de uma sessão sem login, em segundos
    pub anonymous_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sessionid".to_string(),
            secret: String::new(),
            secure_cookie: false,
            ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            anonymous_ttl_secs: DEFAULT_ANONYMOUS_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Diretiva no formato do `EnvFilter` (ex.: `info,hospital_db=debug`)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Carrega a configuração do arquivo (se existir) sobreposta pelo ambiente
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    /// Indica se o arquivo de configuração existe
    pub fn file_exists(path: &str) -> bool {
        Path::new(path).exists()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
