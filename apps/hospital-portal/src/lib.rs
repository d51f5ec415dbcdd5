//! Portal hospitalar: agendamento de consultas, prescrições e catálogo de
//! medicamentos sobre HTTP.
//!
//! O binário monta o [`AppState`] a partir da configuração e serve o
//! roteador devolvido por [`app`].

pub mod config;
pub mod error;
pub mod forms;
pub mod log;
pub mod routes;
pub mod session;
pub mod state;

pub use state::AppState;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Informações coletadas em tempo de compilação pelo `built`
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Roteador completo com rastreamento e compressão das respostas
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
