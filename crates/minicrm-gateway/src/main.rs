//! Mini CRM Gateway: outreach message generation over HTTP, backed by sled.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use minicrm_core::{
    ChatCompletionsProvider, CompletionProvider, CrmConfig, MessageGenerator, SledStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::routes::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CrmConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let store = match SledStore::open_path(&config.storage_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(path = %config.storage_path, error = %e, "cannot open store");
            std::process::exit(1);
        }
    };

    let provider = match ChatCompletionsProvider::new(&config.provider) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "cannot build completion client");
            std::process::exit(1);
        }
    };
    if !provider.is_configured() {
        tracing::warn!("no provider API key set; generation requests will fail with 500");
    }
    tracing::info!(model = provider.model(), base_url = %config.provider.base_url, "completion provider ready");

    let generator = MessageGenerator::new(store.clone(), Arc::new(provider))
        .with_language(&config.generation.language);

    let state = Arc::new(AppState {
        store,
        generator: Arc::new(generator),
    });
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(addr = %config.bind_addr, error = %e, "bind failed");
            std::process::exit(1);
        });
    tracing::info!(addr = %config.bind_addr, "minicrm gateway listening");

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "server stopped");
    }
}
