use std::net::SocketAddr;

use kb_api::state::AppState;
use kb_providers::Embedder;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = kb_cli::load_config();
    let embedder = kb_cli::build_embedder(&config).await;
    let chat_model = kb_cli::build_chat_model(&config);
    let (doc_store, vector_store) = kb_cli::open_stores(&config, embedder.info().dimension);

    let state = AppState::new(doc_store, vector_store, embedder, chat_model, config, kb_cli::content_roots());
    let router = kb_api::router(state);

    let addr: SocketAddr = std::env::var("KB_LISTEN_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| "0.0.0.0:8000".parse().unwrap());

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listen address");
    tracing::info!(%addr, "kb-serve listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server error");
}
