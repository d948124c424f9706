use std::sync::Arc;

use chrono::Utc;
use kb_api::config::{AppConfig, RetrievalConfig};
use kb_api::state::AppState;
use kb_model::{ChunkRow, DocRow};
use kb_providers::{Embedder, FakeChatModel, FakeEmbedder};
use kb_store::{DocStore, SqliteDocStore, SqliteVectorStore, VectorStore};
use rusqlite::Connection;
use tokio::net::TcpListener;

const DIMENSION: usize = 16;

async fn seeded_state() -> AppState {
    let doc_store = Arc::new(SqliteDocStore::open(Connection::open_in_memory().unwrap()).unwrap());
    let vector_store = Arc::new(
        SqliteVectorStore::open(Connection::open_in_memory().unwrap(), "kb_chunks_test", DIMENSION).unwrap(),
    );
    let embedder = Arc::new(FakeEmbedder::new(DIMENSION));
    let chat_model = Arc::new(FakeChatModel::new(true));

    let content = "quantum computing uses qubits to represent superposed states";
    let embedding = embedder.embed_query(content).await.unwrap();
    let now = Utc::now();
    let chunk = ChunkRow {
        chunk_id: "chunk-1".to_string(),
        doc_id: "doc-1".to_string(),
        content: content.to_string(),
        heading_path: vec!["Intro".to_string()],
        chunk_index: 0,
        embedding,
        created_at: now,
    };
    vector_store.add_chunks(std::slice::from_ref(&chunk)).unwrap();
    doc_store
        .upsert(&DocRow {
            doc_id: "doc-1".to_string(),
            path: "docs/quantum.md".to_string(),
            title: "Quantum Computing".to_string(),
            version: "latest".to_string(),
            checksum: "irrelevant".to_string(),
            chunk_ids: vec!["chunk-1".to_string()],
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    let mut config = AppConfig::default();
    config.retrieval = RetrievalConfig {
        score_threshold: 0.0,
        ..RetrievalConfig::default()
    };
    config.database_url = ":memory:".to_string();

    AppState::new(doc_store, vector_store, embedder, chat_model, config, vec!["docs".to_string()])
}

#[tokio::test]
async fn search_finds_the_seeded_chunk_for_its_own_content() {
    let state = seeded_state().await;
    let router = kb_api::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await
            .unwrap();
    });

    let client = reqwest::Client::new();
    let body = serde_json::json!({ "query": "quantum computing uses qubits to represent superposed states", "k": 5 });
    let resp = client
        .post(format!("http://{addr}/search"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let items: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["chunk_id"], "chunk-1");
    assert_eq!(items[0]["document"]["title"], "Quantum Computing");
}

#[tokio::test]
async fn health_and_root_respond() {
    let state = seeded_state().await;
    let router = kb_api::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await
            .unwrap();
    });

    let client = reqwest::Client::new();
    let health = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let root = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(root.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn search_rejects_invalid_payload() {
    let state = seeded_state().await;
    let router = kb_api::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await
            .unwrap();
    });

    let client = reqwest::Client::new();
    let body = serde_json::json!({ "query": "", "k": 5 });
    let resp = client.post(format!("http://{addr}/search")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}
