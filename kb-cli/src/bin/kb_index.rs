use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use kb_index::{IncrementalIndexer, PipelineDriver, Sync};
use kb_model::table_name_for_model;
use kb_providers::Embedder;
use tracing_subscriber::{fmt, EnvFilter};

fn print_usage() {
    eprintln!(
        "Usage:\n\
         kb-index [FILE] [--force] [--prune]\n\
         \n\
         Reads newline-delimited document records from FILE, or from stdin\n\
         if FILE is omitted, and indexes them.\n"
    );
}

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut file_path: Option<String> = None;
    let mut force_rebuild = false;
    let mut sync = Sync::Keep;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--force" => force_rebuild = true,
            "--prune" => sync = Sync::Prune,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other => file_path = Some(other.to_string()),
        }
    }

    let config = kb_cli::load_config();
    let embedder = kb_cli::build_embedder(&config).await;
    let dimension = embedder.info().dimension;
    let (doc_store, vector_store) = kb_cli::open_stores(&config, dimension);

    let table_name = config
        .vector_table_name
        .clone()
        .unwrap_or_else(|| table_name_for_model(&config.embedding.model));
    let signature_inputs = kb_cli::signature_inputs(&config, dimension, &table_name);

    let indexer = IncrementalIndexer::new(
        Arc::clone(&doc_store),
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        kb_cli::chunker_config(&config),
        signature_inputs,
    )
    .expect("construct incremental indexer");

    let driver = PipelineDriver::new(&indexer);

    let stats = match file_path {
        Some(path) => {
            let file = File::open(&path).unwrap_or_else(|err| panic!("open {path}: {err}"));
            driver.run(BufReader::new(file), force_rebuild, sync).await.expect("pipeline run failed")
        }
        None => {
            let stdin = io::stdin();
            driver.run(stdin.lock(), force_rebuild, sync).await.expect("pipeline run failed")
        }
    };

    tracing::info!(
        total = stats.total,
        indexed = stats.indexed,
        skipped = stats.skipped,
        chunks_added = stats.chunks_added,
        chunks_deleted = stats.chunks_deleted,
        parse_errors = stats.parse_errors,
        pruned = stats.pruned,
        "indexing run complete"
    );
    for (doc_id, message) in &stats.errors {
        tracing::error!(doc_id, message, "document failed to index");
    }
}
