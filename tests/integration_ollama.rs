#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use docqa::config::{Config, OllamaConfig};
use docqa::embeddings::{Embedder, OllamaClient};
use docqa::engine::{BuildOutcome, RetrievalEngine};
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const TEST_MODEL: &str = "nomic-embed-text:latest";
const TEST_DIMENSION: u32 = 768;
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn integration_config() -> OllamaConfig {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    OllamaConfig {
        host,
        port,
        model,
        batch_size: 5,
        embedding_dimension: TEST_DIMENSION,
        ..OllamaConfig::default()
    }
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&integration_config())
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let client = create_integration_test_client();
    let models = client.list_models().expect("Model listing should succeed");

    info!("Found {} models", models.len());
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
    assert!(!models.is_empty(), "Should have at least one model available");
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_batch_embeddings() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts: Vec<String> = [
        "Virtual Office Platform is a digital workspace.",
        "Employee roster: Alice, Bob.",
        "Quarterly revenue grew by ten percent.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let embeddings = client.embed(&texts).expect("Batch embedding should succeed");

    assert_eq!(embeddings.len(), texts.len());
    for embedding in &embeddings {
        assert_eq!(embedding.len(), client.dimension());
    }
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_retrieval() {
    init_test_tracing();

    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama = integration_config();

    let documents = config.documents_path();
    fs::create_dir_all(&documents).expect("should create documents dir");
    fs::write(
        documents.join("a.txt"),
        "Virtual Office Platform (VOP) is a digital workspace for remote teams.",
    )
    .expect("should write a.txt");
    fs::write(documents.join("b.txt"), "Employee roster: Alice, Bob.")
        .expect("should write b.txt");

    let mut engine = RetrievalEngine::from_config(&config, create_integration_test_client());
    let outcome = engine.build_or_load().expect("build should succeed");
    assert!(matches!(outcome, BuildOutcome::Built { documents: 2, .. }));

    let result = engine.query("What is the Virtual Office Platform?", 1);
    assert_eq!(result.len(), 1);
    assert_eq!(result.metadatas()[0].source, "a.txt");
}
