use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocQaError>;

#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("No documents were processed successfully ({attempted} files tried in {})", directory.display())]
    NoDocumentsProcessed { directory: PathBuf, attempted: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod store;
