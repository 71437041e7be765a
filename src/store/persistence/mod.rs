//! On-disk layout of one index generation.
//!
//! A generation is a directory holding two artifacts that are always read and
//! written together:
//!
//! - `index.bin`: the flat vector index, bincode-encoded with a format version
//! - `metadata.json`: the document texts and their source metadata
//!
//! Each artifact is written to a temporary file in the target directory and
//! renamed into place, so a reader never sees a partially written file. Both
//! artifacts carry the same generation id; a pair whose ids differ (a save
//! interrupted between the two renames) is rejected on load.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DocumentStore, MisalignedStore, SourceMetadata};
use crate::index::{FlatIndex, IndexError};

pub const INDEX_FILE_NAME: &str = "index.bin";
pub const METADATA_FILE_NAME: &str = "metadata.json";

const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Index artifact {0} is missing")]
    MissingArtifact(PathBuf),
    #[error("Unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error(
        "Inconsistent index generation: {vectors} vectors, {documents} documents, {metadatas} metadata records"
    )]
    Inconsistent {
        vectors: usize,
        documents: usize,
        metadatas: usize,
    },
    #[error("Index artifact belongs to generation {index} but metadata to {metadata}")]
    GenerationMismatch { index: Uuid, metadata: Uuid },
    #[error("Corrupt index artifact: {0}")]
    CorruptIndex(#[from] IndexError),
    #[error("Failed to encode or decode index: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Failed to encode or decode metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully loaded index generation
#[derive(Debug, Clone)]
pub struct IndexGeneration {
    pub id: Uuid,
    pub index: FlatIndex,
    pub store: DocumentStore,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct IndexArtifactRef<'a> {
    format_version: u32,
    generation_id: Uuid,
    index: &'a FlatIndex,
}

#[derive(Deserialize)]
struct IndexArtifact {
    format_version: u32,
    generation_id: Uuid,
    index: FlatIndex,
}

#[derive(Serialize)]
struct MetadataArtifactRef<'a> {
    generation_id: Uuid,
    documents: &'a [String],
    metadatas: &'a [SourceMetadata],
    built_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct MetadataArtifact {
    generation_id: Uuid,
    documents: Vec<String>,
    metadatas: Vec<SourceMetadata>,
    built_at: DateTime<Utc>,
}

/// Reads and writes index generations in one directory
#[derive(Debug, Clone)]
pub struct IndexPersistence {
    directory: PathBuf,
}

impl IndexPersistence {
    #[inline]
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[inline]
    pub fn index_file_path(&self) -> PathBuf {
        self.directory.join(INDEX_FILE_NAME)
    }

    #[inline]
    pub fn metadata_file_path(&self) -> PathBuf {
        self.directory.join(METADATA_FILE_NAME)
    }

    /// True only when both artifacts are present as regular files
    #[inline]
    pub fn exists(&self) -> bool {
        self.index_file_path().is_file() && self.metadata_file_path().is_file()
    }

    /// Persist `index` and `store` as the current generation.
    ///
    /// The target directory is created if absent.
    #[inline]
    pub fn save(
        &self,
        index: &FlatIndex,
        store: &DocumentStore,
    ) -> Result<DateTime<Utc>, PersistenceError> {
        if index.count() != store.len() {
            return Err(PersistenceError::Inconsistent {
                vectors: index.count(),
                documents: store.documents().len(),
                metadatas: store.metadatas().len(),
            });
        }

        fs::create_dir_all(&self.directory)?;

        let built_at = Utc::now();
        let generation_id = Uuid::new_v4();

        let index_bytes = bincode::serialize(&IndexArtifactRef {
            format_version: FORMAT_VERSION,
            generation_id,
            index,
        })?;
        let metadata_bytes = serde_json::to_vec(&MetadataArtifactRef {
            generation_id,
            documents: store.documents(),
            metadatas: store.metadatas(),
            built_at,
        })?;

        self.write_atomically(&self.index_file_path(), &index_bytes)?;
        self.write_atomically(&self.metadata_file_path(), &metadata_bytes)?;

        info!(
            "Saved index generation {} with {} documents to {}",
            generation_id,
            store.len(),
            self.directory.display()
        );
        Ok(built_at)
    }

    /// Load the persisted generation, validating that its parts agree
    #[inline]
    pub fn load(&self) -> Result<IndexGeneration, PersistenceError> {
        let index_path = self.index_file_path();
        let metadata_path = self.metadata_file_path();

        for path in [&index_path, &metadata_path] {
            if !path.is_file() {
                return Err(PersistenceError::MissingArtifact(path.clone()));
            }
        }

        let artifact: IndexArtifact = bincode::deserialize(&fs::read(&index_path)?)?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: artifact.format_version,
                expected: FORMAT_VERSION,
            });
        }
        artifact.index.validate()?;

        let metadata: MetadataArtifact = serde_json::from_slice(&fs::read(&metadata_path)?)?;
        if metadata.generation_id != artifact.generation_id {
            return Err(PersistenceError::GenerationMismatch {
                index: artifact.generation_id,
                metadata: metadata.generation_id,
            });
        }

        let vectors = artifact.index.count();
        let store = DocumentStore::from_parts(metadata.documents, metadata.metadatas).map_err(
            |MisalignedStore {
                 documents,
                 metadatas,
             }| PersistenceError::Inconsistent {
                vectors,
                documents,
                metadatas,
            },
        )?;
        if store.len() != vectors {
            return Err(PersistenceError::Inconsistent {
                vectors,
                documents: store.len(),
                metadatas: store.len(),
            });
        }

        debug!(
            "Loaded index generation with {} documents from {}",
            store.len(),
            self.directory.display()
        );

        Ok(IndexGeneration {
            id: artifact.generation_id,
            index: artifact.index,
            store,
            built_at: metadata.built_at,
        })
    }

    fn write_atomically(&self, target: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        let mut temp = NamedTempFile::new_in(&self.directory)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }
}
