//! Retrieval engine: turns a folder of documents into a searchable index and
//! a query into a ranked list of grounded passages.
//!
//! The engine owns the document store and the flat vector index as a pair.
//! Both are replaced together: a build assembles and persists a complete new
//! pair before installing it, so a failed build leaves the previous one intact.

#[cfg(test)]
mod tests;

mod relevance;
pub mod shared;

pub use relevance::RelevancePolicy;
pub use shared::EngineCell;

use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::extractor::{FileProcessor, TextExtractor};
use crate::index::FlatIndex;
use crate::store::{DocumentStore, IndexPersistence, SourceMetadata};
use crate::{DocQaError, Result};

/// How [`RetrievalEngine::build_or_load`] obtained its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A persisted generation was loaded as is
    Reused { documents: usize },
    /// A new generation was built from the documents directory and saved
    Built { documents: usize, skipped: usize },
}

impl BuildOutcome {
    #[inline]
    pub fn documents(&self) -> usize {
        match *self {
            Self::Reused { documents } | Self::Built { documents, .. } => documents,
        }
    }
}

/// One retrieved passage
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub text: String,
    pub metadata: SourceMetadata,
    /// Squared L2 distance to the query, lower is closer
    pub distance: f32,
}

/// Ranked retrieval result, best match first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    hits: Vec<RetrievedDocument>,
}

impl QueryResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedDocument> {
        self.hits.iter()
    }

    /// Document texts in rank order
    #[inline]
    pub fn documents(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.text.as_str()).collect()
    }

    /// Metadata records in rank order, aligned with [`QueryResult::documents`]
    #[inline]
    pub fn metadatas(&self) -> Vec<&SourceMetadata> {
        self.hits.iter().map(|hit| &hit.metadata).collect()
    }
}

impl FromIterator<RetrievedDocument> for QueryResult {
    #[inline]
    fn from_iter<I: IntoIterator<Item = RetrievedDocument>>(iter: I) -> Self {
        Self {
            hits: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a RetrievedDocument;
    type IntoIter = std::slice::Iter<'a, RetrievedDocument>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

impl IntoIterator for QueryResult {
    type Item = RetrievedDocument;
    type IntoIter = std::vec::IntoIter<RetrievedDocument>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

#[derive(Debug)]
struct Corpus {
    index: FlatIndex,
    store: DocumentStore,
}

pub struct RetrievalEngine<E, X = FileProcessor> {
    embedder: E,
    extractor: X,
    documents_dir: PathBuf,
    persistence: IndexPersistence,
    relevance: RelevancePolicy,
    corpus: Option<Corpus>,
}

impl<E: Embedder> RetrievalEngine<E, FileProcessor> {
    /// Engine over the directories and relevance policy named by `config`
    #[inline]
    pub fn from_config(config: &Config, embedder: E) -> Self {
        Self::new(
            embedder,
            FileProcessor::new(),
            config.documents_path(),
            config.index_path(),
        )
        .with_relevance(config.retrieval.relevance.clone())
    }
}

impl<E: Embedder, X: TextExtractor> RetrievalEngine<E, X> {
    #[inline]
    pub fn new<D: AsRef<Path>, I: AsRef<Path>>(
        embedder: E,
        extractor: X,
        documents_dir: D,
        index_dir: I,
    ) -> Self {
        Self {
            embedder,
            extractor,
            documents_dir: documents_dir.as_ref().to_path_buf(),
            persistence: IndexPersistence::new(index_dir),
            relevance: RelevancePolicy::AcceptAll,
            corpus: None,
        }
    }

    #[inline]
    pub fn with_relevance(mut self, relevance: RelevancePolicy) -> Self {
        self.relevance = relevance;
        self
    }

    #[inline]
    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    #[inline]
    pub fn persistence(&self) -> &IndexPersistence {
        &self.persistence
    }

    /// Number of indexed documents, zero before a successful build or load
    #[inline]
    pub fn count(&self) -> usize {
        self.corpus.as_ref().map_or(0, |corpus| corpus.index.count())
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.corpus.is_some()
    }

    /// Indexed documents, if the engine has been built or loaded
    #[inline]
    pub fn store(&self) -> Option<&DocumentStore> {
        self.corpus.as_ref().map(|corpus| &corpus.store)
    }

    /// Load the persisted generation if it exists and is usable, otherwise
    /// build a new one from the documents directory.
    ///
    /// A persisted generation that fails to load, is empty, or was built for a
    /// different embedding dimension is discarded in favour of a rebuild.
    #[inline]
    pub fn build_or_load(&mut self) -> Result<BuildOutcome> {
        if self.persistence.exists() {
            match self.persistence.load() {
                Ok(generation) if generation.store.is_empty() => {
                    info!("Persisted index is empty, rebuilding");
                }
                Ok(generation) if generation.index.dimension() != self.embedder.dimension() => {
                    warn!(
                        "Persisted index has dimension {} but the embedder produces {}, rebuilding",
                        generation.index.dimension(),
                        self.embedder.dimension()
                    );
                }
                Ok(generation) => {
                    let documents = generation.store.len();
                    info!(
                        "Loaded existing index with {} documents (built {})",
                        documents,
                        generation.built_at.to_rfc3339()
                    );
                    self.corpus = Some(Corpus {
                        index: generation.index,
                        store: generation.store,
                    });
                    return Ok(BuildOutcome::Reused { documents });
                }
                Err(e) => {
                    warn!(
                        "Failed to load persisted index from {}: {}, rebuilding",
                        self.persistence.directory().display(),
                        e
                    );
                }
            }
        }

        self.rebuild()
    }

    /// Build a new generation from every file in the documents directory,
    /// persist it and install it, ignoring any persisted generation.
    #[inline]
    pub fn rebuild(&mut self) -> Result<BuildOutcome> {
        fs::create_dir_all(&self.documents_dir)?;

        let files = list_document_files(&self.documents_dir)?;
        info!(
            "Building index from {} files in {}",
            files.len(),
            self.documents_dir.display()
        );

        let store = self.ingest(&files);
        if store.is_empty() {
            return Err(DocQaError::NoDocumentsProcessed {
                directory: self.documents_dir.clone(),
                attempted: files.len(),
            });
        }

        let index = self.embed_store(&store)?;

        self.persistence
            .save(&index, &store)
            .map_err(|e| DocQaError::Persistence(e.to_string()))?;

        let documents = store.len();
        let skipped = files.len() - documents;
        info!("Indexed {} documents ({} skipped)", documents, skipped);

        self.corpus = Some(Corpus { index, store });
        Ok(BuildOutcome::Built { documents, skipped })
    }

    fn ingest(&self, files: &[PathBuf]) -> DocumentStore {
        let bar = if console::user_attended_stderr() {
            ProgressBar::new(files.len() as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] Extracting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut store = DocumentStore::new();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            bar.set_message(name.clone());

            match self.extractor.process(path) {
                Ok(text) if text.trim().is_empty() => {
                    warn!("Skipping {}: no text extracted", path.display());
                }
                Ok(text) => {
                    debug!("Extracted {} characters from {}", text.len(), name);
                    store.push(text, SourceMetadata::new(name));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        store
    }

    fn embed_store(&self, store: &DocumentStore) -> Result<FlatIndex> {
        let expected = self.embedder.dimension();

        let embeddings = self
            .embedder
            .embed(store.documents())
            .map_err(|e| DocQaError::Embedding(format!("{e:#}")))?;

        if embeddings.len() != store.len() {
            return Err(DocQaError::Embedding(format!(
                "expected {} embeddings, got {}",
                store.len(),
                embeddings.len()
            )));
        }

        if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
            warn!(
                "Embedding dimension {} does not match configured dimension {}",
                bad.len(),
                expected
            );
            return Err(DocQaError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut index = FlatIndex::new(expected).map_err(|e| DocQaError::Index(e.to_string()))?;
        index
            .add(&embeddings)
            .map_err(|e| DocQaError::Index(e.to_string()))?;
        Ok(index)
    }

    /// Retrieve up to `top_k` passages for `text` using the configured
    /// relevance policy.
    ///
    /// Never fails: any internal error is logged and yields an empty result.
    #[inline]
    pub fn query(&self, text: &str, top_k: usize) -> QueryResult {
        self.query_with(text, top_k, &self.relevance)
    }

    /// Like [`RetrievalEngine::query`] with an explicit relevance policy
    #[inline]
    pub fn query_with(&self, text: &str, top_k: usize, relevance: &RelevancePolicy) -> QueryResult {
        match self.try_query(text, top_k, relevance) {
            Ok(result) => result,
            Err(e) => {
                warn!("Query failed, returning no results: {}", e);
                QueryResult::default()
            }
        }
    }

    fn try_query(
        &self,
        text: &str,
        top_k: usize,
        relevance: &RelevancePolicy,
    ) -> Result<QueryResult> {
        let corpus = self
            .corpus
            .as_ref()
            .ok_or_else(|| DocQaError::Index("index has not been built or loaded".to_string()))?;

        let k = top_k.min(corpus.index.count());
        if k == 0 {
            return Ok(QueryResult::default());
        }

        let vector = self
            .embedder
            .embed_one(text)
            .map_err(|e| DocQaError::Embedding(format!("{e:#}")))?;

        let hits = corpus
            .index
            .search(&vector, k)
            .map_err(|e| DocQaError::Index(e.to_string()))?;

        let mut result = QueryResult::default();
        for (id, distance) in hits.neighbors() {
            if !relevance.accepts(text, distance) {
                debug!("Dropping document {} at distance {:.4}", id, distance);
                continue;
            }
            let Some(record) = corpus.store.get(id) else {
                warn!("Index returned id {} outside the document store", id);
                continue;
            };
            result.hits.push(RetrievedDocument {
                text: record.text.to_string(),
                metadata: record.metadata.clone(),
                distance,
            });
        }

        debug!("Query returned {} of {} requested documents", result.len(), k);
        Ok(result)
    }
}

/// Regular files directly inside `dir`, sorted by filename
fn list_document_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
