// Write-once handle for a process-wide retrieval engine

use once_cell::sync::OnceCell;
use tracing::info;

use super::RetrievalEngine;
use crate::Result;
use crate::embeddings::Embedder;
use crate::extractor::{FileProcessor, TextExtractor};

/// Lazily constructs and builds one [`RetrievalEngine`] and hands out shared
/// references to it afterwards.
///
/// Initialization runs at most once to completion. If it fails the cell stays
/// empty and the next call tries again.
pub struct EngineCell<E, X = FileProcessor> {
    cell: OnceCell<RetrievalEngine<E, X>>,
}

impl<E, X> Default for EngineCell<E, X> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<E, X> EngineCell<E, X> {
    #[inline]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The engine, if it has been initialized
    #[inline]
    pub fn get(&self) -> Option<&RetrievalEngine<E, X>> {
        self.cell.get()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<E: Embedder, X: TextExtractor> EngineCell<E, X> {
    /// Return the engine, constructing it with `create` and running
    /// [`RetrievalEngine::build_or_load`] on first use
    #[inline]
    pub fn get_or_build<F>(&self, create: F) -> Result<&RetrievalEngine<E, X>>
    where
        F: FnOnce() -> Result<RetrievalEngine<E, X>>,
    {
        self.cell.get_or_try_init(|| {
            let mut engine = create()?;
            let outcome = engine.build_or_load()?;
            info!(
                "Retrieval engine ready with {} documents",
                outcome.documents()
            );
            Ok(engine)
        })
    }
}
