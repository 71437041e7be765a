// Document store module
// Ordered (text, source) pairs positionally aligned with the vector index

#[cfg(test)]
mod tests;

pub mod persistence;

pub use persistence::{IndexGeneration, IndexPersistence};

use serde::{Deserialize, Serialize};

/// Metadata stored alongside each ingested document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Filename the document was extracted from
    pub source: String,
}

impl SourceMetadata {
    #[inline]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Borrowed view of one stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRecord<'a> {
    /// Position in the store, equal to the id of its vector in the index
    pub id: usize,
    pub text: &'a str,
    pub metadata: &'a SourceMetadata,
}

/// Two parallel sequences of document texts and their metadata.
///
/// Entries are only ever appended; a rebuild replaces the whole store.
/// `documents[i]` and `metadatas[i]` always describe the same source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStore {
    documents: Vec<String>,
    metadatas: Vec<SourceMetadata>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Document store is misaligned: {documents} documents but {metadatas} metadata records")]
pub struct MisalignedStore {
    pub documents: usize,
    pub metadatas: usize,
}

impl DocumentStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from two sequences read back from disk
    #[inline]
    pub fn from_parts(
        documents: Vec<String>,
        metadatas: Vec<SourceMetadata>,
    ) -> Result<Self, MisalignedStore> {
        if documents.len() != metadatas.len() {
            return Err(MisalignedStore {
                documents: documents.len(),
                metadatas: metadatas.len(),
            });
        }
        Ok(Self {
            documents,
            metadatas,
        })
    }

    #[inline]
    pub fn push(&mut self, text: String, metadata: SourceMetadata) {
        self.documents.push(text);
        self.metadatas.push(metadata);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<DocumentRecord<'_>> {
        let text = self.documents.get(id)?;
        let metadata = self.metadatas.get(id)?;
        Some(DocumentRecord {
            id,
            text,
            metadata,
        })
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = DocumentRecord<'_>> {
        self.documents
            .iter()
            .zip(self.metadatas.iter())
            .enumerate()
            .map(|(id, (text, metadata))| DocumentRecord {
                id,
                text,
                metadata,
            })
    }

    #[inline]
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    #[inline]
    pub fn metadatas(&self) -> &[SourceMetadata] {
        &self.metadatas
    }

    /// Source filenames in storage order
    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.metadatas.iter().map(|m| m.source.as_str())
    }
}
