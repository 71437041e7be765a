// Embeddings module
// Maps document and query text to fixed-dimension dense vectors

pub mod ollama;

pub use ollama::OllamaClient;

/// Output dimension of `all-MiniLM-L6-v2`, served by Ollama as `all-minilm`
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

/// A text embedding model.
///
/// Implementations are stateless across calls: no embeddings are cached, and the
/// same input produces the same vector for a fixed model version. The returned
/// vectors are in the same order as `texts`.
pub trait Embedder {
    /// Dimension the model is configured to produce
    fn dimension(&self) -> usize;

    /// Embed a batch of texts
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector"))
    }
}
