/// Process-wide configuration, built once at startup and handed to each
/// component constructor. Nothing in the core reads globals.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Base URL of the Ollama-compatible model backend.
    pub model_base_url: String,
    /// Model used by the embeddings endpoints.
    pub embed_model: String,
    /// Model used for chat completions and text-derived embeddings.
    pub chat_model: String,
    /// Store-wide embedding dimensionality. Every strategy output is
    /// resized to exactly this length.
    pub embedding_dimensions: usize,
    /// Minimum similarity for fallback vector search. Deliberately
    /// permissive: cross-backend embeddings are weak signals.
    pub similarity_floor: f64,
    /// Row cap for the direct metadata lookup.
    pub metadata_scan_limit: usize,
    /// Target chunk size in characters.
    pub chunk_max_chars: usize,
    /// Overlap carried between consecutive chunks.
    pub chunk_overlap_chars: usize,
    /// Hard cap on pooled store connections; requests queue past it.
    pub max_pool_connections: u32,
    /// Default number of chunks returned to the answer synthesizer.
    pub default_top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model_base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_dimensions: 768,
            similarity_floor: 0.1,
            metadata_scan_limit: 100,
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            max_pool_connections: 20,
            default_top_k: 5,
        }
    }
}
