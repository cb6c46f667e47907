pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod parse;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use answer::{heuristic_answer, AnswerSynthesizer, SYSTEM_PROMPT};
pub use chunking::{normalize_text, split_text, ChunkingConfig};
pub use config::RagConfig;
pub use embeddings::{
    hashed_embedding, is_null_vector, resize_vector, EmbeddingProvider, EmbeddingStrategy,
    HashingStrategy,
};
pub use error::{ChatError, EmbedError, IngestError, RetrieveError, StoreError};
pub use ingest::IngestionCoordinator;
pub use models::{
    chunk_metadata, derive_document_id, metadata_document_id, Answer, ChunkMatch, ChunkRecord,
    DocumentRecord, IngestionReport, NewChunk, ScoredChunk, StoreStats,
};
pub use ollama::OllamaClient;
pub use retriever::{question_terms, rank_by_terms, RelevanceRetriever, DOCUMENT_KEYS};
pub use stores::{InMemoryChunkStore, InMemoryRegistry, PgVectorChunkStore};
pub use traits::{ChatModel, ChunkStore, DocumentRegistry};
