use crate::chunking::{split_text, ChunkingConfig};
use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::IngestError;
use crate::models::{chunk_metadata, IngestionReport, NewChunk};
use crate::traits::{ChunkStore, DocumentRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives chunking, embedding, and storage for one uploaded document,
/// then flips its `vectorized` flag. Inserts are at-least-once: a
/// mid-document failure leaves already-written chunks in place and the
/// flag untouched.
pub struct IngestionCoordinator<S, R> {
    store: S,
    registry: R,
    embedder: Arc<EmbeddingProvider>,
    chunking: ChunkingConfig,
}

impl<S, R> IngestionCoordinator<S, R>
where
    S: ChunkStore + Send + Sync,
    R: DocumentRegistry + Send + Sync,
{
    pub fn new(store: S, registry: R, embedder: Arc<EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            store,
            registry,
            embedder,
            chunking: ChunkingConfig::from(config),
        }
    }

    pub async fn ingest(
        &self,
        document_id: &str,
        raw_text: &str,
    ) -> Result<IngestionReport, IngestError> {
        let document = self
            .registry
            .find(document_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(document_id.to_string()))?;

        let chunks = split_text(raw_text, self.chunking);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(document_id.to_string()));
        }

        let total = chunks.len();
        info!(document_id, chunk_count = total, "ingesting document");

        // One embedding round-trip per chunk, sequentially, so a flaky
        // backend never sees a burst.
        for (index, content) in chunks.into_iter().enumerate() {
            let embedding = self.embedder.embed_one(&content).await;
            let chunk = NewChunk {
                content,
                metadata: chunk_metadata(document_id, &document.original_name, index),
                embedding,
            };

            if let Err(error) = self.store.insert_chunk(&chunk).await {
                warn!(document_id, chunk_index = index, %error, "chunk insert failed");
                return Err(IngestError::PartialWrite {
                    completed: index,
                    reason: error.to_string(),
                });
            }
        }

        self.registry.mark_vectorized(document_id).await?;
        info!(document_id, chunk_count = total, "document vectorized");

        Ok(IngestionReport { chunk_count: total })
    }
}
