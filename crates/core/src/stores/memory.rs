use crate::error::StoreError;
use crate::models::{ChunkRecord, DocumentRecord, NewChunk, ScoredChunk, StoreStats};
use crate::traits::{ChunkStore, DocumentRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Chunk store backed by process memory. Serves the CLI's storeless mode
/// and the test suite; mirrors the SQL adapter's lookup semantics,
/// including `->>`-style behavior on non-object metadata.
#[derive(Clone, Default)]
pub struct InMemoryChunkStore {
    rows: Arc<Mutex<Vec<ChunkRecord>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut rows = self.rows.lock().expect("chunk rows lock");
        rows.push(ChunkRecord {
            id: id.clone(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            embedding: chunk.embedding.clone(),
        });
        Ok(id)
    }

    async fn find_by_metadata(
        &self,
        keys: &[&str],
        value: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = self.rows.lock().expect("chunk rows lock");
        Ok(rows
            .iter()
            .filter(|row| {
                let Some(object) = row.metadata.as_object() else {
                    return false;
                };
                keys.iter().any(|key| {
                    object
                        .get(*key)
                        .map(|entry| scalar_text(entry).as_deref() == Some(value))
                        .unwrap_or(false)
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_metadata_fragment(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = self.rows.lock().expect("chunk rows lock");
        let mut matches = Vec::new();
        for row in rows.iter() {
            let serialized = serde_json::to_string(&row.metadata)?;
            if serialized.contains(needle) {
                matches.push(row.clone());
                if matches.len() == limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        floor: f64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let rows = self.rows.lock().expect("chunk rows lock");
        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter(|row| row.embedding.len() == query.len())
            .map(|row| ScoredChunk {
                record: row.clone(),
                similarity: cosine_similarity(query, &row.embedding),
            })
            .filter(|hit| hit.similarity >= floor)
            .collect();

        scored.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().expect("chunk rows lock");
        let before = rows.len();
        rows.retain(|row| !ids.contains(&row.id));
        Ok((before - rows.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let rows = self.rows.lock().expect("chunk rows lock");
        Ok(StoreStats {
            rows: rows.len() as u64,
        })
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;

    for (a, b) in left.iter().zip(right.iter()) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    dot / denominator
}

/// Registry stand-in with the same at-most-once `vectorized` semantics
/// the external registry promises.
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    documents: Arc<Mutex<HashMap<String, DocumentRecord>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryRegistry {
    async fn find(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let documents = self.documents.lock().expect("registry lock");
        Ok(documents.get(id).cloned())
    }

    async fn create(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("registry lock");
        documents.insert(record.id.clone(), record);
        Ok(())
    }

    async fn mark_vectorized(&self, id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("registry lock");
        match documents.get_mut(id) {
            Some(record) => {
                record.vectorized = true;
                Ok(())
            }
            None => Err(StoreError::Database(format!(
                "document {id} missing from registry"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn chunk(content: &str, metadata: Value, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            metadata,
            embedding,
        }
    }

    #[tokio::test]
    async fn metadata_lookup_matches_any_alias_key() {
        let store = InMemoryChunkStore::new();
        store
            .insert_chunk(&chunk("a", json!({"documentId": "x"}), vec![1.0]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk("b", json!({"document_id": "x"}), vec![1.0]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk("c", json!({"documentId": "y"}), vec![1.0]))
            .await
            .unwrap();

        let rows = store
            .find_by_metadata(&["documentId", "document_id", "id"], "x", 100)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn stringified_metadata_is_invisible_to_key_lookup_but_not_fragment() {
        let store = InMemoryChunkStore::new();
        let blob = Value::String(r#"{"documentId": "x"}"#.to_string());
        store.insert_chunk(&chunk("a", blob, vec![1.0])).await.unwrap();

        let keyed = store
            .find_by_metadata(&["documentId"], "x", 100)
            .await
            .unwrap();
        assert!(keyed.is_empty());

        let loose = store.find_by_metadata_fragment("x", 100).await.unwrap();
        assert_eq!(loose.len(), 1);
    }

    #[tokio::test]
    async fn similarity_search_orders_by_cosine_and_honors_floor() {
        let store = InMemoryChunkStore::new();
        store
            .insert_chunk(&chunk("near", json!({}), vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk("mid", json!({}), vec![0.7, 0.7]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk("far", json!({}), vec![-1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .similarity_search(&[1.0, 0.0], 10, 0.1)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.content, "near");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn delete_and_stats_round() {
        let store = InMemoryChunkStore::new();
        let id = store
            .insert_chunk(&chunk("a", json!({}), vec![1.0]))
            .await
            .unwrap();
        store
            .insert_chunk(&chunk("b", json!({}), vec![1.0]))
            .await
            .unwrap();

        let deleted = store.delete_by_ids(&[id]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.stats().await.unwrap().rows, 1);
    }

    #[tokio::test]
    async fn registry_marks_vectorized_idempotently() {
        let registry = InMemoryRegistry::new();
        registry
            .create(DocumentRecord {
                id: "doc-1".to_string(),
                original_name: "report.txt".to_string(),
                vectorized: false,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();

        registry.mark_vectorized("doc-1").await.unwrap();
        registry.mark_vectorized("doc-1").await.unwrap();

        let record = registry.find("doc-1").await.unwrap().unwrap();
        assert!(record.vectorized);
        assert!(registry.mark_vectorized("ghost").await.is_err());
    }
}
