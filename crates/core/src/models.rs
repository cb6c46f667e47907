use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A stored slice of a document's text with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    /// JSON object carrying at least `documentId`; legacy rows may also
    /// tag `document_id` or `id`, or hold the whole object as a string.
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// Insert-side view of a chunk; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// A similarity-search hit. `similarity` is `1 - cosine_distance`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub record: ChunkRecord,
    pub similarity: f64,
}

/// What the retriever hands to callers: content plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub content: String,
    pub metadata: Value,
}

impl From<ChunkRecord> for ChunkMatch {
    fn from(record: ChunkRecord) -> Self {
        Self {
            content: record.content,
            metadata: record.metadata,
        }
    }
}

/// Registry view of an uploaded document. `vectorized` flips true only
/// after every chunk is durably written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub original_name: String,
    pub vectorized: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ChunkMatch>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreStats {
    pub rows: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngestionReport {
    pub chunk_count: usize,
}

/// Builds the metadata object every ingested chunk carries. The legacy
/// aliases keep exact-key lookups working against historically tagged rows.
pub fn chunk_metadata(document_id: &str, source: &str, chunk_index: usize) -> Value {
    serde_json::json!({
        "documentId": document_id,
        "document_id": document_id,
        "id": document_id,
        "source": source,
        "chunkIndex": chunk_index,
    })
}

/// Stable document id derived from the source path, so reprocessing the
/// same file lands on the same registry entry.
pub fn derive_document_id(source_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Reads the parent document id out of chunk metadata, tolerating the
/// alias keys and metadata persisted as a JSON-encoded string.
pub fn metadata_document_id(metadata: &Value) -> Option<String> {
    const ALIASES: [&str; 3] = ["documentId", "document_id", "id"];

    if let Some(object) = metadata.as_object() {
        for key in ALIASES {
            if let Some(value) = object.get(key) {
                match value {
                    Value::String(text) => return Some(text.clone()),
                    Value::Number(number) => return Some(number.to_string()),
                    _ => continue,
                }
            }
        }
        return None;
    }

    // Some historical rows serialized the whole object into a string.
    if let Some(text) = metadata.as_str() {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            if parsed.is_object() {
                return metadata_document_id(&parsed);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_document_ids_are_stable_per_path() {
        let first = derive_document_id("/uploads/report.txt");
        let again = derive_document_id("/uploads/report.txt");
        let other = derive_document_id("/uploads/other.txt");

        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn metadata_prefers_camel_case_key() {
        let metadata = json!({"documentId": "a", "document_id": "b"});
        assert_eq!(metadata_document_id(&metadata), Some("a".to_string()));
    }

    #[test]
    fn metadata_falls_back_through_aliases() {
        let metadata = json!({"id": "doc-9", "source": "report.txt"});
        assert_eq!(metadata_document_id(&metadata), Some("doc-9".to_string()));
    }

    #[test]
    fn stringified_metadata_is_parsed() {
        let metadata = Value::String(r#"{"document_id": "doc-3"}"#.to_string());
        assert_eq!(metadata_document_id(&metadata), Some("doc-3".to_string()));
    }

    #[test]
    fn numeric_ids_stringify() {
        let metadata = json!({"documentId": 42});
        assert_eq!(metadata_document_id(&metadata), Some("42".to_string()));
    }

    #[test]
    fn missing_keys_yield_none() {
        assert_eq!(metadata_document_id(&json!({"source": "x"})), None);
        assert_eq!(metadata_document_id(&Value::Null), None);
    }
}
