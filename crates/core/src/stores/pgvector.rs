use crate::error::StoreError;
use crate::models::{ChunkRecord, NewChunk, ScoredChunk, StoreStats};
use crate::traits::ChunkStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

/// Chunk store on Postgres with the pgvector extension. Similarity is
/// `1 - cosine_distance`; the pool is the hard cap on concurrent store
/// work, and exhausted connections queue rather than fail. Clones share
/// the pool.
#[derive(Clone)]
pub struct PgVectorChunkStore {
    pool: PgPool,
    table: String,
    dimensions: usize,
}

impl PgVectorChunkStore {
    pub fn new(pool: PgPool, table: impl Into<String>, dimensions: usize) -> Self {
        Self {
            pool,
            table: table.into(),
            dimensions,
        }
    }

    pub async fn connect(
        database_url: &str,
        table: impl Into<String>,
        dimensions: usize,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, table, dimensions))
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<ChunkRecord, StoreError> {
        let embedding_text: String = row.try_get("embedding_text")?;
        Ok(ChunkRecord {
            id: row.try_get("id")?,
            content: row.try_get("content")?,
            metadata: row.try_get::<Value, _>("metadata")?,
            embedding: parse_vector_literal(&embedding_text)?,
        })
    }
}

#[async_trait]
impl ChunkStore for PgVectorChunkStore {
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<String, StoreError> {
        if chunk.embedding.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: chunk.embedding.len(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let query = format!(
            "INSERT INTO {} (id, content, metadata, embedding, created_at) \
             VALUES ($1, $2, $3, $4::vector, now())",
            self.table
        );

        sqlx::query(&query)
            .bind(&id)
            .bind(&chunk.content)
            .bind(&chunk.metadata)
            .bind(vector_literal(&chunk.embedding))
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    async fn find_by_metadata(
        &self,
        keys: &[&str],
        value: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let predicates: Vec<String> = keys
            .iter()
            .filter(|key| is_safe_key(key))
            .map(|key| format!("metadata->>'{key}' = $1"))
            .collect();

        if predicates.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT id, content, metadata, embedding::text AS embedding_text \
             FROM {} WHERE {} LIMIT $2",
            self.table,
            predicates.join(" OR ")
        );

        let rows = sqlx::query(&query)
            .bind(value)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn find_by_metadata_fragment(
        &self,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let query = format!(
            "SELECT id, content, metadata, embedding::text AS embedding_text \
             FROM {} WHERE metadata::text LIKE '%' || $1 || '%' LIMIT $2",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(needle)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        k: usize,
        floor: f64,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if query_vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let query = format!(
            "SELECT id, content, metadata, embedding::text AS embedding_text, \
                    1 - (embedding <=> $1::vector) AS similarity \
             FROM {} \
             WHERE 1 - (embedding <=> $1::vector) >= $2 \
             ORDER BY embedding <=> $1::vector \
             LIMIT $3",
            self.table
        );

        let rows = sqlx::query(&query)
            .bind(vector_literal(query_vector))
            .bind(floor)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ScoredChunk {
                    record: Self::row_to_record(row)?,
                    similarity: row.try_get("similarity")?,
                })
            })
            .collect()
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let query = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
        let result = sqlx::query(&query).bind(ids).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let query = format!("SELECT COUNT(*) AS row_count FROM {}", self.table);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let rows: i64 = row.try_get("row_count")?;
        Ok(StoreStats { rows: rows as u64 })
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id TEXT PRIMARY KEY, \
                content TEXT NOT NULL, \
                metadata JSONB NOT NULL, \
                embedding vector({}) NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             )",
            self.table, self.dimensions
        );
        sqlx::query(&create_table).execute(&self.pool).await?;

        let vector_index = format!(
            "CREATE INDEX IF NOT EXISTS {0}_embedding_idx \
             ON {0} USING hnsw (embedding vector_cosine_ops)",
            self.table
        );
        if let Err(error) = sqlx::query(&vector_index).execute(&self.pool).await {
            // Older pgvector builds lack hnsw; sequential scan still works.
            warn!(%error, "vector index creation failed, continuing without it");
        }

        let metadata_index = format!(
            "CREATE INDEX IF NOT EXISTS {0}_document_idx \
             ON {0} ((metadata->>'documentId'))",
            self.table
        );
        sqlx::query(&metadata_index).execute(&self.pool).await?;

        info!(table = %self.table, dimensions = self.dimensions, "chunk table schema ensured");
        Ok(())
    }
}

fn vector_literal(vector: &[f32]) -> String {
    let joined = vector
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

fn parse_vector_literal(text: &str) -> Result<Vec<f32>, StoreError> {
    serde_json::from_str(text)
        .map_err(|error| StoreError::Database(format!("bad vector literal: {error}")))
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_round_trips() {
        let literal = vector_literal(&[1.0, -0.5, 0.25]);
        assert_eq!(literal, "[1,-0.5,0.25]");
        assert_eq!(
            parse_vector_literal(&literal).unwrap(),
            vec![1.0, -0.5, 0.25]
        );
    }

    #[test]
    fn metadata_keys_are_vetted_before_interpolation() {
        assert!(is_safe_key("documentId"));
        assert!(is_safe_key("document_id"));
        assert!(!is_safe_key("doc'--"));
        assert!(!is_safe_key(""));
    }
}
