mod registry;

use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_qa_core::{
    derive_document_id, AnswerSynthesizer, ChunkStore, DocumentRecord, DocumentRegistry,
    EmbeddingProvider, IngestionCoordinator, OllamaClient, PgVectorChunkStore, RagConfig,
    RelevanceRetriever,
};
use registry::FileRegistry;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/docqa")]
    database_url: String,

    /// Chunk table name
    #[arg(long, default_value = "document_chunks")]
    table: String,

    /// Path of the JSON document registry
    #[arg(long, default_value = ".docqa/registry.json")]
    registry: String,

    /// Base URL of the Ollama-compatible model backend
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding model name
    #[arg(long, default_value = "nomic-embed-text")]
    embed_model: String,

    /// Chat model name
    #[arg(long, default_value = "llama3.2")]
    chat_model: String,

    /// Store-wide embedding dimensionality
    #[arg(long, default_value = "768")]
    dimensions: usize,

    /// Similarity floor for fallback vector search
    #[arg(long, default_value = "0.1")]
    similarity_floor: f64,

    /// Connection pool cap
    #[arg(long, default_value = "20")]
    max_connections: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed, and store one document's extracted text.
    Process {
        /// Plain-text file holding the document's extracted text.
        #[arg(long)]
        file: String,
        /// Reuse an existing document id instead of minting one.
        #[arg(long)]
        id: Option<String>,
    },
    /// Ask a question against a processed document.
    Ask {
        /// Document id printed by `process`.
        #[arg(long)]
        id: String,
        /// Natural-language question.
        #[arg(long)]
        question: String,
        /// Number of source chunks to retrieve.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Process a file and ask one question entirely in memory, without
    /// Postgres. Useful for smoke tests against a local model backend.
    Demo {
        #[arg(long)]
        file: String,
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Print chunk table statistics.
    Stats,
}

impl Cli {
    fn rag_config(&self) -> RagConfig {
        RagConfig {
            model_base_url: self.ollama_url.clone(),
            embed_model: self.embed_model.clone(),
            chat_model: self.chat_model.clone(),
            embedding_dimensions: self.dimensions,
            similarity_floor: self.similarity_floor,
            max_pool_connections: self.max_connections,
            ..RagConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config();

    match &cli.command {
        Command::Process { file, id } => {
            let store = connect_store(&cli, &config).await?;
            let registry = FileRegistry::load(&cli.registry)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let embedder = Arc::new(
                EmbeddingProvider::new(&config)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
            );

            let document_id = ensure_document(&registry, id.clone(), file).await?;
            let text = tokio::fs::read_to_string(file).await?;

            let coordinator =
                IngestionCoordinator::new(store, registry, embedder, &config);
            let report = coordinator
                .ingest(&document_id, &text)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "document {} processed: {} chunk(s) at {}",
                document_id,
                report.chunk_count,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            id,
            question,
            top_k,
        } => {
            let store = connect_store(&cli, &config).await?;
            let registry = FileRegistry::load(&cli.registry)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let embedder = Arc::new(
                EmbeddingProvider::new(&config)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
            );
            let chat = OllamaClient::new(&config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let retriever = RelevanceRetriever::new(
                store.clone(),
                registry.clone(),
                Arc::clone(&embedder),
                &config,
            );
            let synthesizer =
                AnswerSynthesizer::new(retriever, store, registry, chat, &config);

            let answer = synthesizer.answer(id, question, *top_k).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Demo {
            file,
            question,
            top_k,
        } => {
            use doc_qa_core::{InMemoryChunkStore, InMemoryRegistry};

            let store = InMemoryChunkStore::new();
            let registry = InMemoryRegistry::new();
            let embedder = Arc::new(
                EmbeddingProvider::new(&config)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
            );
            let chat = OllamaClient::new(&config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let document_id = ensure_document(&registry, None, file).await?;
            let text = tokio::fs::read_to_string(file).await?;

            let coordinator = IngestionCoordinator::new(
                store.clone(),
                registry.clone(),
                Arc::clone(&embedder),
                &config,
            );
            let report = coordinator
                .ingest(&document_id, &text)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            info!(chunk_count = report.chunk_count, "demo document ingested");

            let retriever = RelevanceRetriever::new(
                store.clone(),
                registry.clone(),
                embedder,
                &config,
            );
            let synthesizer =
                AnswerSynthesizer::new(retriever, store, registry, chat, &config);

            let answer = synthesizer.answer(&document_id, question, *top_k).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Stats => {
            let store = connect_store(&cli, &config).await?;
            let stats = store
                .stats()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("chunk rows: {}", stats.rows);
        }
    }

    Ok(())
}

async fn connect_store(cli: &Cli, config: &RagConfig) -> anyhow::Result<PgVectorChunkStore> {
    let store = PgVectorChunkStore::connect(
        &cli.database_url,
        &cli.table,
        config.embedding_dimensions,
        config.max_pool_connections,
    )
    .await
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    // Idempotent and startup-time only; ingestion surfaces its own error
    // if the table truly is missing.
    if let Err(error) = store.ensure_schema().await {
        warn!(%error, "schema synchronization failed");
    }

    Ok(store)
}

async fn ensure_document<R: DocumentRegistry>(
    registry: &R,
    id: Option<String>,
    file: &str,
) -> anyhow::Result<String> {
    let document_id = id.unwrap_or_else(|| derive_document_id(file));

    let existing = registry
        .find(&document_id)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    if existing.is_none() {
        let original_name = Path::new(file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file)
            .to_string();

        registry
            .create(DocumentRecord {
                id: document_id.clone(),
                original_name,
                vectorized: false,
                uploaded_at: Utc::now(),
            })
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    }

    Ok(document_id)
}
