use crate::config::RagConfig;
use crate::models::{Answer, ChunkMatch};
use crate::retriever::{rank_by_terms, RelevanceRetriever};
use crate::traits::{ChatModel, ChunkStore, DocumentRegistry};
use regex::Regex;
use tracing::warn;

pub const SYSTEM_PROMPT: &str = "You answer questions about a document using only the \
provided context. If the context does not contain the answer, say you do not have \
enough information. Never invent facts that are not in the context.";

const NOT_FOUND_ANSWER: &str =
    "I couldn't find that document. It may have been deleted or never uploaded.";
const NOT_PROCESSED_ANSWER: &str =
    "This document hasn't been processed yet. Please process it first, then ask again.";
const REGISTRY_UNAVAILABLE_ANSWER: &str =
    "I couldn't look up that document right now. Please try again in a moment.";
const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant information in this document to answer your question.";
const NO_INFORMATION_ANSWER: &str =
    "There is not enough information in the document to answer this question.";

/// Place-like phrases: a capitalized run ending in an administrative
/// suffix, or one of a few well-known city names.
const GAZETTEER_PATTERN: &str = r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)? (?:City|District|State|Country)\b|\b(?:London|Paris|Tokyo|Berlin|Mumbai|Singapore|New York)\b";

/// The outermost boundary a user sees. Never fails: structural problems
/// become polite answer text, model trouble becomes heuristic extraction
/// over whatever chunks were retrieved.
pub struct AnswerSynthesizer<S, R, C> {
    retriever: RelevanceRetriever<S, R>,
    store: S,
    registry: R,
    chat: C,
    scan_limit: usize,
}

impl<S, R, C> AnswerSynthesizer<S, R, C>
where
    S: ChunkStore + Send + Sync,
    R: DocumentRegistry + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(
        retriever: RelevanceRetriever<S, R>,
        store: S,
        registry: R,
        chat: C,
        config: &RagConfig,
    ) -> Self {
        Self {
            retriever,
            store,
            registry,
            chat,
            scan_limit: config.metadata_scan_limit,
        }
    }

    pub async fn answer(&self, document_id: &str, question: &str, top_k: usize) -> Answer {
        match self.registry.find(document_id).await {
            Ok(Some(document)) if document.vectorized => {}
            Ok(Some(_)) => return text_answer(NOT_PROCESSED_ANSWER),
            Ok(None) => return text_answer(NOT_FOUND_ANSWER),
            Err(error) => {
                warn!(document_id, %error, "registry lookup failed");
                return text_answer(REGISTRY_UNAVAILABLE_ANSWER);
            }
        }

        let sources = match self
            .retriever
            .find_relevant(document_id, question, top_k)
            .await
        {
            Ok(matches) => matches,
            Err(error) => {
                warn!(document_id, %error, "retrieval failed, trying loose metadata match");
                let rescued = self.last_resort(document_id, question, top_k).await;
                if rescued.is_empty() {
                    return text_answer(NO_CONTEXT_ANSWER);
                }
                rescued
            }
        };

        let context = sources
            .iter()
            .map(|source| source.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = match self.chat.complete(SYSTEM_PROMPT, &context, question).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(document_id, "model returned an empty answer, extracting heuristically");
                heuristic_answer(question, &sources)
            }
            Err(error) => {
                warn!(document_id, %error, "model call failed, extracting heuristically");
                heuristic_answer(question, &sources)
            }
        };

        Answer { answer, sources }
    }

    /// Loose substring match over serialized metadata, catching rows the
    /// retriever's exact-key lookup missed, rescored by term frequency.
    async fn last_resort(&self, document_id: &str, question: &str, top_k: usize) -> Vec<ChunkMatch> {
        match self
            .store
            .find_by_metadata_fragment(document_id, self.scan_limit)
            .await
        {
            Ok(rows) => rank_by_terms(rows, question, top_k)
                .into_iter()
                .map(ChunkMatch::from)
                .collect(),
            Err(error) => {
                warn!(document_id, %error, "loose metadata query failed");
                Vec::new()
            }
        }
    }
}

fn text_answer(text: &str) -> Answer {
    Answer {
        answer: text.to_string(),
        sources: Vec::new(),
    }
}

/// Deterministic answer extraction, keyed by question type. Used when the
/// model is unavailable; works only from the retrieved chunk text.
pub fn heuristic_answer(question: &str, sources: &[ChunkMatch]) -> String {
    if sources.is_empty() {
        return NO_INFORMATION_ANSWER.to_string();
    }

    let texts: Vec<&str> = sources.iter().map(|source| source.content.as_str()).collect();
    let lowered = question.to_lowercase();

    let keyed = if lowered.contains("what") {
        sentence_summary(&texts, 20, 5)
    } else if lowered.contains("who") {
        regex_extract(&texts, r"\b[A-Z][a-z]+ [A-Z][a-z]+\b", 3)
    } else if lowered.contains("when") {
        regex_extract(
            &texts,
            r"\b\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}\b|\b(?:19|20)\d{2}\b",
            3,
        )
    } else if lowered.contains("where") {
        regex_extract(&texts, GAZETTEER_PATTERN, 3)
    } else {
        None
    };

    keyed
        .or_else(|| sentence_summary(&texts, 30, 3))
        .or_else(|| {
            texts
                .first()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_else(|| NO_INFORMATION_ANSWER.to_string())
}

/// Sentences longer than `min_chars` across all chunks, first `take`.
fn sentence_summary(texts: &[&str], min_chars: usize, take: usize) -> Option<String> {
    let mut sentences = Vec::new();
    for text in texts {
        for sentence in text.split(['.', '!', '?']) {
            let trimmed = sentence.trim();
            if trimmed.len() > min_chars {
                sentences.push(trimmed);
            }
            if sentences.len() == take {
                break;
            }
        }
        if sentences.len() == take {
            break;
        }
    }

    if sentences.is_empty() {
        None
    } else {
        Some(sentences.join(". "))
    }
}

/// First `take` distinct pattern matches across the chunks, in order.
fn regex_extract(texts: &[&str], pattern: &str, take: usize) -> Option<String> {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(_) => return None,
    };

    let mut found = Vec::new();
    for text in texts {
        for hit in regex.find_iter(text) {
            let value = hit.as_str().to_string();
            if !found.contains(&value) {
                found.push(value);
            }
            if found.len() == take {
                break;
            }
        }
        if found.len() == take {
            break;
        }
    }

    if found.is_empty() {
        None
    } else {
        Some(found.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingProvider, HashingStrategy};
    use crate::error::ChatError;
    use crate::models::{DocumentRecord, NewChunk};
    use crate::stores::{InMemoryChunkStore, InMemoryRegistry};
    use crate::traits::ChatModel;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedChat {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedChat {
        fn failing(calls: Arc<AtomicUsize>) -> Self {
            Self { reply: None, calls }
        }

        fn answering(reply: &str, calls: Arc<AtomicUsize>) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls,
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(
            &self,
            _system: &str,
            _context: &str,
            _question: &str,
        ) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(ChatError::BackendResponse {
                    backend: "fake".to_string(),
                    details: "model unavailable".to_string(),
                }),
            }
        }
    }

    fn config() -> RagConfig {
        RagConfig {
            embedding_dimensions: 4,
            ..RagConfig::default()
        }
    }

    fn embedder() -> Arc<EmbeddingProvider> {
        Arc::new(EmbeddingProvider::with_strategies(
            4,
            vec![Box::new(HashingStrategy { dimensions: 4 })],
        ))
    }

    async fn seeded(
        chunks: &[(&str, Value)],
        vectorized: bool,
    ) -> (InMemoryChunkStore, InMemoryRegistry) {
        let store = InMemoryChunkStore::new();
        for (content, metadata) in chunks {
            store
                .insert_chunk(&NewChunk {
                    content: content.to_string(),
                    metadata: metadata.clone(),
                    embedding: vec![0.0; 4],
                })
                .await
                .unwrap();
        }

        let registry = InMemoryRegistry::new();
        registry
            .create(DocumentRecord {
                id: "doc-x".to_string(),
                original_name: "report.txt".to_string(),
                vectorized,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();

        (store, registry)
    }

    fn synthesizer(
        store: InMemoryChunkStore,
        registry: InMemoryRegistry,
        chat: ScriptedChat,
    ) -> AnswerSynthesizer<InMemoryChunkStore, InMemoryRegistry, ScriptedChat> {
        let retriever = RelevanceRetriever::new(
            store.clone(),
            registry.clone(),
            embedder(),
            &config(),
        );
        AnswerSynthesizer::new(retriever, store, registry, chat, &config())
    }

    #[tokio::test]
    async fn model_answer_is_passed_through_with_sources() {
        let (store, registry) = seeded(
            &[("invoice total $500", json!({"documentId": "doc-x"}))],
            true,
        )
        .await;
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer = synthesizer(
            store,
            registry,
            ScriptedChat::answering("The total is $500.", Arc::clone(&calls)),
        );

        let answer = synthesizer.answer("doc-x", "what is the total", 5).await;

        assert_eq!(answer.answer, "The total is $500.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_who_heuristic() {
        let (store, registry) = seeded(
            &[(
                "This quarterly report was written by John Smith and reviewed by Jane Doe.",
                json!({"documentId": "doc-x"}),
            )],
            true,
        )
        .await;
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer =
            synthesizer(store, registry, ScriptedChat::failing(Arc::clone(&calls)));

        let answer = synthesizer.answer("doc-x", "who wrote this", 5).await;

        assert!(answer.answer.contains("John Smith"));
        assert!(answer.answer.contains("Jane Doe"));
        // One failed attempt, then extraction without further calls.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn unknown_document_gets_polite_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer = synthesizer(
            InMemoryChunkStore::new(),
            InMemoryRegistry::new(),
            ScriptedChat::answering("unused", Arc::clone(&calls)),
        );

        let answer = synthesizer.answer("ghost", "anything", 5).await;

        assert_eq!(answer.answer, NOT_FOUND_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unprocessed_document_gets_process_first_answer() {
        let (store, registry) = seeded(&[], false).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer = synthesizer(
            store,
            registry,
            ScriptedChat::answering("unused", Arc::clone(&calls)),
        );

        let answer = synthesizer.answer("doc-x", "anything", 5).await;
        assert_eq!(answer.answer, NOT_PROCESSED_ANSWER);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn empty_document_reports_no_relevant_information() {
        let (store, registry) = seeded(&[], true).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer = synthesizer(
            store,
            registry,
            ScriptedChat::answering("unused", Arc::clone(&calls)),
        );

        let answer = synthesizer.answer("doc-x", "what is the total", 5).await;

        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loose_metadata_match_rescues_badly_tagged_rows() {
        // Stringified metadata: both retrieval tiers miss it, the
        // serialized-substring query does not.
        let (store, registry) = seeded(
            &[(
                "invoice total $500",
                Value::String(r#"{"documentId": "doc-x"}"#.to_string()),
            )],
            true,
        )
        .await;
        let calls = Arc::new(AtomicUsize::new(0));
        let retriever = RelevanceRetriever::new(
            store.clone(),
            registry.clone(),
            Arc::new(EmbeddingProvider::with_strategies(4, Vec::new())),
            &config(),
        );
        let synthesizer = AnswerSynthesizer::new(
            retriever,
            store,
            registry,
            ScriptedChat::answering("The total is $500.", Arc::clone(&calls)),
            &config(),
        );

        let answer = synthesizer.answer("doc-x", "what is the total", 5).await;

        assert_eq!(answer.answer, "The total is $500.");
        assert_eq!(answer.sources.len(), 1);
    }

    #[test]
    fn what_heuristic_extracts_long_sentences() {
        let sources = vec![ChunkMatch {
            content: "Short. This document describes the quarterly invoice process. Tiny."
                .to_string(),
            metadata: json!({}),
        }];

        let answer = heuristic_answer("what is this about", &sources);
        assert!(answer.contains("quarterly invoice process"));
        assert!(!answer.contains("Tiny"));
    }

    #[test]
    fn when_heuristic_finds_dates_and_years() {
        let sources = vec![ChunkMatch {
            content: "Signed on 12/03/2021, effective from 2022, until 2022.".to_string(),
            metadata: json!({}),
        }];

        let answer = heuristic_answer("when was it signed", &sources);
        assert!(answer.contains("12/03/2021"));
        assert!(answer.contains("2022"));
        assert_eq!(answer.matches("2022").count(), 1);
    }

    #[test]
    fn where_heuristic_uses_gazetteer_suffixes() {
        let sources = vec![ChunkMatch {
            content: "The office sits in Hamburg City near the Altona District.".to_string(),
            metadata: json!({}),
        }];

        let answer = heuristic_answer("where is the office", &sources);
        assert!(answer.contains("Hamburg City"));
        assert!(answer.contains("Altona District"));
    }

    #[test]
    fn unkeyed_question_summarizes_or_echoes_first_chunk() {
        let sources = vec![ChunkMatch {
            content: "tiny".to_string(),
            metadata: json!({}),
        }];

        assert_eq!(heuristic_answer("summarize", &sources), "tiny");
        assert_eq!(heuristic_answer("summarize", &[]), NO_INFORMATION_ANSWER);
    }
}
