use crate::config::RagConfig;
use crate::error::{ChatError, EmbedError};
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

/// Client for an Ollama-compatible model backend. Each endpoint is an
/// independent capability: some deployments carry only a subset, so
/// callers discover what works by trial call rather than configuration.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    embed_model: String,
    chat_model: String,
}

impl OllamaClient {
    pub fn new(config: &RagConfig) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(&config.model_base_url)?;
        Ok(Self {
            client: Client::new(),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    /// POST /api/embed — the current embeddings endpoint.
    pub async fn embed(&self, text: &str) -> Result<Value, EmbedError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({
                "model": self.embed_model,
                "input": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: "ollama/api/embed".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// POST /api/embeddings — the legacy embeddings endpoint.
    pub async fn embeddings_legacy(&self, text: &str) -> Result<Value, EmbedError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({
                "model": self.embed_model,
                "prompt": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: "ollama/api/embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// POST /api/chat with a system and a user message, non-streaming.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({
                "model": self.chat_model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user},
                ],
                "stream": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama/api/chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatError::BackendResponse {
                backend: "ollama/api/chat".to_string(),
                details: "response carried no message content".to_string(),
            })
    }

    /// POST /api/generate — plain completion, non-streaming.
    pub async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.chat_model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama/api/generate".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChatError::BackendResponse {
                backend: "ollama/api/generate".to_string(),
                details: "response carried no completion text".to_string(),
            })
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(
        &self,
        system: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ChatError> {
        let user = format!("Context:\n{context}\n\nQuestion: {question}");
        self.chat(system, &user).await
    }
}
