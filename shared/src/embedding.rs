//! Text embeddings for semantic search.
//!
//! [`OpenAiEmbedder`] talks to an OpenAI-compatible `/v1/embeddings` endpoint.
//! Without a configured model the pipeline runs with [`NoEmbeddings`] and
//! search degrades to text matching.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::header;
use async_trait::async_trait;
use awc::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{AppError, Result};

#[async_trait(?Send)]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed-length vector for `text`; fails with [`AppError::EmbeddingUnavailable`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Picks the provider described by the settings.
pub fn from_settings(settings: &Settings) -> Arc<dyn EmbeddingProvider> {
    if settings.embedding_model.is_empty() || settings.embedding_key().is_empty() {
        warn!("EMBEDDING_MODEL or key not set; semantic search disabled");
        return Arc::new(NoEmbeddings);
    }
    Arc::new(OpenAiEmbedder {
        api_base: settings.embedding_api_base.trim_end_matches('/').to_string(),
        api_key: settings.embedding_key().to_string(),
        model: settings.embedding_model.clone(),
        timeout: settings.llm_timeout(),
    })
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

fn unavailable(e: impl std::fmt::Display) -> AppError {
    AppError::EmbeddingUnavailable(e.to_string())
}

#[async_trait(?Send)]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = Client::builder().timeout(self.timeout).finish();
        let url = format!("{}/v1/embeddings", self.api_base);
        let mut res = client
            .post(url)
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", self.api_key)))
            .send_json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .await
            .map_err(unavailable)?;

        if !res.status().is_success() {
            return Err(unavailable(format!("http status {}", res.status().as_u16())));
        }

        let body = res
            .json::<EmbeddingResponse>()
            .limit(16 * 1024 * 1024)
            .await
            .map_err(unavailable)?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| unavailable("empty embedding response"))?;
        debug!(dims = vector.len(), "embedding received");
        Ok(vector)
    }
}

/// Provider used when embeddings are switched off; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEmbeddings;

#[async_trait(?Send)]
impl EmbeddingProvider for NoEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingUnavailable("embeddings disabled".into()))
    }
}
