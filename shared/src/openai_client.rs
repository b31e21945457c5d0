use std::time::Duration;

use actix_web::http::header;
use awc::Client;
use openai::chat::{ChatCompletionMessage, ChatCompletionMessageRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Settings;

/// Connection parameters for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_base: settings.llm_api_base.trim_end_matches('/').to_string(),
            api_key: settings.llm_api_key.clone(),
            model: settings.llm_model.clone(),
            temperature: 0.0,
            max_tokens: settings.llm_max_tokens,
            timeout: settings.llm_timeout(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn client(&self) -> Client {
        Client::builder()
            .add_default_header((header::ACCEPT_ENCODING, "br, gzip, deflate"))
            .timeout(self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatCompletionMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub fn msg(role: ChatCompletionMessageRole, txt: &str) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Some(txt.to_string()),
        ..Default::default()
    }
}

/// Send chat messages to the configured endpoint and return the assistant's answer.
///
/// The whole exchange is bounded by `settings.timeout`. Logs status and the
/// first KiB of the raw body.
pub async fn call_openai_chat(
    client: &Client,
    settings: &LlmSettings,
    messages: Vec<ChatCompletionMessage>,
) -> Result<String, PromptError> {
    if !settings.is_configured() {
        return Err(PromptError::NotConfigured);
    }

    let req = ChatRequest {
        model: &settings.model,
        messages: &messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };
    let url = format!("{}/v1/chat/completions", settings.api_base);
    debug!("\u{2192} LLM request: model = {}", req.model);

    let exchange = async {
        let mut res = client
            .post(url)
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", settings.api_key)))
            .send_json(&req)
            .await
            .map_err(|e| {
                error!("network error to LLM backend: {e}");
                PromptError::Network(e.to_string())
            })?;

        let bytes = res
            .body()
            .limit(4 * 1024 * 1024)
            .await
            .map_err(|e| PromptError::Network(e.to_string()))?;
        debug!(
            status = %res.status(),
            "\u{2190} body = {}",
            String::from_utf8_lossy(&bytes[..bytes.len().min(1024)])
        );

        if !res.status().is_success() {
            return Err(PromptError::Http(res.status().as_u16()));
        }

        let chat: ChatResponse = serde_json::from_slice(&bytes).map_err(PromptError::Parse)?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    };

    tokio::time::timeout(settings.timeout, exchange)
        .await
        .map_err(|_| PromptError::Timeout(settings.timeout))?
}

#[derive(thiserror::Error, Debug)]
pub enum PromptError {
    #[error("LLM backend not configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(serde_json::Error),
    #[error("http error: {0}")]
    Http(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
