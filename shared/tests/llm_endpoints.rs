use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use openai::chat::ChatCompletionMessageRole;
use serde_json::json;
use shared::dto::{DEFAULT_LLM_CONFIDENCE, DEFAULT_RULE_CONFIDENCE, UNKNOWN};
use shared::embedding::{EmbeddingProvider, OpenAiEmbedder};
use shared::error::AppError;
use shared::extraction::{FieldExtractionStrategy, FieldExtractor, LlmExtraction, RuleExtraction};
use shared::openai_client::{call_openai_chat, msg, LlmSettings, PromptError};

fn llm_settings(base: String, timeout: Duration) -> LlmSettings {
    LlmSettings {
        api_base: base,
        api_key: "test-key".into(),
        model: "llama-test".into(),
        temperature: 0.0,
        max_tokens: 256,
        timeout,
    }
}

fn chat_body(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

fn extractor(base: String, timeout: Duration, fallback: bool) -> FieldExtractor {
    FieldExtractor::new(
        Some(Arc::new(LlmExtraction::new(llm_settings(base, timeout)))),
        fallback.then(|| Arc::new(RuleExtraction) as Arc<dyn FieldExtractionStrategy>),
    )
}

#[actix_web::test]
async fn chat_call_sends_bearer_and_returns_content() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model":"llama-test","temperature":0.0}"#);
            then.status(200).json_body(chat_body("hello"));
        })
        .await;

    let settings = llm_settings(server.base_url(), Duration::from_secs(5));
    let out = call_openai_chat(
        &settings.client(),
        &settings,
        vec![msg(ChatCompletionMessageRole::User, "hi")],
    )
    .await
    .unwrap();
    assert_eq!(out, "hello");
    mock.assert_async().await;
}

#[actix_web::test]
async fn chat_call_reports_http_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("boom");
        })
        .await;

    let settings = llm_settings(server.base_url(), Duration::from_secs(5));
    let err = call_openai_chat(&settings.client(), &settings, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, PromptError::Http(500)));
}

#[actix_web::test]
async fn model_answer_in_code_fence_is_parsed_and_backfilled() {
    let server = MockServer::start_async().await;
    let answer = "```json\n{\"student_name\": \"Siti Aminah\", \"event_name\": \"Lomba Karya Tulis\", \"rank_raw\": \"Juara 2\", \"category_raw\": \"Akademik\", \"domain_raw\": \"Sains\"}\n```";
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(chat_body(answer));
        })
        .await;

    let p = extractor(server.base_url(), Duration::from_secs(5), true)
        .extract("SERTIFIKAT Siti Aminah Juara 2")
        .await
        .unwrap();
    assert_eq!(p.student_name, "Siti Aminah");
    assert_eq!(p.rank_raw, "Juara 2");
    assert_eq!(p.level_raw, UNKNOWN);
    assert_eq!(p.confidence, DEFAULT_LLM_CONFIDENCE);
}

#[actix_web::test]
async fn server_error_routes_to_rule_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503);
        })
        .await;

    let p = extractor(server.base_url(), Duration::from_secs(5), true)
        .extract("Juara 1 Olimpiade Sains Nasional")
        .await
        .unwrap();
    assert_eq!(p.rank_raw, "Juara 1");
    assert_eq!(p.level_raw, "Nasional");
    assert_eq!(p.confidence, DEFAULT_RULE_CONFIDENCE);
}

#[actix_web::test]
async fn unparseable_answer_routes_to_rule_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(chat_body("I cannot help with that"));
        })
        .await;

    let p = extractor(server.base_url(), Duration::from_secs(5), true)
        .extract("Juara 3 International Chess Open")
        .await
        .unwrap();
    assert_eq!(p.rank_raw, "Juara 3");
    assert_eq!(p.level_raw, "Internasional");
}

#[actix_web::test]
async fn timeout_routes_to_rule_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(chat_body("{}"));
        })
        .await;

    let p = extractor(server.base_url(), Duration::from_millis(200), true)
        .extract("Juara 2 Lomba Debat")
        .await
        .unwrap();
    assert_eq!(p.rank_raw, "Juara 2");
    assert_eq!(p.confidence, DEFAULT_RULE_CONFIDENCE);
}

#[actix_web::test]
async fn disabled_fallback_surfaces_extraction_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(502);
        })
        .await;

    let err = extractor(server.base_url(), Duration::from_secs(5), false)
        .extract("Juara 1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExtractionUnavailable(_)));
}

#[actix_web::test]
async fn embedder_returns_first_vector() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .json_body_partial(r#"{"model":"embed-test","input":"Robotics Cup"}"#);
            then.status(200)
                .json_body(json!({"data": [{"embedding": [0.25, 0.5, 1.0]}]}));
        })
        .await;

    let embedder = OpenAiEmbedder {
        api_base: server.base_url(),
        api_key: "k".into(),
        model: "embed-test".into(),
        timeout: Duration::from_secs(5),
    };
    let v = embedder.embed("Robotics Cup").await.unwrap();
    assert_eq!(v, vec![0.25, 0.5, 1.0]);
    mock.assert_async().await;
}

#[actix_web::test]
async fn embedder_failure_is_embedding_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({"data": []}));
        })
        .await;

    let embedder = OpenAiEmbedder {
        api_base: server.base_url(),
        api_key: "k".into(),
        model: "embed-test".into(),
        timeout: Duration::from_secs(5),
    };
    let err = embedder.embed("x").await.unwrap_err();
    assert!(matches!(err, AppError::EmbeddingUnavailable(_)));
}
