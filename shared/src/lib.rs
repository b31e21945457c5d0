//! Core of the certificate pipeline, shared by the services: configuration,
//! errors, the record model, text cleaning and fingerprinting, field
//! extraction, normalization and scoring, embeddings, search ranking,
//! leaderboard aggregation and the storage collaborators.

pub mod config;
pub mod db;
pub mod dto;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod extraction;
pub mod json_relaxed;
pub mod leaderboard;
pub mod memory_store;
pub mod normalize;
pub mod ocr;
pub mod openai_client;
pub mod ranking;
pub mod scoring;
pub mod service;
pub mod stats;
pub mod text;
