//! Semantic search over scored certificates, grouped by submitter.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::dto::StoredCertificate;
use crate::leaderboard::log_damped;

/// Similarity assigned to a text-only match.
pub const TEXT_MATCH_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankWeights {
    pub similarity: f64,
    pub spu: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.9,
            spu: 0.1,
        }
    }
}

/// Cosine similarity; `None` for mismatched dimensions, empty or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub submitter_id: String,
    pub event_name: String,
    pub level: String,
    pub domain: String,
    pub category: String,
    pub evidence_url: Option<String>,
    pub has_embedding: bool,
    pub relevance_score: f64,
    pub spu_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchGroup {
    pub submitter_id: String,
    pub submitter_name: String,
    pub student_number: String,
    pub best_score: f64,
    pub weighted_sum: f64,
    pub matches: Vec<SearchHit>,
}

fn text_match(query: &str, candidate: &StoredCertificate) -> bool {
    let p = &candidate.record.parsed;
    [&p.event_name, &p.category_raw, &p.domain_raw]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
}

fn score_candidate(
    query: &str,
    query_embedding: Option<&[f32]>,
    candidate: &StoredCertificate,
    weights: RankWeights,
) -> Option<SearchHit> {
    let record = &candidate.record;
    let semantic = query_embedding
        .zip(record.embedding.as_deref())
        .and_then(|(q, e)| cosine_similarity(q, e));

    let (sim, has_embedding) = match semantic {
        Some(sim) => (sim, true),
        None if text_match(query, candidate) => (TEXT_MATCH_FLOOR, false),
        None => return None,
    };

    let spu = record.spu_score();
    let final_score = weights.similarity * sim + weights.spu * spu;
    let p = &record.parsed;
    Some(SearchHit {
        id: record.id,
        submitter_id: record.submitter_id.clone(),
        event_name: p.event_name.clone(),
        level: p.level_raw.clone(),
        domain: p.domain_raw.clone(),
        category: p.category_raw.clone(),
        evidence_url: record.evidence_url.clone(),
        has_embedding,
        relevance_score: round_to(sim, 4),
        spu_score: round_to(spu, 4),
        final_score: round_to(final_score, 4),
    })
}

/// Ranks `candidates` against `query` and groups the hits by submitter.
///
/// Candidates are compared by cosine similarity when both sides have a
/// vector of the same length; otherwise a case-insensitive substring match on
/// event name, category or domain scores [`TEXT_MATCH_FLOOR`]. Candidates
/// matching neither way are dropped. An empty query yields no groups.
pub fn search(
    query: &str,
    query_embedding: Option<&[f32]>,
    candidates: &[StoredCertificate],
    limit: usize,
    weights: RankWeights,
) -> Vec<SearchGroup> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<SearchGroup> = Vec::new();

    for candidate in candidates {
        let Some(hit) = score_candidate(&query, query_embedding, candidate, weights) else {
            continue;
        };
        let slot = *index
            .entry(hit.submitter_id.clone())
            .or_insert_with(|| {
                groups.push(SearchGroup {
                    submitter_id: hit.submitter_id.clone(),
                    submitter_name: candidate.submitter_name(),
                    student_number: candidate.student_number(),
                    best_score: 0.0,
                    weighted_sum: 0.0,
                    matches: Vec::new(),
                });
                groups.len() - 1
            });
        let group = &mut groups[slot];
        group.weighted_sum += hit.relevance_score * hit.spu_score;
        group.matches.push(hit);
    }

    for g in &mut groups {
        g.best_score = round_to(log_damped(g.weighted_sum, g.matches.len()), 2);
        g.matches
            .sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    }
    groups.sort_by(|a, b| b.best_score.total_cmp(&a.best_score));
    groups.truncate(limit);
    groups
}
