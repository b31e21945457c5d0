//! Per-submitter aggregation of SPU scores.

use std::collections::HashMap;

use serde::Serialize;

use crate::dto::StoredCertificate;

/// `total * (1 + 0.1 * ln(1 + count))`. Rewards volume with diminishing returns.
pub fn log_damped(total: f64, count: usize) -> f64 {
    total * (1.0 + 0.1 * (1.0 + count as f64).ln())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub submitter_id: String,
    pub submitter_name: String,
    pub student_number: String,
    pub total_spu: f64,
    pub certificate_count: usize,
    pub weighted_score: f64,
    pub avg_score: f64,
}

/// Sums SPU per submitter and orders by the log-damped total.
///
/// Submitters appear in first-seen order before sorting and the sort is
/// stable, so ties keep input order.
pub fn aggregate(rows: &[StoredCertificate], limit: usize) -> Vec<LeaderboardEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<LeaderboardEntry> = Vec::new();

    for row in rows {
        let sid = row.record.submitter_id.as_str();
        let slot = *index.entry(sid).or_insert_with(|| {
            entries.push(LeaderboardEntry {
                rank: 0,
                submitter_id: sid.to_string(),
                submitter_name: row.submitter_name(),
                student_number: row.student_number(),
                total_spu: 0.0,
                certificate_count: 0,
                weighted_score: 0.0,
                avg_score: 0.0,
            });
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        entry.total_spu += row.record.spu_score();
        entry.certificate_count += 1;
    }

    for e in &mut entries {
        e.weighted_score = log_damped(e.total_spu, e.certificate_count);
        e.avg_score = if e.certificate_count > 0 {
            e.weighted_score / e.certificate_count as f64
        } else {
            0.0
        };
    }

    entries.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
    entries.truncate(limit);
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i + 1;
    }
    entries
}
