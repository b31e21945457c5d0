//! Read-side summaries for the staff dashboard and the submitter profile page.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::dto::{Status, StoredCertificate};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub validated: usize,
    pub processed: usize,
    /// Keyed by lower-cased raw level, e.g. `"nasional"`.
    pub level_counts: BTreeMap<String, usize>,
    pub unique_submitters: usize,
    pub certificates_by_faculty: BTreeMap<String, usize>,
    /// Distinct submitters per faculty.
    pub students_by_faculty: BTreeMap<String, usize>,
}

pub fn status_counts(rows: &[StoredCertificate]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    let mut submitters = HashSet::new();
    let mut faculty_submitters: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for row in rows {
        match row.record.status {
            Status::Validated => counts.validated += 1,
            Status::Processed => counts.processed += 1,
        }
        let level = row.record.parsed.level_raw.trim().to_lowercase();
        if !level.is_empty() {
            *counts.level_counts.entry(level).or_default() += 1;
        }
        if let Some(faculty) = row.submitter.as_ref().and_then(|p| p.faculty.as_deref()) {
            *counts
                .certificates_by_faculty
                .entry(faculty.to_string())
                .or_default() += 1;
            faculty_submitters
                .entry(faculty)
                .or_default()
                .insert(row.record.submitter_id.as_str());
        }
        submitters.insert(row.record.submitter_id.as_str());
    }
    counts.unique_submitters = submitters.len();
    counts.students_by_faculty = faculty_submitters
        .into_iter()
        .map(|(faculty, ids)| (faculty.to_string(), ids.len()))
        .collect();
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateSummary {
    pub id: Uuid,
    pub event_name: String,
    pub category_raw: String,
    pub level_raw: String,
    pub rank_raw: String,
    pub domain_raw: String,
    pub date_issued: Option<String>,
    pub status: Status,
    pub spu_score: f64,
}

impl From<&StoredCertificate> for CertificateSummary {
    fn from(row: &StoredCertificate) -> Self {
        let p = &row.record.parsed;
        Self {
            id: row.record.id,
            event_name: p.event_name.clone(),
            category_raw: p.category_raw.clone(),
            level_raw: p.level_raw.clone(),
            rank_raw: p.rank_raw.clone(),
            domain_raw: p.domain_raw.clone(),
            date_issued: p.date_issued.clone(),
            status: row.record.status,
            spu_score: row.record.spu_score(),
        }
    }
}

/// Highest-SPU certificates first; ties keep input order.
pub fn top_certificates(rows: &[StoredCertificate], limit: usize) -> Vec<CertificateSummary> {
    let mut out: Vec<CertificateSummary> = rows.iter().map(CertificateSummary::from).collect();
    out.sort_by(|a, b| b.spu_score.total_cmp(&a.spu_score));
    out.truncate(limit);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitterSummary {
    pub submitter_id: String,
    pub top_certificates: Vec<CertificateSummary>,
    pub academic_count: usize,
    pub non_academic_count: usize,
    pub domain_counts: BTreeMap<String, usize>,
    pub total_certificates: usize,
    /// Mean SPU on a 0-100 scale.
    pub avg_spu: f64,
}

pub const TOP_CERTIFICATES: usize = 3;

/// Summarises one submitter's certificates. Category counts use the
/// snapshot taken at scoring time, so uncompleted records count for neither.
pub fn submitter_summary(submitter_id: &str, rows: &[StoredCertificate]) -> SubmitterSummary {
    let mut academic = 0;
    let mut non_academic = 0;
    let mut domains: BTreeMap<String, usize> = BTreeMap::new();
    let mut spu_total = 0.0;

    for row in rows {
        if let Some(before) = &row.record.before_normalized {
            match before.category_raw.trim().to_lowercase().as_str() {
                "akademik" => academic += 1,
                "non-akademik" => non_academic += 1,
                _ => {}
            }
        }
        let domain = row.record.parsed.domain_raw.trim();
        if !domain.is_empty() {
            *domains.entry(domain.to_string()).or_default() += 1;
        }
        spu_total += row.record.spu_score() * 100.0;
    }

    SubmitterSummary {
        submitter_id: submitter_id.to_string(),
        top_certificates: top_certificates(rows, TOP_CERTIFICATES),
        academic_count: academic,
        non_academic_count: non_academic,
        domain_counts: domains,
        total_certificates: rows.len(),
        avg_spu: if rows.is_empty() {
            0.0
        } else {
            spu_total / rows.len() as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{AfterNormalized, CertificateRecord, ParsedFields, SubmitterProfile};

    fn row(level: &str, category: &str, domain: &str, spu: Option<f64>, status: Status) -> StoredCertificate {
        let mut parsed = ParsedFields::unknown(0.7);
        parsed.level_raw = level.into();
        parsed.category_raw = category.into();
        parsed.domain_raw = domain.into();
        let mut record = CertificateRecord::processed(
            format!("{level}{category}{domain}{spu:?}"),
            "s1".into(),
            None,
            parsed.clone(),
        );
        record.status = status;
        if let Some(spu) = spu {
            record.before_normalized = Some(parsed.categories());
            record.after_normalized = Some(AfterNormalized {
                rank_norm: 1,
                level_norm: 1,
                category_norm: 1,
                spu_score: spu,
            });
        }
        StoredCertificate {
            record,
            submitter: Some(SubmitterProfile {
                id: "s1".into(),
                name: "Budi".into(),
                student_number: None,
                program: None,
                faculty: Some("Teknik".into()),
            }),
        }
    }

    #[test]
    fn counts_status_and_levels() {
        let mut second = row("Kota", "Akademik", "AI", None, Status::Processed);
        second.record.submitter_id = "s2".into();
        let mut elsewhere = row("Kota", "Non-Akademik", "Seni", None, Status::Processed);
        elsewhere.record.submitter_id = "s3".into();
        if let Some(profile) = elsewhere.submitter.as_mut() {
            profile.faculty = Some("Ekonomi".into());
        }
        let mut rows = vec![
            row("Nasional", "Akademik", "AI", Some(0.5), Status::Validated),
            row("nasional", "Akademik", "AI", Some(0.5), Status::Processed),
            row("Internasional", "Akademik", "AI", Some(0.5), Status::Processed),
        ];
        let c = status_counts(&rows);
        assert_eq!(c.validated, 1);
        assert_eq!(c.processed, 2);
        assert_eq!(c.level_counts["nasional"], 2);
        assert_eq!(c.level_counts["internasional"], 1);
        assert_eq!(c.unique_submitters, 1);
        assert_eq!(c.certificates_by_faculty["Teknik"], 3);
        assert_eq!(c.students_by_faculty["Teknik"], 1);

        rows.push(second);
        rows.push(elsewhere);
        let c = status_counts(&rows);
        assert_eq!(c.unique_submitters, 3);
        assert_eq!(c.certificates_by_faculty["Teknik"], 4);
        assert_eq!(c.students_by_faculty["Teknik"], 2);
        assert_eq!(c.students_by_faculty["Ekonomi"], 1);
    }

    #[test]
    fn summary_counts_categories_and_average() {
        let rows = vec![
            row("Nasional", "Akademik", "AI", Some(0.8), Status::Processed),
            row("Kota", "Non-Akademik", "Olahraga", Some(0.4), Status::Validated),
            row("Kota", "Akademik", "AI", None, Status::Processed),
        ];
        let s = submitter_summary("s1", &rows);
        assert_eq!(s.academic_count, 1);
        assert_eq!(s.non_academic_count, 1);
        assert_eq!(s.domain_counts["AI"], 2);
        assert_eq!(s.total_certificates, 3);
        assert!((s.avg_spu - 40.0).abs() < 1e-9);
        assert_eq!(s.top_certificates.len(), 3);
        assert_eq!(s.top_certificates[0].spu_score, 0.8);
    }

    #[test]
    fn empty_summary() {
        let s = submitter_summary("nobody", &[]);
        assert_eq!(s.total_certificates, 0);
        assert_eq!(s.avg_spu, 0.0);
        assert!(s.top_certificates.is_empty());
    }
}
