//! SPU ("achievement") score: a bounded `[0, 1]` blend of rank, level and
//! category ordinals, scaled by extraction confidence with a small bonus for
//! technical domains.

use crate::dto::{Normalized, ParsedFields};

pub const RANK_WEIGHT: f64 = 0.40;
pub const LEVEL_WEIGHT: f64 = 0.35;
pub const CATEGORY_WEIGHT: f64 = 0.15;
pub const DOMAIN_BONUS: f64 = 0.05;

const BONUS_DOMAINS: [&str; 4] = ["ai", "teknologi", "sains", "engineering"];

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Confidence outside `[0, 1]` is clamped; non-finite values count as zero.
pub fn confidence_factor(confidence: f64) -> f64 {
    let c = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    0.9 + 0.2 * c
}

pub fn domain_bonus(domain: &str) -> f64 {
    let d = domain.trim().to_lowercase();
    if BONUS_DOMAINS.contains(&d.as_str()) {
        DOMAIN_BONUS
    } else {
        0.0
    }
}

pub fn base_score(n: &Normalized) -> f64 {
    (f64::from(n.rank_norm) / 5.0) * RANK_WEIGHT
        + (f64::from(n.level_norm) / 5.0) * LEVEL_WEIGHT
        + (f64::from(n.category_norm) / 2.0) * CATEGORY_WEIGHT
}

/// `min(base * confidence_factor + domain_bonus, 1.0)`, rounded to four decimals.
pub fn compute_score(normalized: &Normalized, parsed: &ParsedFields) -> f64 {
    let score = base_score(normalized) * confidence_factor(parsed.confidence)
        + domain_bonus(&parsed.domain_raw);
    round4(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(rank: u8, level: u8, category: u8) -> Normalized {
        Normalized {
            rank_norm: rank,
            level_norm: level,
            category_norm: category,
        }
    }

    fn parsed(confidence: f64, domain: &str) -> ParsedFields {
        let mut p = ParsedFields::unknown(confidence);
        p.domain_raw = domain.into();
        p
    }

    #[test]
    fn top_certificate_clamps_to_one() {
        assert_eq!(compute_score(&n(5, 5, 2), &parsed(1.0, "ai")), 1.0);
    }

    #[test]
    fn known_value() {
        // base = 0.4*0.6 + 0.35*0.8 + 0.15*0.5 = 0.595; factor = 1.0
        assert_eq!(compute_score(&n(3, 4, 1), &parsed(0.5, "Bisnis")), 0.595);
        assert_eq!(compute_score(&n(3, 4, 1), &parsed(0.5, "Sains")), 0.645);
    }

    #[test]
    fn domain_bonus_is_case_insensitive_exact_match() {
        assert_eq!(domain_bonus("AI"), DOMAIN_BONUS);
        assert_eq!(domain_bonus("Teknologi"), DOMAIN_BONUS);
        assert_eq!(domain_bonus("Teknologi Informasi"), 0.0);
    }

    #[test]
    fn bounded_for_all_ordinals_and_confidences() {
        for r in 1..=5 {
            for l in 1..=5 {
                for c in 1..=2 {
                    for conf in [0.0, 0.3, 0.7, 1.0] {
                        let s = compute_score(&n(r, l, c), &parsed(conf, "ai"));
                        assert!((0.0..=1.0).contains(&s));
                    }
                }
            }
        }
    }

    #[test]
    fn monotonic_in_each_input() {
        let p = parsed(0.6, "Bisnis");
        for r in 1..5 {
            assert!(compute_score(&n(r + 1, 3, 1), &p) >= compute_score(&n(r, 3, 1), &p));
        }
        for l in 1..5 {
            assert!(compute_score(&n(3, l + 1, 1), &p) >= compute_score(&n(3, l, 1), &p));
        }
        assert!(compute_score(&n(3, 3, 2), &p) >= compute_score(&n(3, 3, 1), &p));
        let mut prev = 0.0;
        for step in 0..=10 {
            let s = compute_score(&n(3, 3, 1), &parsed(step as f64 / 10.0, "Bisnis"));
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn malformed_confidence_is_safe() {
        let s = compute_score(&n(5, 5, 2), &parsed(f64::NAN, "Bisnis"));
        assert_eq!(s, 0.9);
    }
}
