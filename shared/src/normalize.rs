//! Maps raw categorical certificate fields onto ordinal scales.
//!
//! Matching is case-insensitive and substring based; every function is total
//! and falls back to the lowest ordinal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dto::{Normalized, ParsedFields};

static RANK_SCALE: Lazy<[(Regex, u8); 3]> = Lazy::new(|| {
    [
        (
            Regex::new(r"juara\s*(1|i\b)|1st|first|champion|gold|emas").unwrap(),
            5,
        ),
        (
            Regex::new(r"juara\s*(2|ii\b)|2nd|second|silver|perak").unwrap(),
            4,
        ),
        (
            Regex::new(r"juara\s*(3|iii\b)|3rd|third|bronze|perunggu").unwrap(),
            3,
        ),
    ]
});

/// `5` for first place, `4` second, `3` third, `2` finalist, `1` otherwise.
pub fn norm_rank(rank: &str) -> u8 {
    let s = rank.to_lowercase();
    if let Some((_, ordinal)) = RANK_SCALE.iter().find(|(re, _)| re.is_match(&s)) {
        return *ordinal;
    }
    if s.contains("final") {
        return 2;
    }
    1
}

/// `5` international, `4` national, `3` province, `2` city/regency, `1` otherwise.
pub fn norm_level(level: &str) -> u8 {
    let s = level.to_lowercase();
    if s.contains("internasional") || s.contains("international") {
        5
    } else if s.contains("nasional") {
        4
    } else if s.contains("provinsi") {
        3
    } else if s.contains("kota") || s.contains("kabupaten") {
        2
    } else {
        1
    }
}

/// `2` when the category mentions "akademik" (this includes "Non-Akademik"), `1` otherwise.
pub fn norm_category(category: &str) -> u8 {
    if category.to_lowercase().contains("akademik") {
        2
    } else {
        1
    }
}

pub fn normalize(parsed: &ParsedFields) -> Normalized {
    Normalized {
        rank_norm: norm_rank(&parsed.rank_raw),
        level_norm: norm_level(&parsed.level_raw),
        category_norm: norm_category(&parsed.category_raw),
    }
}
