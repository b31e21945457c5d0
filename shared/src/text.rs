//! Canonical form of OCR output and the content fingerprint derived from it.
//!
//! The fingerprint is the dedup key: two uploads whose cleaned text is
//! byte-identical map to the same certificate.

use sha2::{Digest, Sha256};

/// Punctuation that survives cleaning next to letters, digits and whitespace.
const KEPT_PUNCTUATION: [char; 5] = ['.', ',', '!', '?', '-'];

/// Clean raw OCR text:
/// - collapse every whitespace run to a single space and trim
/// - drop every character that is not alphanumeric, whitespace or `. , ! ? -`
pub fn clean_text(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut prev_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !prev_space {
                collapsed.push(' ');
                prev_space = true;
            }
        } else {
            collapsed.push(c);
            prev_space = false;
        }
    }
    collapsed
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || KEPT_PUNCTUATION.contains(c))
        .collect()
}

/// SHA-256 of the cleaned text's UTF-8 bytes, as 64 lowercase hex characters.
pub fn fingerprint(cleaned: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cleaned.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(clean_text("  Juara\n\n1 \t Nasional  "), "Juara 1 Nasional");
    }

    #[test]
    fn strips_ocr_artifacts() {
        assert_eq!(clean_text("Sertifikat® «Lomba» #1: AI-Cup, 2024!"), "Sertifikat Lomba 1 AI-Cup, 2024!");
    }

    #[test]
    fn keeps_non_ascii_letters() {
        assert_eq!(clean_text("Médaille d'or"), "Médaille dor");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n\t "), "");
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = fingerprint("Juara 1 Nasional");
        assert_eq!(a, fingerprint("Juara 1 Nasional"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_texts_have_distinct_fingerprints() {
        assert_ne!(fingerprint("Juara 1 Nasional"), fingerprint("Juara 2 Nasional"));
    }

    #[test]
    fn known_digest_of_empty_string() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
