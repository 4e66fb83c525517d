//! Cross-document KYC consistency.
//!
//! Documents submitted by one applicant should agree on who they are and
//! where they live. OCR typos are tolerated through fuzzy matching.

use crate::models::{ExtractedEntities, KycValidation, round_to};

pub const NAME_THRESHOLD: f64 = 0.85;
pub const ADDRESS_THRESHOLD: f64 = 0.75;

/// Lowercase, drop punctuation, collapse whitespace
pub fn normalize(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_alphanumeric() {
            cleaned.extend(c.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// 1.0 for identical strings after normalization, 0.0 for nothing in common
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn person_name(entities: &ExtractedEntities) -> Option<&str> {
    entities.person_name.as_deref()
}

fn address(entities: &ExtractedEntities) -> Option<&str> {
    entities.address.as_deref()
}

struct FieldCheck {
    label: &'static str,
    threshold: f64,
    get: fn(&ExtractedEntities) -> Option<&str>,
}

const FIELDS: [FieldCheck; 2] = [
    FieldCheck {
        label: "Name",
        threshold: NAME_THRESHOLD,
        get: person_name,
    },
    FieldCheck {
        label: "Address",
        threshold: ADDRESS_THRESHOLD,
        get: address,
    },
];

/// Compare every pair of documents on name and address
pub fn cross_validate(documents: &[ExtractedEntities]) -> KycValidation {
    let mut mismatches = Vec::new();
    let mut similarities = Vec::new();

    for i in 0..documents.len() {
        for j in (i + 1)..documents.len() {
            for field in &FIELDS {
                let (Some(a), Some(b)) = ((field.get)(&documents[i]), (field.get)(&documents[j])) else {
                    continue;
                };

                let score = similarity(a, b);
                similarities.push(score);
                if score < field.threshold {
                    mismatches.push(format!(
                        "{} mismatch between Doc {} and Doc {}: '{}' vs '{}' ({:.0}% similar)",
                        field.label,
                        doc_letter(i),
                        doc_letter(j),
                        a,
                        b,
                        score * 100.0
                    ));
                }
            }
        }
    }

    if similarities.is_empty() {
        return KycValidation {
            consistency_score: 0.0,
            is_valid: false,
            mismatches: vec!["No comparable fields (name or address) found across documents".to_string()],
        };
    }

    let mean = similarities.iter().sum::<f64>() / similarities.len() as f64;
    KycValidation {
        consistency_score: round_to(mean * 100.0, 2),
        is_valid: mismatches.is_empty(),
        mismatches,
    }
}

/// "A", "B", ... as used by the dashboard
fn doc_letter(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}
