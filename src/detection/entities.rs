use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ExtractedEntities, TextRegion};

static NAME_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:full\s+|employee\s+|customer\s+|applicant\s+|account\s+holder\s+)?name\s*(?:[:\-]\s*(.*))?$")
        .expect("name pattern is valid")
});

static ADDRESS_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:residential\s+|billing\s+|permanent\s+|postal\s+|service\s+)?address\s*(?:[:\-]\s*(.*))?$")
        .expect("address pattern is valid")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{1,2}[/.\-]\d{1,2}[/.\-]\d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+\d{4})\b",
    )
    .expect("date pattern is valid")
});

/// Value of a labelled field: text after the separator on the same line, or
/// the following line when the label stands alone
fn labelled_value(lines: &[&str], pattern: &Regex) -> Option<String> {
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };

        let inline = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|v| !v.is_empty());
        if let Some(value) = inline {
            return Some(value.to_string());
        }

        if let Some(next) = lines.get(idx + 1).map(|l| l.trim()).filter(|l| !l.is_empty()) {
            return Some(next.to_string());
        }
    }
    None
}

/// First date found anywhere in the text
pub fn find_date(text: &str) -> Option<String> {
    DATE.find(text).map(|m| m.as_str().to_string())
}

/// Pull name, address and date out of OCR lines (in reading order)
pub fn extract_entities(regions: &[TextRegion]) -> ExtractedEntities {
    let lines: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();

    ExtractedEntities {
        person_name: labelled_value(&lines, &NAME_FIELD),
        address: labelled_value(&lines, &ADDRESS_FIELD),
        date: find_date(&lines.join("\n")),
    }
}
