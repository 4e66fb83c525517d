use std::collections::HashMap;

/// Term frequencies of a piece of text
#[derive(Debug, Clone, Default)]
pub struct TermVector {
    counts: HashMap<String, f64>,
    norm: f64,
}

pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

impl TermVector {
    pub fn from_text(text: &str) -> Self {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1.0;
        }
        let norm = counts.values().map(|c| c * c).sum::<f64>().sqrt();
        Self { counts, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn cosine(&self, other: &TermVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.counts.len() <= other.counts.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .counts
            .iter()
            .filter_map(|(term, count)| large.counts.get(term).map(|c| c * count))
            .sum();
        dot / (self.norm * other.norm)
    }
}

/// Indices of the `k` best scoring vectors, best first; ties keep document order
pub fn rank(query: &TermVector, documents: &[TermVector], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| (i, query.cosine(doc)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().take(k).map(|(i, _)| i).collect()
}
