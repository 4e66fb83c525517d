//! Recursive character splitting.
//!
//! Text is cut on the coarsest separator present (blank line, newline,
//! space, then single characters), pieces that are still too long are cut
//! again with the next separator, and neighbouring pieces are merged back
//! into chunks of at most `chunk_size` characters that share up to
//! `chunk_overlap` characters with the previous chunk.

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("Chunk size must be positive");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &DEFAULT_SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    total -= char_len(window.remove(0));
                }
            }
            window.push(piece);
            total += len;
        }
        push_trimmed(&mut chunks, &window);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &[&str]) {
    let joined = window.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping it at the start of every piece but the first.
/// An empty separator yields single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces: Vec<String> = parts.next().map(String::from).into_iter().collect();
    pieces.extend(parts.map(|part| format!("{}{}", separator, part)));
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        assert_eq!(splitter.split("  KYC rules apply.  "), vec!["KYC rules apply."]);
        assert!(splitter.split("   \n\n ").is_empty());
    }

    #[test]
    fn words_merge_up_to_chunk_size() {
        let splitter = TextSplitter::new(10, 0).unwrap();
        assert_eq!(splitter.split("aaaa bbbb cccc"), vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let splitter = TextSplitter::new(10, 5).unwrap();
        assert_eq!(splitter.split("aaaa bbbb cccc"), vec!["aaaa bbbb", "bbbb cccc"]);
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let splitter = TextSplitter::new(20, 0).unwrap();
        let chunks = splitter.split("first paragraph\n\nsecond paragraph");
        assert_eq!(chunks, vec!["first paragraph", "second paragraph"]);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        assert_eq!(splitter.split("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunks_never_exceed_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = "Customer due diligence applies to every account. ".repeat(20);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(TextSplitter::new(10, 10).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
