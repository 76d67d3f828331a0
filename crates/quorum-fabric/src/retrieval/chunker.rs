//! Boundary-aware document chunking.

use crate::config::ChunkerConfig;
use crate::traits::DocumentChunker;

/// Splits text into chunks, preferring paragraph and sentence boundaries.
///
/// Boundary segments are packed into chunks of roughly `size` characters,
/// carrying the last `overlap` characters forward between consecutive
/// chunks. A segment that exceeds `size` on its own — including text with
/// no usable boundary at all — is re-split with fixed-size windowing.
pub struct BoundaryChunker {
    config: ChunkerConfig,
}

impl BoundaryChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        tracing::info!(
            chunk_size = config.chunk_size,
            chunk_overlap = config.chunk_overlap,
            "chunker initialized"
        );
        Self { config }
    }

    /// Split with the configured defaults.
    pub fn split_default(&self, text: &str) -> Vec<String> {
        self.split(text, self.config.chunk_size, self.config.chunk_overlap)
    }
}

impl Default for BoundaryChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl DocumentChunker for BoundaryChunker {
    fn split(&self, text: &str, size: usize, overlap: usize) -> Vec<String> {
        if text.is_empty() || size == 0 {
            return Vec::new();
        }
        // Overlap must leave room for progress.
        let overlap = overlap.min(size.saturating_sub(1));

        let mut chunks = Vec::new();
        let mut current = String::new();
        // Whether `current` holds more than overlap carried from a flush.
        let mut has_fresh = false;
        for segment in split_segments(text) {
            let seg_len = segment.chars().count();
            if seg_len > size {
                // No usable boundary inside this span — window it.
                if has_fresh && !current.trim().is_empty() {
                    chunks.push(current.trim().to_string());
                }
                tracing::debug!(segment_len = seg_len, "windowing oversized segment");
                chunks.extend(window(&segment, size, overlap));
                current = tail_chars(&segment, overlap);
                has_fresh = false;
                continue;
            }
            if has_fresh && current.chars().count() + seg_len > size {
                chunks.push(current.trim().to_string());
                current = tail_chars(&current, overlap);
            }
            current.push_str(&segment);
            has_fresh = true;
        }
        if has_fresh && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }

        tracing::debug!(chunks = chunks.len(), "split text");
        chunks
    }
}

/// Split after paragraph breaks and after sentence-ending punctuation
/// followed by whitespace, keeping delimiters with the preceding segment.
fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    for c in text.chars() {
        current.push(c);
        let boundary = match (prev, c) {
            (Some('\n'), '\n') => true,
            (Some('.'), w) | (Some('!'), w) | (Some('?'), w) if w.is_whitespace() => true,
            _ => false,
        };
        if boundary {
            segments.push(std::mem::take(&mut current));
            prev = None;
        } else {
            prev = Some(c);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Fixed-size windows over the character sequence.
fn window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// The last `n` characters of a string, on char boundaries.
fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> BoundaryChunker {
        BoundaryChunker::default()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunker().split("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunker().split("One short sentence.", 100, 10);
        assert_eq!(chunks, vec!["One short sentence."]);
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = chunker().split(text, 30, 0);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].starts_with("First sentence"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
    }

    #[test]
    fn splits_on_paragraph_breaks() {
        let text = "Paragraph one line\n\nParagraph two line\n\nParagraph three line";
        let chunks = chunker().split(text, 25, 0);
        assert!(chunks.iter().any(|c| c == "Paragraph two line"));
    }

    #[test]
    fn consecutive_chunks_share_an_overlap() {
        let text = "Alpha sentence content. Beta sentence content. Gamma sentence content.";
        let chunks = chunker().split(text, 30, 10);
        assert!(chunks.len() >= 2);
        // The tail of the first chunk is carried into the second.
        assert!(chunks[1].starts_with("content"));
        assert!(chunks[1].contains("Beta"));
    }

    #[test]
    fn boundary_free_text_falls_back_to_windowing() {
        let text = "x".repeat(250);
        let chunks = chunker().split(&text, 100, 20);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        // Windowed coverage re-reads the overlap regions.
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= 250);
    }

    #[test]
    fn oversized_segment_between_normal_ones_is_windowed() {
        // One boundary-free run sits between two ordinary sentences.
        let long_run = "z".repeat(80);
        let text = format!("Short opening sentence. {long_run}. Short closing sentence.");
        let chunks = chunker().split(&text, 40, 5);

        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert!(chunks.iter().any(|c| c.contains("opening")));
        assert!(chunks.iter().any(|c| c.contains("closing")));
    }

    #[test]
    fn oversized_overlap_is_clamped() {
        let text = "y".repeat(120);
        // overlap >= size would never progress without the clamp.
        let chunks = chunker().split(&text, 50, 50);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn ordering_is_stable() {
        let text = "One one. Two two. Three three. Four four. Five five.";
        let chunks = chunker().split(text, 20, 0);
        let joined = chunks.join(" ");
        let one = joined.find("One").unwrap();
        let five = joined.find("Five").unwrap();
        assert!(one < five);
    }

    #[test]
    fn default_configuration_is_applied() {
        let text = "A sentence. ".repeat(200);
        let chunks = chunker().split_default(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    }
}
