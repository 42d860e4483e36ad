//! Sliding-window chunker (§4.10, §3 invariant "chunks are 100-500 words
//! with overlap"), adapted from `processing/chunker.rs`'s byte-offset
//! sentence-boundary-snapping window: same "slide, then snap the window's
//! end to the nearest sentence/paragraph/line/word boundary" shape, but
//! sized in words instead of bytes so the configured
//! `chunk_size_words`/`chunk_overlap_words` map directly onto window width.

#[derive(Debug, Clone)]
pub struct ChunkSpan {
    pub index: usize,
    pub text: String,
    pub byte_start: usize,
    pub byte_end: usize,
}

pub struct Chunker {
    chunk_size_words: usize,
    chunk_overlap_words: usize,
    min_chunk_size_words: usize,
}

impl Chunker {
    pub fn new(chunk_size_words: usize, chunk_overlap_words: usize, min_chunk_size_words: usize) -> Self {
        Self {
            chunk_size_words,
            chunk_overlap_words,
            min_chunk_size_words,
        }
    }

    /// Byte offset + length of every whitespace-delimited word in `text`,
    /// in order. Used as the unit the sliding window counts over.
    fn word_spans(text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start: Option<usize> = None;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some(s) = start.take() {
                    spans.push((s, i));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            spans.push((s, text.len()));
        }
        spans
    }

    pub fn chunk(&self, text: &str) -> Vec<ChunkSpan> {
        let words = Self::word_spans(text);
        if words.len() < self.min_chunk_size_words {
            return Vec::new();
        }

        if words.len() <= self.chunk_size_words {
            return vec![ChunkSpan {
                index: 0,
                text: text.to_string(),
                byte_start: 0,
                byte_end: text.len(),
            }];
        }

        let mut spans = Vec::new();
        let mut index = 0;
        let mut word_cursor = 0;
        let step = self.chunk_size_words.saturating_sub(self.chunk_overlap_words).max(1);

        while word_cursor < words.len() {
            let window_end_word = (word_cursor + self.chunk_size_words).min(words.len());
            let raw_byte_end = words[window_end_word - 1].1;
            let byte_end = if window_end_word < words.len() {
                self.snap_to_boundary(text, raw_byte_end)
            } else {
                raw_byte_end
            };
            let byte_start = words[word_cursor].0;

            if byte_end > byte_start {
                let chunk_text = &text[byte_start..byte_end];
                if chunk_text.split_whitespace().count() >= self.min_chunk_size_words || window_end_word == words.len() {
                    spans.push(ChunkSpan {
                        index,
                        text: chunk_text.to_string(),
                        byte_start,
                        byte_end,
                    });
                    index += 1;
                }
            }

            if window_end_word >= words.len() {
                break;
            }
            word_cursor += step;
        }

        spans
    }

    /// Snap a raw end-of-window byte offset to the nearest sentence,
    /// paragraph, or word boundary within the next 100 bytes, mirroring
    /// `processing/chunker.rs::find_break_point`'s priority order.
    fn snap_to_boundary(&self, text: &str, raw_end: usize) -> usize {
        let search_end = (raw_end + 100).min(text.len());
        let region = &text[raw_end..search_end];

        if let Some(pos) = region.find("\n\n") {
            return raw_end + pos + 2;
        }
        if let Some(pos) = region.find(". ") {
            return raw_end + pos + 2;
        }
        if let Some(pos) = region.find('\n') {
            return raw_end + pos + 1;
        }
        raw_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_below_minimum_yields_no_chunks() {
        let chunker = Chunker::new(300, 50, 100);
        let spans = chunker.chunk("too short");
        assert!(spans.is_empty());
    }

    #[test]
    fn short_text_above_minimum_yields_one_chunk() {
        let chunker = Chunker::new(300, 50, 5);
        let spans = chunker.chunk("one two three four five six seven");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].index, 0);
    }

    #[test]
    fn long_text_produces_overlapping_windows() {
        let words: Vec<String> = (0..1000).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let chunker = Chunker::new(300, 50, 100);
        let spans = chunker.chunk(&text);
        assert!(spans.len() > 1);
        for span in &spans {
            assert!(span.byte_end > span.byte_start);
            assert_eq!(&text[span.byte_start..span.byte_end], span.text);
        }
    }

    #[test]
    fn windows_respect_configured_word_count_bounds() {
        let words: Vec<String> = (0..800).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let chunker = Chunker::new(200, 20, 50);
        let spans = chunker.chunk(&text);
        for span in &spans[..spans.len() - 1] {
            let word_count = span.text.split_whitespace().count();
            assert!(word_count <= 250, "chunk had {word_count} words");
        }
    }
}
