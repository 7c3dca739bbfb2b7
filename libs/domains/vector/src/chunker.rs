//! Splits document text into bounded, optionally overlapping chunks.
//!
//! Windows are measured in characters. A window ends just after its last
//! whitespace so words stay whole; a word longer than the window is cut.
//! Windows holding only whitespace are dropped, so with zero overlap the
//! chunk texts concatenated in sequence order give back the original text up
//! to whitespace.

use crate::error::{VectorError, VectorResult};
use crate::models::{Chunk, Document, Metadata};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Characters repeated from the end of one chunk at the start of the next.
    pub overlap: usize,
}

impl ChunkerConfig {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            overlap: 0,
        }
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn validate(&self) -> VectorResult<()> {
        let mut fields = Vec::new();
        if self.max_chars == 0 {
            fields.push("chunk_size".to_string());
        }
        if self.overlap >= self.max_chars {
            fields.push("chunk_overlap".to_string());
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(VectorError::configuration("chunker", fields))
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> VectorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Lazily chunk `document`. Calling again (or cloning the iterator)
    /// restarts from the beginning and yields the same chunks.
    pub fn chunk<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks {
            document,
            config: self.config,
            pos: 0,
            sequence: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    config: ChunkerConfig,
    /// Byte offset where the next window starts.
    pos: usize,
    sequence: usize,
}

impl<'a> Chunks<'a> {
    /// Byte range `[start, end)` of the next window and where the one after starts.
    fn next_window(&self) -> (usize, usize) {
        let text = self.document.text.as_str();
        let start = self.pos;
        let hard_end = advance_chars(text, start, self.config.max_chars);

        let end = if hard_end == text.len() {
            hard_end
        } else {
            soft_break(text, start, hard_end).unwrap_or(hard_end)
        };

        let next = if end == text.len() || self.config.overlap == 0 {
            end
        } else {
            let back = retreat_chars(text, end, self.config.overlap);
            if back > start { back } else { end }
        };

        (end, next)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let text = self.document.text.as_str();

        while self.pos < text.len() {
            let start = self.pos;
            let (end, next) = self.next_window();
            self.pos = if end == text.len() { text.len() } else { next };

            let slice = &text[start..end];
            if slice.trim().is_empty() {
                continue;
            }

            let sequence = self.sequence;
            self.sequence += 1;

            let mut metadata = Metadata::new();
            metadata.insert("title".to_string(), self.document.id.clone());

            return Some(Chunk {
                id: Chunk::chunk_id(&self.document.id, sequence),
                document_id: self.document.id.clone(),
                text: slice.to_string(),
                sequence,
                source_path: self.document.source_path.clone(),
                metadata,
            });
        }

        None
    }
}

/// Byte offset `n` characters after `from`, or the end of `text`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(offset, _)| from + offset)
        .unwrap_or(text.len())
}

/// Byte offset `n` characters before `to`, or 0.
fn retreat_chars(text: &str, to: usize, n: usize) -> usize {
    text[..to]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}

/// End just after the last whitespace in `[start, hard_end)`, provided the
/// piece before it holds some non-whitespace text.
fn soft_break(text: &str, start: usize, hard_end: usize) -> Option<usize> {
    let window = &text[start..hard_end];
    let (offset, ws) = window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())?;
    let end = start + offset + ws.len_utf8();
    if text[start..end].trim().is_empty() {
        None
    } else {
        Some(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::new(max_chars).with_overlap(overlap)).unwrap()
    }

    fn texts(chunker: &Chunker, text: &str) -> Vec<String> {
        let doc = Document::from_upload("doc.txt", text);
        chunker.chunk(&doc).map(|c| c.text).collect()
    }

    const SAMPLES: [&str; 6] = [
        "The quick brown fox jumps over the lazy dog.",
        "short",
        "a b c d e f g h i j k l m n o p q r s t u v w x y z",
        "Paragraph one.\n\nParagraph two has more words in it.\n",
        "supercalifragilisticexpialidocious is long",
        "naïve café résumé über straße",
    ];

    fn without_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_concatenation_reproduces_text() {
        for size in [16, 100] {
            let chunker = chunker(size, 0);
            for sample in SAMPLES {
                assert_eq!(texts(&chunker, sample).concat(), sample, "size {size}");
            }
        }
    }

    #[test]
    fn test_concatenation_reproduces_text_up_to_whitespace() {
        for size in 1..=20 {
            let chunker = chunker(size, 0);
            for sample in SAMPLES {
                assert_eq!(
                    without_whitespace(&texts(&chunker, sample).concat()),
                    without_whitespace(sample),
                    "size {size}"
                );
            }
        }
    }

    #[test]
    fn test_chunks_respect_max_chars() {
        let chunker = chunker(10, 0);
        for text in texts(&chunker, "lorem ipsum dolor sit amet consectetur adipiscing elit") {
            assert!(text.chars().count() <= 10, "{text:?}");
        }
    }

    #[test]
    fn test_breaks_on_whitespace() {
        let chunker = chunker(12, 0);
        assert_eq!(
            texts(&chunker, "hello world again"),
            vec!["hello world ", "again"]
        );
    }

    #[test]
    fn test_hard_cuts_long_words() {
        let chunker = chunker(4, 0);
        assert_eq!(texts(&chunker, "abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_trailing_content_is_kept() {
        let chunker = chunker(10, 0);
        let chunks = texts(&chunker, "0123456789x");
        assert_eq!(chunks.last().map(String::as_str), Some("x"));
    }

    #[test]
    fn test_empty_and_blank_documents_produce_no_chunks() {
        let chunker = chunker(10, 2);
        assert!(texts(&chunker, "").is_empty());
        assert!(texts(&chunker, "   \n\t  ").is_empty());
    }

    #[test]
    fn test_overlap_repeats_tail_of_previous_chunk() {
        let chunker = chunker(6, 2);
        let chunks = texts(&chunker, "abcdefghijkl");
        assert_eq!(chunks, vec!["abcdef", "efghij", "ijkl"]);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn test_overlap_always_makes_progress() {
        let chunker = chunker(3, 2);
        let chunks = texts(&chunker, "ab cd ef gh ij kl");
        assert!(!chunks.is_empty());
        assert!(chunks.len() < 30);
        assert!(chunks.last().is_some_and(|c| c.ends_with("kl")));
    }

    #[test]
    fn test_chunk_ids_and_sequence() {
        let chunker = chunker(5, 0);
        let doc = Document::from_upload("dir/notes.txt", "one two three");
        let chunks: Vec<_> = chunker.chunk(&doc).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
            assert_eq!(chunk.id, format!("notes.txt:{i}"));
            assert_eq!(chunk.document_id, "notes.txt");
            assert_eq!(chunk.source_path, "dir/notes.txt");
            assert_eq!(chunk.metadata.get("title").map(String::as_str), Some("notes.txt"));
        }
    }

    #[test]
    fn test_iteration_is_restartable_and_deterministic() {
        let chunker = chunker(8, 3);
        let doc = Document::from_upload("a.txt", "deterministic chunking of the same text");
        let iter = chunker.chunk(&doc);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        let third: Vec<_> = chunker.chunk(&doc).collect();
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(Chunker::new(ChunkerConfig::new(0)).is_err());
        let err = Chunker::new(ChunkerConfig::new(10).with_overlap(10)).unwrap_err();
        assert!(matches!(
            err,
            VectorError::Configuration { ref fields, .. } if fields == &vec!["chunk_overlap".to_string()]
        ));
    }
}
