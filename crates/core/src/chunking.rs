use crate::error::IngestError;
use crate::models::IngestionOptions;
use crate::traits::TextSplitter;
use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Collapses runs of whitespace inside each line and squeezes blank lines
/// into a single paragraph break.
pub fn normalize_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut blank_lines = 0usize;

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_lines += 1;
            continue;
        }

        if !normalized.is_empty() {
            normalized.push_str(if blank_lines > 0 { "\n\n" } else { "\n" });
        }
        normalized.push_str(&line);
        blank_lines = 0;
    }

    normalized
}

/// Splits text on the coarsest separator that occurs in it, recursing into
/// pieces that are still too long, then greedily merges neighbours back up
/// to `chunk_size` characters with a tail of at most `chunk_overlap`
/// characters carried into the next chunk.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|sep| sep.to_string()).collect(),
        })
    }

    pub fn from_options(options: &IngestionOptions) -> Result<Self, IngestError> {
        Self::new(options.chunk_size, options.chunk_overlap)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator));
        }

        chunks
    }

    fn merge_pieces(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if !current.is_empty() && total + len + separator_len > self.chunk_size {
                push_joined(&mut chunks, &current, separator);

                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + joiner_len(&current, separator_len) > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    let removed = char_len(front) + joiner_len(&current, separator_len);
                    total = total.saturating_sub(removed);
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

impl TextSplitter for RecursiveCharacterSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (position, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[position + 1..]);
        }
    }

    ("", &[])
}

fn push_joined(chunks: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    if current.is_empty() {
        return;
    }

    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn joiner_len(current: &VecDeque<&str>, separator_len: usize) -> usize {
    if current.is_empty() {
        0
    } else {
        separator_len
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized_but_paragraphs_survive() {
        let input = "A  \t  lot\nof   spacing\n\n\n\nNext\u{a0}paragraph";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot\nof spacing\n\nNext paragraph");
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = RecursiveCharacterSplitter::new(1_000, 200).unwrap();
        assert_eq!(splitter.split_text("Hello world"), vec!["Hello world".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let splitter = RecursiveCharacterSplitter::new(100, 10).unwrap();
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let splitter = RecursiveCharacterSplitter::new(20, 0).unwrap();
        let chunks = splitter.split_text("First paragraph.\n\nSecond paragraph.");
        assert_eq!(
            chunks,
            vec!["First paragraph.".to_string(), "Second paragraph.".to_string()]
        );
    }

    #[test]
    fn chunks_respect_size_and_carry_overlap() {
        let text = (0..60)
            .map(|index| format!("word{index}"))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = RecursiveCharacterSplitter::new(40, 10).unwrap();
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk}");
        }

        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            let first_word = pair[1].split(' ').next().unwrap();
            assert_eq!(last_word, first_word);
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveCharacterSplitter::new(10, 0).unwrap();
        let lengths = splitter
            .split_text(&"a".repeat(25))
            .iter()
            .map(|chunk| chunk.len())
            .collect::<Vec<_>>();
        assert_eq!(lengths, vec![10, 10, 5]);
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let splitter = RecursiveCharacterSplitter::new(10, 0).unwrap();
        let chunks = splitter.split_text(&"é".repeat(15));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[1].chars().count(), 5);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            RecursiveCharacterSplitter::new(0, 0),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            RecursiveCharacterSplitter::new(100, 100),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
