//! Chunk splitting for long source texts.
//!
//! A piece ends at the best boundary found in a short lookback window
//! before the hard cutoff, preferring paragraph breaks over sentence ends
//! over plain whitespace. Sizes count chars, so multi-byte text is never cut
//! inside a code point.

use serde::{Deserialize, Serialize};

/// Upper bound on how far back from the hard cutoff a boundary is searched.
pub const LOOKBACK_LIMIT: usize = 200;

/// Default piece size used by the extraction runner.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 3000;

/// A bounded piece of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position among the emitted pieces.
    pub index: usize,
    /// Char offset of the untrimmed piece in the source text.
    pub offset: usize,
    /// Trimmed text.
    pub text: String,
}

/// Split into trimmed pieces of at most `max_size` chars.
pub fn split(text: &str, max_size: usize) -> Vec<String> {
    split_chunks(text, max_size)
        .into_iter()
        .map(|c| c.text)
        .collect()
}

/// Like [`split`], keeping index and offset of each piece.
pub fn split_chunks(text: &str, max_size: usize) -> Vec<Chunk> {
    let max_size = max_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = if chars.len() - start <= max_size {
            chars.len()
        } else {
            find_cut(&chars, start, max_size)
        };
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                offset: start,
                text: trimmed.to_string(),
            });
        }
        start = end;
    }

    if chunks.is_empty() {
        chunks.push(Chunk {
            index: 0,
            offset: 0,
            text: String::new(),
        });
    }
    chunks
}

/// End (exclusive) of the piece starting at `start`; only called when more
/// than `max_size` chars remain.
fn find_cut(chars: &[char], start: usize, max_size: usize) -> usize {
    let hard = start + max_size;
    let lookback = LOOKBACK_LIMIT.min(max_size / 5);
    let window = hard - lookback..hard;

    if lookback > 0 {
        let paragraph = window
            .clone()
            .rev()
            .find(|&i| i + 1 < hard && chars[i] == '\n' && chars[i + 1] == '\n')
            .map(|i| i + 2);
        if let Some(cut) = paragraph {
            return cut;
        }

        let sentence = window
            .clone()
            .rev()
            .find_map(|i| match chars[i] {
                '\n' => Some(i + 1),
                '.' | '!' | '?' if i + 1 < hard && chars[i + 1] == ' ' => Some(i + 2),
                _ => None,
            });
        if let Some(cut) = sentence {
            return cut;
        }

        if let Some(i) = window.clone().rev().find(|&i| chars[i].is_whitespace()) {
            return i + 1;
        }
    }

    // A single word longer than the budget is emitted whole.
    let word_start = (start..hard)
        .find(|&i| !chars[i].is_whitespace())
        .unwrap_or(hard);
    let inside_word = !chars[hard].is_whitespace()
        && word_start < hard
        && chars[word_start..hard].iter().all(|c| !c.is_whitespace());
    if inside_word {
        let mut end = hard;
        while end < chars.len() && !chars[end].is_whitespace() {
            end += 1;
        }
        return end;
    }
    hard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn short_text_is_one_piece() {
        assert_eq!(split("  hello world \n", 100), vec!["hello world"]);
    }

    #[test]
    fn blank_text_yields_one_empty_piece() {
        assert_eq!(split("", 10), vec![String::new()]);
        assert_eq!(split(" \n\t ", 2), vec![String::new()]);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a ".repeat(45), "b ".repeat(45));
        let pieces = split(&text, 100);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].chars().all(|c| c == 'a' || c == ' '));
        assert!(pieces[1].starts_with('b'));
    }

    #[test]
    fn falls_back_to_sentence_end() {
        // The period sits inside the 20-char lookback window.
        let first = format!("{}. ", "x".repeat(88));
        let text = format!("{first}{}", "y".repeat(30));
        let pieces = split(&text, 100);
        assert_eq!(pieces[0], format!("{}.", "x".repeat(88)));
        assert_eq!(pieces[1], "y".repeat(30));
    }

    #[test]
    fn cuts_hard_without_boundaries() {
        let text = format!("word {}", "z".repeat(250));
        let pieces = split(&text, 100);
        // The run does not start the first piece, so it is cut at the limit.
        assert_eq!(pieces[0], format!("word {}", "z".repeat(95)));
        // The rest of it starts the next piece and is kept whole.
        assert_eq!(pieces[1], "z".repeat(155));
    }

    #[test]
    fn oversized_word_is_atomic() {
        let text = format!("{} tail", "q".repeat(30));
        let pieces = split(&text, 10);
        assert_eq!(pieces, vec!["q".repeat(30), "tail".to_string()]);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let text = "Пользователь входит в систему. Система проверяет пароль. ".repeat(20);
        for piece in split(&text, 64) {
            assert!(piece.chars().count() <= 64);
        }
        assert_eq!(squash(&split(&text, 64).concat()), squash(&text));
    }

    #[test]
    fn zero_max_size_acts_as_one() {
        assert_eq!(split("ab", 0), vec!["ab"]);
        assert_eq!(split("a b", 0), vec!["a", "b"]);
    }

    #[test]
    fn chunk_offsets_point_into_source() {
        let text = "first part here.\n\nsecond part here";
        let chunks = split_chunks(text, 20);
        let chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let from: String = chars[chunk.offset..].iter().collect();
            assert!(from.trim_start().starts_with(&chunk.text));
        }
        assert_eq!(chunks.last().unwrap().index, chunks.len() - 1);
    }
}
