//! Hierarchical chunking of KB entries.
//!
//! Split order is the contract: whole text → paragraphs → sentences → words.
//! A single word over the budget is emitted as-is; oversize beats mid-word
//! truncation. Each emitted chunk carries a `[category — title]` prefix so
//! the embedding captures where the text came from.

use std::sync::LazyLock;

use regex::Regex;

static PARAGRAPH_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// A chunk candidate produced from one KB entry, not yet embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateChunk {
    pub entry_id: i64,
    pub index: i64,
    pub text: String,
    pub category: String,
    pub title: String,
}

/// Conservative token estimate. Hebrew and Arabic pack ~3 characters per
/// token with common embedding tokenizers, Latin ~4. Exactness doesn't
/// matter — only that we never badly underestimate.
pub fn estimate_tokens(text: &str) -> usize {
    let mut dense = 0usize; // Hebrew / Arabic
    let mut other = 0usize;
    for ch in text.chars() {
        if ch.is_whitespace() {
            continue;
        }
        let c = ch as u32;
        // Hebrew: U+0590..U+05FF, Arabic: U+0600..U+06FF (plus presentation forms).
        if (0x0590..=0x06FF).contains(&c) || (0xFB1D..=0xFDFF).contains(&c) {
            dense += 1;
        } else {
            other += 1;
        }
    }
    dense.div_ceil(3) + other.div_ceil(4)
}

/// Split `text` into chunks each estimated under `max_tokens`.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if estimate_tokens(trimmed) <= max_tokens {
        return vec![trimmed.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in PARAGRAPH_SPLIT.split(trimmed) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        if fits(&current, para, "\n\n", max_tokens) {
            push_piece(&mut current, para, "\n\n");
            continue;
        }

        flush(&mut chunks, &mut current);

        if estimate_tokens(para) <= max_tokens {
            current = para.to_string();
            continue;
        }

        // Paragraph alone is over budget — descend to sentences.
        for sentence in split_sentences(para) {
            if fits(&current, &sentence, " ", max_tokens) {
                push_piece(&mut current, &sentence, " ");
                continue;
            }
            flush(&mut chunks, &mut current);

            if estimate_tokens(&sentence) <= max_tokens {
                current = sentence;
                continue;
            }

            // Sentence alone is over budget — descend to words.
            for word in sentence.split_whitespace() {
                if fits(&current, word, " ", max_tokens) {
                    push_piece(&mut current, word, " ");
                } else {
                    flush(&mut chunks, &mut current);
                    // An oversize single word becomes its own chunk.
                    current = word.to_string();
                }
            }
        }
    }

    flush(&mut chunks, &mut current);
    chunks
}

/// Chunk one entry's content and prefix every chunk with its origin.
pub fn chunks_for_entry(
    entry_id: i64,
    category: &str,
    title: &str,
    content: &str,
    max_tokens: usize,
) -> Vec<CandidateChunk> {
    chunk_text(content, max_tokens)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| CandidateChunk {
            entry_id,
            index: i as i64,
            text: format!("[{category} — {title}]\n{chunk}"),
            category: category.to_string(),
            title: title.to_string(),
        })
        .collect()
}

fn fits(current: &str, addition: &str, sep: &str, max_tokens: usize) -> bool {
    let combined_len = if current.is_empty() {
        estimate_tokens(addition)
    } else {
        estimate_tokens(current) + estimate_tokens(sep) + estimate_tokens(addition)
    };
    combined_len <= max_tokens
}

fn push_piece(current: &mut String, piece: &str, sep: &str) {
    if !current.is_empty() {
        current.push_str(sep);
    }
    current.push_str(piece);
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

/// Split on `.`, `!`, `?` followed by whitespace, keeping the terminator.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (i, &(pos, ch)) in chars.iter().enumerate() {
        if matches!(ch, '.' | '!' | '?') {
            let next_is_ws = chars
                .get(i + 1)
                .map(|&(_, next)| next.is_whitespace())
                .unwrap_or(true);
            if next_is_ws {
                let end = pos + ch.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence.to_string());
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}
