//! Recursive character splitter.
//!
//! Text is split on the first separator present (`"\n\n"`, `"\n"`, `" "`,
//! then single characters), pieces shorter than `chunk_size` are merged
//! greedily, and longer pieces are split again with the next separator.
//! When a chunk closes, the next one starts with trailing pieces totalling
//! at most `overlap` characters. All lengths are in characters.

use std::collections::{HashMap, VecDeque};

use tracing::debug;
use uuid::Uuid;

use crate::errors::RagError;
use crate::record::{Chunk, Document};
use crate::tokens::TokenCounter;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits `documents` into chunks, preserving document and in-document order.
///
/// `Chunk::index` counts per source, so documents sharing a source (CSV rows,
/// PDF pages) continue one numbering.
///
/// # Errors
/// [`RagError::Config`] when `chunk_size == 0` or `overlap >= chunk_size`.
pub fn split(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
    counter: &dyn TokenCounter,
) -> Result<Vec<Chunk>, RagError> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be > 0".into()));
    }
    if overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let mut out = Vec::new();
    let mut next_index: HashMap<&str, usize> = HashMap::new();
    for doc in documents {
        let pieces = split_text(&doc.text, chunk_size, overlap, &SEPARATORS);
        debug!(source = %doc.source, chunks = pieces.len(), "document split");
        let counter_for_source = next_index.entry(doc.source.as_str()).or_insert(0);
        for text in pieces {
            let index = *counter_for_source;
            *counter_for_source += 1;
            out.push(Chunk {
                id: chunk_id(&doc.source, index, &text),
                token_count: counter.count(&text),
                source: doc.source.clone(),
                index,
                text,
            });
        }
    }
    Ok(out)
}

/// Deterministic id: the same source, position and text always map to the same UUIDv5.
pub fn chunk_id(source: &str, index: usize, text: &str) -> String {
    let key = format!("{source}#{index}#{text}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_text(text: &str, size: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    // First separator that occurs in the text; "" always matches.
    let (pos, sep) = separators
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
        .map(|(i, s)| (i, *s))
        .unwrap_or((separators.len().saturating_sub(1), ""));
    let rest = separators.get(pos + 1..).unwrap_or(&[]);

    let pieces = split_keeping_separator(text, sep);

    let mut out = Vec::new();
    let mut good: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) < size {
            good.push(piece);
            continue;
        }
        if !good.is_empty() {
            out.extend(merge(&good, size, overlap));
            good.clear();
        }
        if rest.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            out.extend(split_text(piece, size, overlap, rest));
        }
    }
    if !good.is_empty() {
        out.extend(merge(&good, size, overlap));
    }
    out
}

/// Splits after every occurrence of `sep`; `""` splits into characters.
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut result = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find(sep) {
        let end = start + pos + sep.len();
        result.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        result.push(&text[start..]);
    }
    result
}

/// Greedy merge of short pieces into chunks of at most `size` characters,
/// carrying up to `overlap` characters of trailing pieces into the next chunk.
fn merge(pieces: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > size && !current.is_empty() {
            push_joined(&mut out, &current);
            while total > overlap || (total + len > size && total > 0) {
                match current.pop_front() {
                    Some((_, l)) => total -= l,
                    None => break,
                }
            }
        }
        current.push_back((piece, len));
        total += len;
    }
    push_joined(&mut out, &current);
    out
}

fn push_joined(out: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
