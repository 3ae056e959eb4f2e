//! Token-budgeted text chunker with heading association.
//!
//! Splits a document's cleaned body into overlapping [`Chunk`]s that target
//! the configured token budget, carrying the nearest preceding heading as
//! section metadata. Splitting occurs on paragraph boundaries (`\n\n`) to
//! preserve semantic coherence within each chunk.
//!
//! # Algorithm
//!
//! 1. Extract headings from the *original* body, then clean the markdown.
//!    Cleaning invalidates original offsets, so each heading is re-located
//!    inside the cleaned text by three escalating string-match strategies.
//! 2. Walk paragraphs in order, tracking the current section: a paragraph
//!    that carries a heading's title switches to that heading, otherwise the
//!    nearest located heading at or before the running position applies.
//! 3. Accumulate paragraphs into a buffer. When adding a paragraph would
//!    exceed `max_tokens` and the buffer already meets `min_tokens`, close
//!    the chunk and reseed with the trailing overlap plus the paragraph.
//!    An undersized buffer keeps growing instead (an oversized chunk beats
//!    an undersized one). Whenever the buffer lands inside the budget after
//!    an addition, close proactively: many right-sized chunks over few
//!    oversized ones.
//! 4. Flush the tail: emit it if it meets the minimum (or nothing has been
//!    emitted yet), otherwise merge it into the previous chunk.
//!
//! Token counts are estimated at 4 characters per token.

use std::collections::BTreeMap;

use crate::config::ChunkingConfig;
use crate::markdown::{clean_markdown, extract_headings};
use crate::models::{Chunk, ChunkMetadata, Document, Heading};

/// Approximate characters-per-token ratio for English text.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a text span.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Chunk one document, producing chunks with contiguous indices starting at
/// 0 and ids of the form `{slug}-chunk-{index}`.
///
/// A document with no extractable headings chunks normally with no section
/// association; a document shorter than `min_tokens` yields a single
/// undersized chunk.
pub fn chunk_document(doc: &Document, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let headings = extract_headings(&doc.body);
    let cleaned = clean_markdown(&doc.body);
    let located = locate_headings(&cleaned, &headings);

    let paragraphs: Vec<&str> = cleaned
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    struct Piece {
        text: String,
        section: Option<(String, String)>,
    }

    let mut pieces: Vec<Piece> = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;
    // Running byte position in the cleaned text, for heading tracking.
    let mut position = 0usize;
    let mut section: Option<(String, String)> = None;

    for para in &paragraphs {
        let para_tokens = estimate_tokens(para);

        if let Some(heading) = heading_in_paragraph(para, &headings) {
            section = Some((heading.id.clone(), heading.title.clone()));
        } else if let Some((_, heading)) = located.range(..=position).next_back() {
            section = Some((heading.id.clone(), heading.title.clone()));
        }

        if buf_tokens + para_tokens > cfg.max_tokens && !buf.is_empty() {
            if buf_tokens >= cfg.min_tokens {
                pieces.push(Piece {
                    text: buf.trim().to_string(),
                    section: section.clone(),
                });
                let overlap = overlap_text(&buf, cfg.overlap_tokens);
                buf = if overlap.is_empty() {
                    para.to_string()
                } else {
                    format!("{overlap}\n\n{para}")
                };
                buf_tokens = estimate_tokens(&buf);
            } else {
                buf.push_str("\n\n");
                buf.push_str(para);
                buf_tokens += para_tokens;
            }
        } else if buf.is_empty() {
            buf.push_str(para);
            buf_tokens += para_tokens;
        } else {
            buf.push_str("\n\n");
            buf.push_str(para);
            buf_tokens += para_tokens;
        }
        position += para.len() + 2;

        if buf_tokens >= cfg.min_tokens && buf_tokens <= cfg.max_tokens {
            pieces.push(Piece {
                text: buf.trim().to_string(),
                section: section.clone(),
            });
            buf = overlap_text(&buf, cfg.overlap_tokens);
            buf_tokens = estimate_tokens(&buf);
        }
    }

    if !buf.trim().is_empty() {
        if estimate_tokens(buf.trim()) >= cfg.min_tokens || pieces.is_empty() {
            pieces.push(Piece {
                text: buf.trim().to_string(),
                section: section.clone(),
            });
        } else if let Some(last) = pieces.last_mut() {
            last.text.push_str("\n\n");
            last.text.push_str(buf.trim());
        }
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            text: piece.text,
            metadata: ChunkMetadata {
                chunk_id: format!("{}-chunk-{}", doc.slug, i),
                post_url: doc.url.clone(),
                post_title: doc.title.clone(),
                post_slug: doc.slug.clone(),
                post_date: doc.date,
                post_tags: doc.tags.clone(),
                chunk_index: i,
                total_chunks: total,
                section_id: piece.section.as_ref().map(|(id, _)| id.clone()),
                section_title: piece.section.as_ref().map(|(_, title)| title.clone()),
            },
        })
        .collect()
}

/// Re-locate headings inside the cleaned text.
///
/// Three escalating strategies: exact lowercased substring; match with
/// non-word characters stripped from both sides (position mapped back);
/// match on the first 1-3 significant words of the title as a phrase.
/// Headings that cannot be located are dropped from position tracking.
/// Headings that locate to the same position overwrite each other
/// (last write wins).
fn locate_headings<'a>(cleaned: &str, headings: &'a [Heading]) -> BTreeMap<usize, &'a Heading> {
    let cleaned_lower = cleaned.to_lowercase();
    let mut located = BTreeMap::new();

    for heading in headings {
        let title_lower = heading.title.trim().to_lowercase();
        if title_lower.is_empty() {
            continue;
        }

        if let Some(pos) = cleaned_lower.find(&title_lower) {
            located.insert(pos, heading);
            continue;
        }

        if let Some(pos) = find_normalized(&cleaned_lower, &title_lower) {
            located.insert(pos, heading);
            continue;
        }

        let words: Vec<&str> = title_lower
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .collect();
        if !words.is_empty() {
            let phrase = words[..words.len().min(3)].join(" ");
            if let Some(pos) = cleaned_lower.find(&phrase) {
                located.insert(pos, heading);
            }
        }
    }

    located
}

/// Strategy 2: strip non-word characters from both the heading and the text,
/// search in the stripped text, then map the match back to a byte offset in
/// the unstripped text.
fn find_normalized(cleaned_lower: &str, title_lower: &str) -> Option<usize> {
    fn keep(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c.is_whitespace() || c == '-'
    }

    let norm_title: String = title_lower.chars().filter(|&c| keep(c)).collect();
    if norm_title.trim().is_empty() {
        return None;
    }
    let norm_cleaned: String = cleaned_lower.chars().filter(|&c| keep(c)).collect();
    let target = norm_cleaned.find(&norm_title)?;

    let mut kept = 0usize;
    for (i, c) in cleaned_lower.char_indices() {
        if keep(c) {
            if kept == target {
                return Some(i);
            }
            kept += c.len_utf8();
        }
    }
    None
}

/// Check whether a paragraph carries a heading's title as its own line,
/// which happens when the heading text survives cleaning as plain text.
fn heading_in_paragraph<'a>(para: &str, headings: &'a [Heading]) -> Option<&'a Heading> {
    let para_lower = para.to_lowercase();
    headings.iter().find(|heading| {
        let title = heading.title.trim().to_lowercase();
        if title.is_empty() {
            return false;
        }
        para_lower == title
            || para_lower.starts_with(&format!("{title}\n"))
            || para_lower.starts_with(&format!("{title} "))
            || para_lower.contains(&format!("\n{title}\n"))
            || para_lower.ends_with(&format!("\n{title}"))
    })
}

/// Trailing ~`overlap_tokens` of a closed chunk, to seed the next one.
///
/// Cut at the last sentence or line boundary before the overlap window so
/// the next chunk does not open mid-sentence; with no such boundary, cut on
/// whitespace. Cuts always land on UTF-8 character boundaries.
fn overlap_text(text: &str, overlap_tokens: usize) -> String {
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;
    if text.len() <= overlap_chars {
        return text.trim().to_string();
    }

    let window_start = snap_to_char_boundary(text, text.len() - overlap_chars);
    let head = &text[..window_start];

    let boundary = head.rfind('.').max(head.rfind('\n'));
    if let Some(b) = boundary {
        if b > 0 {
            return text[b + 1..].trim().to_string();
        }
    }

    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(window_start);
    text[start..].trim().to_string()
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
