//! Heading extraction and markdown cleanup.
//!
//! Posts are authored in markdown, so heading positions come from the raw
//! source while chunk text comes from a cleaned rendition with code blocks,
//! link syntax, and emphasis markers stripped. Both passes live here.

use regex::Regex;

use crate::models::Heading;

/// Headings found by the ATX and inline-markup passes within this many bytes
/// of each other, with the same id, are treated as one heading.
const DEDUP_OFFSET_TOLERANCE: usize = 50;

/// Derive an anchor id from a heading title: lowercase, drop non-word
/// characters, turn whitespace runs into single hyphens.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !out.is_empty() {
                pending_hyphen = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Extract headings and their byte offsets from raw body text.
///
/// Two passes: ATX markdown headings (`## Title` or `## Title {#id}`), then
/// a defensive pass over inline `<h2>`/`<h3>` markup in case a post embeds
/// rendered fragments. Results are de-duplicated and sorted by offset.
pub fn extract_headings(text: &str) -> Vec<Heading> {
    let mut headings: Vec<Heading> = Vec::new();

    let atx = Regex::new(r"(?m)^[ \t]*#{2,3}[ \t]+(.+?)(?:[ \t]*\{#([^}]+)\})?[ \t]*$")
        .expect("valid heading regex");
    for caps in atx.captures_iter(text) {
        let whole = caps.get(0).expect("match has a whole capture");
        let title = caps[1].trim().to_string();
        let id = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| slugify(&title));
        headings.push(Heading {
            id,
            title,
            offset: whole.start(),
        });
    }

    let html = Regex::new(r"(?is)<h[23]((?:\s[^>]*)?)>(.+?)</h[23]>").expect("valid heading regex");
    let id_attr = Regex::new(r#"id=["']([^"']+)["']"#).expect("valid attribute regex");
    let tag = Regex::new(r"<[^>]+>").expect("valid tag regex");
    for caps in html.captures_iter(text) {
        let whole = caps.get(0).expect("match has a whole capture");
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let title = tag.replace_all(&caps[2], "").trim().to_string();
        let id = id_attr
            .captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| slugify(&title));

        let duplicate = headings
            .iter()
            .any(|h| h.id == id && h.offset.abs_diff(whole.start()) < DEDUP_OFFSET_TOLERANCE);
        if !duplicate {
            headings.push(Heading {
                id,
                title,
                offset: whole.start(),
            });
        }
    }

    headings.sort_by_key(|h| h.offset);
    headings
}

/// Clean markdown text for chunking.
///
/// Removes fenced code blocks, inline code, and emphasis/heading markers;
/// link syntax collapses to its display text; runs of three or more
/// newlines normalize to a paragraph break. Offsets into the original text
/// are invalid afterwards.
pub fn clean_markdown(text: &str) -> String {
    let fences = Regex::new(r"(?s)```.*?```").expect("valid fence regex");
    let inline_code = Regex::new(r"`[^`]+`").expect("valid code regex");
    let links = Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid link regex");
    let markers = Regex::new(r"[#*_~]").expect("valid marker regex");
    let newlines = Regex::new(r"\n{3,}").expect("valid newline regex");

    let cleaned = fences.replace_all(text, "");
    let cleaned = inline_code.replace_all(&cleaned, "");
    let cleaned = links.replace_all(&cleaned, "$1");
    let cleaned = markers.replace_all(&cleaned, "");
    let cleaned = newlines.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}
