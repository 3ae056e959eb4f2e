//! Serializable weighted-field lexical search index.
//!
//! An inverted index over the four chunk fields, serialized inside each
//! index artifact and reconstructed at runtime. Scoring is BM25 per field,
//! multiplied by the field weight, summed per document.
//!
//! The query language is deliberately small: bare terms, quoted phrases,
//! and `field:term` qualifiers. Queries that misuse the syntax (an unknown
//! field name before a colon, an unbalanced quote) are rejected with a
//! [`QueryError`]; callers sanitize user-typed queries first and treat a
//! rejection as retryable, never fatal.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const NUM_FIELDS: usize = 4;

/// Search weight per field, indexed by [`Field::as_index`].
const FIELD_WEIGHTS: [f64; NUM_FIELDS] = [10.0, 5.0, 2.0, 1.0];

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Indexed fields, in descending search weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Chunk body text.
    Text,
    /// Title of the chunk's associated section.
    SectionTitle,
    /// Title of the owning post.
    PostTitle,
    /// The owning post's tags, space-joined.
    PostTags,
}

impl Field {
    fn as_index(self) -> usize {
        match self {
            Field::Text => 0,
            Field::SectionTitle => 1,
            Field::PostTitle => 2,
            Field::PostTags => 3,
        }
    }

    pub fn weight(self) -> f64 {
        FIELD_WEIGHTS[self.as_index()]
    }

    /// Resolve a query qualifier name.
    fn parse(name: &str) -> Option<Field> {
        match name.to_lowercase().as_str() {
            "text" => Some(Field::Text),
            "section" | "sectiontitle" => Some(Field::SectionTitle),
            "title" | "posttitle" => Some(Field::PostTitle),
            "tags" | "posttags" => Some(Field::PostTags),
            _ => None,
        }
    }
}

/// A query the engine cannot parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown field qualifier: {0}")]
    UnknownField(String),
    #[error("unbalanced quote in query")]
    UnbalancedQuote,
}

/// One posting: a term occurrence count in one field of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: u32,
    pub field: u8,
    pub tf: u32,
}

/// A scored document reference returned from [`LexicalIndex::search`].
#[derive(Debug, Clone)]
pub struct ScoredRef {
    pub doc_ref: String,
    pub score: f64,
}

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Incrementally builds a [`LexicalIndex`].
#[derive(Debug, Default)]
pub struct LexicalIndexBuilder {
    docs: Vec<String>,
    postings: BTreeMap<String, Vec<Posting>>,
    field_lens: Vec<[u32; NUM_FIELDS]>,
}

impl LexicalIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one document under `doc_ref` with its field values.
    pub fn add_document(&mut self, doc_ref: &str, fields: &[(Field, &str)]) {
        let doc = self.docs.len() as u32;
        self.docs.push(doc_ref.to_string());

        let mut lens = [0u32; NUM_FIELDS];
        for (field, value) in fields {
            let terms = tokenize(value);
            lens[field.as_index()] += terms.len() as u32;

            // BTreeMap keeps posting insertion deterministic.
            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for term in terms {
                *counts.entry(term).or_insert(0) += 1;
            }
            for (term, tf) in counts {
                self.postings.entry(term).or_default().push(Posting {
                    doc,
                    field: field.as_index() as u8,
                    tf,
                });
            }
        }
        self.field_lens.push(lens);
    }

    pub fn build(self) -> LexicalIndex {
        let n = self.field_lens.len().max(1) as f64;
        let mut avg_field_lens = [0f64; NUM_FIELDS];
        for lens in &self.field_lens {
            for (avg, len) in avg_field_lens.iter_mut().zip(lens.iter()) {
                *avg += *len as f64;
            }
        }
        for avg in &mut avg_field_lens {
            *avg /= n;
        }

        LexicalIndex {
            docs: self.docs,
            postings: self.postings,
            field_lens: self.field_lens,
            avg_field_lens,
        }
    }
}

/// The serialized inverted structure: a document table, per-term posting
/// lists, and per-field length statistics for BM25 normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    docs: Vec<String>,
    postings: BTreeMap<String, Vec<Posting>>,
    field_lens: Vec<[u32; NUM_FIELDS]>,
    avg_field_lens: [f64; NUM_FIELDS],
}

/// A parsed query term, optionally restricted to one field.
#[derive(Debug)]
struct QueryTerm {
    term: String,
    field: Option<Field>,
}

impl LexicalIndex {
    /// Number of indexed documents.
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Run a relevance query, returning scored references ordered by score
    /// descending (document reference ascending on ties).
    pub fn search(&self, query: &str) -> Result<Vec<ScoredRef>, QueryError> {
        let terms = parse_query(query)?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let n = self.docs.len() as f64;
        let mut scores: HashMap<u32, f64> = HashMap::new();

        for qt in &terms {
            let Some(postings) = self.postings.get(&qt.term) else {
                continue;
            };
            let df = postings.iter().map(|p| p.doc).collect::<HashSet<_>>().len() as f64;
            let idf = (((n - df + 0.5) / (df + 0.5)) + 1.0).ln();

            for posting in postings {
                let fi = posting.field as usize;
                if fi >= NUM_FIELDS {
                    continue;
                }
                if let Some(field) = qt.field {
                    if fi != field.as_index() {
                        continue;
                    }
                }

                let dl = self.field_lens[posting.doc as usize][fi] as f64;
                let avg = self.avg_field_lens[fi].max(1.0);
                let tf = posting.tf as f64;
                let norm =
                    tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avg));

                *scores.entry(posting.doc).or_insert(0.0) += FIELD_WEIGHTS[fi] * idf * norm;
            }
        }

        let mut results: Vec<ScoredRef> = scores
            .into_iter()
            .map(|(doc, score)| ScoredRef {
                doc_ref: self.docs[doc as usize].clone(),
                score,
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_ref.cmp(&b.doc_ref))
        });
        Ok(results)
    }
}

/// Replace characters the query parser assigns meaning to with spaces and
/// collapse whitespace, so user-typed punctuation (e.g. `"Q&A:"`) cannot
/// misparse as a field qualifier or phrase.
pub fn sanitize_query(query: &str) -> String {
    let replaced: String = query
        .chars()
        .map(|c| match c {
            ':' | '+' | '*' | '~' | '^' | '"' => ' ',
            c => c,
        })
        .collect();
    collapse_whitespace(&replaced)
}

/// Aggressive fallback sanitization: alphanumerics and spaces only.
pub fn strip_query(query: &str) -> String {
    let replaced: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&replaced)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_query(query: &str) -> Result<Vec<QueryTerm>, QueryError> {
    // Raw tokens first; quotes group whitespace.
    let mut raw: Vec<(String, bool)> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in query.chars() {
        match c {
            '"' => {
                if !current.is_empty() {
                    raw.push((std::mem::take(&mut current), in_quotes));
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    raw.push((std::mem::take(&mut current), false));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(QueryError::UnbalancedQuote);
    }
    if !current.is_empty() {
        raw.push((current, false));
    }

    // Then field qualifiers and term expansion.
    let mut terms = Vec::new();
    for (token, quoted) in raw {
        let (field, body) = if quoted {
            (None, token)
        } else {
            match token.split_once(':') {
                Some((name, rest)) => match Field::parse(name) {
                    Some(field) => (Some(field), rest.to_string()),
                    None => return Err(QueryError::UnknownField(name.to_string())),
                },
                None => (None, token),
            }
        };
        for term in tokenize(&body) {
            terms.push(QueryTerm { term, field });
        }
    }
    Ok(terms)
}
