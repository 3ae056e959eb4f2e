//! Filesystem content source.
//!
//! Walks the content root for markdown posts, parses their YAML frontmatter,
//! and yields [`Document`]s. Drafts and hidden posts are filtered out here,
//! so nothing downstream ever sees them.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::markdown::slugify;
use crate::models::Document;

#[derive(Debug, Deserialize)]
struct Frontmatter {
    title: String,
    date: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    hide: bool,
    /// Optional slug override; defaults to the slugified file stem.
    #[serde(default)]
    slug: Option<String>,
}

/// Load all published documents under the configured content root, sorted
/// by slug for deterministic ordering.
pub fn load_documents(config: &Config) -> Result<Vec<Document>> {
    let root = &config.content.root;
    if !root.exists() {
        bail!("Content root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.content.include_globs)?;
    let exclude_set = build_globset(&config.content.exclude_globs)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read post: {}", path.display()))?;
        if let Some(doc) = parse_post(&raw, path, &config.site.base_url)? {
            documents.push(doc);
        }
    }

    documents.sort_by(|a, b| a.slug.cmp(&b.slug));

    let mut seen: HashSet<&str> = HashSet::new();
    for doc in &documents {
        if !seen.insert(&doc.slug) {
            bail!("Duplicate post slug: {}", doc.slug);
        }
    }

    Ok(documents)
}

/// Parse one post file. Returns `None` for drafts and hidden posts.
fn parse_post(raw: &str, path: &Path, base_url: &str) -> Result<Option<Document>> {
    let (front, body) = split_frontmatter(raw)
        .with_context(|| format!("Missing frontmatter in {}", path.display()))?;

    let fm: Frontmatter = serde_yaml::from_str(front)
        .with_context(|| format!("Invalid frontmatter in {}", path.display()))?;

    if fm.draft || fm.hide {
        return Ok(None);
    }

    let slug = match fm.slug {
        Some(slug) => slug,
        None => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            slugify(&stem)
        }
    };
    if slug.is_empty() {
        bail!("Cannot derive a slug for {}", path.display());
    }

    let date = parse_date(&fm.date)
        .with_context(|| format!("Invalid date '{}' in {}", fm.date, path.display()))?;

    let url = format!("{}/blog/{}/", base_url.trim_end_matches('/'), slug);

    Ok(Some(Document {
        slug,
        title: fm.title,
        url,
        date,
        tags: fm.tags,
        body: body.to_string(),
    }))
}

/// Split a `---` delimited YAML frontmatter block from the body.
fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let end = rest.find("\n---")?;
    let front = &rest[..end];
    let body = &rest[end + 4..];
    let body = body.strip_prefix('\r').unwrap_or(body);
    let body = body.strip_prefix('\n').unwrap_or(body);
    Some((front, body))
}

/// Accept either a full RFC 3339 timestamp or a bare `YYYY-MM-DD`.
fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
