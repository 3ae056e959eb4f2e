use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: SiteConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Site origin used to build canonical post URLs, e.g. `https://example.com`.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    /// Directory holding the markdown posts.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_min_tokens() -> usize {
    300
}
fn default_max_tokens() -> usize {
    600
}
fn default_overlap_tokens() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default result limit for queries.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Default result limit for section lookups.
    #[serde(default = "default_section_limit")]
    pub section_limit: usize,
    /// Deadline for a single artifact fetch over HTTP.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            section_limit: default_section_limit(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_section_limit() -> usize {
    10
}
fn default_fetch_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Directory the artifacts are written to (the static host's root).
    pub dir: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.site.base_url.trim().is_empty() {
        anyhow::bail!("site.base_url must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.min_tokens > config.chunking.max_tokens {
        anyhow::bail!("chunking.min_tokens must be <= chunking.max_tokens");
    }
    if config.chunking.overlap_tokens >= config.chunking.min_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.min_tokens");
    }

    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.fetch_timeout_secs == 0 {
        anyhow::bail!("retrieval.fetch_timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psg.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_with_defaults() {
        let (_dir, path) = write_config(
            r#"
[site]
base_url = "https://example.com"

[content]
root = "./content"

[output]
dir = "./public"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.min_tokens, 300);
        assert_eq!(config.chunking.max_tokens, 600);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert_eq!(config.retrieval.default_limit, 5);
        assert_eq!(config.content.include_globs, vec!["**/*.md", "**/*.mdx"]);
    }

    #[test]
    fn test_rejects_inverted_budget() {
        let (_dir, path) = write_config(
            r#"
[site]
base_url = "https://example.com"

[content]
root = "./content"

[chunking]
min_tokens = 700
max_tokens = 600

[output]
dir = "./public"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_oversized_overlap() {
        let (_dir, path) = write_config(
            r#"
[site]
base_url = "https://example.com"

[content]
root = "./content"

[chunking]
overlap_tokens = 400

[output]
dir = "./public"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
