//! Application settings and per-code chapter configuration.
//!
//! Settings come from built-in defaults, an optional `statutes.toml` in the
//! working directory, then `STATUTES_*` environment variables. Each code to
//! crawl has its own `codes/<abbr>.json` describing its chapter range.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_codes_dir")]
    pub codes_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://statutes.capitol.texas.gov".to_string()
}

fn default_codes_dir() -> PathBuf {
    PathBuf::from("codes")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index/statutes.sqlite")
}

fn default_concurrency() -> usize {
    4
}

fn default_fetch_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: default_base_url(),
            codes_dir: default_codes_dir(),
            data_dir: default_data_dir(),
            index_path: default_index_path(),
            concurrency: default_concurrency(),
            fetch_attempts: default_fetch_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name("statutes").required(false))
            .add_source(config::Environment::with_prefix("STATUTES"))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}

/// Chapter layout of one codified law, e.g. `codes/fa.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Upper-case abbreviation used in URLs and file names, e.g. `FA`.
    pub code_name: String,
    #[serde(default)]
    pub code_full_name: Option<String>,
    pub chapter_range_low: u32,
    /// Exclusive.
    pub chapter_range_high: u32,
    #[serde(default)]
    pub add_chapters: Vec<String>,
    #[serde(default)]
    pub skip_chapters: Vec<String>,
}

impl CodeConfig {
    pub fn path(codes_dir: &Path, abbr: &str) -> PathBuf {
        codes_dir.join(format!("{}.json", abbr.to_lowercase()))
    }

    pub fn load(codes_dir: &Path, abbr: &str) -> Result<Self> {
        let path = Self::path(codes_dir, abbr);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read code config {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid code config {:?}", path))
    }

    pub fn full_name(&self) -> String {
        self.code_full_name
            .clone()
            .unwrap_or_else(|| format!("Texas {} Code", self.code_name.to_uppercase()))
    }

    /// Chapters to crawl, in order: the numeric range, then added chapters,
    /// minus skipped ones.
    pub fn chapters(&self) -> Vec<String> {
        (self.chapter_range_low..self.chapter_range_high)
            .map(|n| n.to_string())
            .chain(self.add_chapters.iter().cloned())
            .filter(|c| !self.skip_chapters.contains(c))
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeConfig {
        serde_json::from_str(
            r#"{
                "code_name": "FA",
                "chapter_range_low": 1,
                "chapter_range_high": 6,
                "add_chapters": ["45A", "7"],
                "skip_chapters": ["3", "7"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn chapters_range_plus_adds_minus_skips() {
        assert_eq!(sample().chapters(), ["1", "2", "4", "5", "45A"]);
    }

    #[test]
    fn full_name_falls_back() {
        let mut c = sample();
        assert_eq!(c.full_name(), "Texas FA Code");
        c.code_full_name = Some("Family Code".into());
        assert_eq!(c.full_name(), "Family Code");
    }

    #[test]
    fn load_lowercases_file_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("fa.json"),
            serde_json::to_string(&sample()).unwrap(),
        )
        .unwrap();
        let c = CodeConfig::load(dir.path(), "FA").unwrap();
        assert_eq!(c.code_name, "FA");
        assert!(CodeConfig::load(dir.path(), "pe").is_err());
    }

    #[test]
    fn settings_defaults() {
        let s = Settings::default();
        assert_eq!(s.fetch_attempts, 5);
        assert_eq!(s.base_url, "https://statutes.capitol.texas.gov");
    }
}
