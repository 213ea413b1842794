//! Chapter files: one pretty-printed JSON array of section records per chapter,
//! named `<ABBR>-Chapter-<00000>.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::parser::SectionRecord;

const CHAPTER_WIDTH: usize = 5;

pub fn chapter_file_name(abbr: &str, chapter: &str) -> String {
    format!("{}-Chapter-{:0>width$}.json", abbr, chapter, width = CHAPTER_WIDTH)
}

pub fn chapter_path(data_dir: &Path, abbr: &str, chapter: &str) -> PathBuf {
    data_dir.join(chapter_file_name(abbr, chapter))
}

pub fn save_chapter(path: &Path, records: &[SectionRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    debug!("Saved {} sections to {:?}", records.len(), path);
    Ok(())
}

pub fn load_chapter(path: &Path) -> Result<Vec<SectionRecord>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid chapter file {:?}", path))
}

/// All stored chapter files for a code, sorted by name (and so by chapter).
pub fn chapter_files(data_dir: &Path, abbr: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}-Chapter-", abbr);
    if !data_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to list {:?}", data_dir))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(".json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rewrite the `code` field of every stored record for `abbr`.
/// Stops at the first file that cannot be read or written.
pub fn restamp_code(data_dir: &Path, abbr: &str, code: &str) -> Result<usize> {
    let files = chapter_files(data_dir, abbr)?;
    let mut touched = 0;
    for file in &files {
        let mut records = load_chapter(file)?;
        if records.iter().all(|r| r.code == code) {
            continue;
        }
        for record in records.iter_mut() {
            record.code = code.to_string();
        }
        save_chapter(file, &records)?;
        touched += 1;
    }
    if files.is_empty() {
        warn!("No chapter files for {} in {:?}", abbr, data_dir);
    }
    Ok(touched)
}

// ── Tests ──
