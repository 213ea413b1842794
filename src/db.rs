use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::parser::SectionRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE VIRTUAL TABLE IF NOT EXISTS sections USING fts5(
            code,
            code_name,
            title,
            subtitle,
            chapter,
            subchapter,
            section_prefix UNINDEXED,
            section_number,
            section_name,
            text,
            source_text,
            filename UNINDEXED,
            tokenize = 'porter unicode61'
        );
        ",
    )?;
    Ok(())
}

// ── Indexing ──

/// Swap in freshly segmented chapters as one transaction.
///
/// With `whole_code` every document of `code` is removed first; otherwise only
/// documents from the given chapter files are. On error nothing changes.
pub fn replace_chapters(
    conn: &Connection,
    code: &str,
    chapters: &[(String, Vec<SectionRecord>)],
    whole_code: bool,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    if whole_code {
        let removed = delete_code(&tx, code)?;
        if removed > 0 {
            info!("Replacing {} previously indexed {} sections", removed, code);
        }
    }
    let mut count = 0;
    for (filename, records) in chapters {
        if !whole_code {
            delete_file(&tx, code, filename)?;
        }
        count += insert_records(&tx, records)?;
    }
    tx.commit()?;
    Ok(count)
}

fn insert_records(conn: &Connection, records: &[SectionRecord]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO sections
         (code, code_name, title, subtitle, chapter, subchapter, section_prefix,
          section_number, section_name, text, source_text, filename)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    let mut count = 0;
    for r in records {
        count += stmt.execute(rusqlite::params![
            r.code,
            r.code_name,
            r.title,
            r.subtitle,
            r.chapter,
            r.subchapter,
            r.section_prefix.as_str(),
            r.section_number,
            r.section_name,
            r.text,
            r.source_text,
            r.filename,
        ])?;
    }
    Ok(count)
}

/// Remove every document belonging to `code`.
pub fn delete_code(conn: &Connection, code: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sections WHERE code = ?1", [code])?)
}

/// Remove the documents previously indexed from one chapter file.
pub fn delete_file(conn: &Connection, code: &str, filename: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM sections WHERE code = ?1 AND filename = ?2",
        [code, filename],
    )?)
}

// ── Listing ──

pub struct IndexedCode {
    pub code: String,
    pub code_name: Option<String>,
    pub sections: usize,
}

pub fn indexed_codes(conn: &Connection) -> Result<Vec<IndexedCode>> {
    let mut stmt = conn.prepare(
        "SELECT code, MAX(code_name), COUNT(*) FROM sections GROUP BY code ORDER BY code",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(IndexedCode {
                code: row.get(0)?,
                code_name: row.get(1)?,
                sections: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Search ──

pub struct SearchQuery {
    pub text: String,
    /// Empty means all codes.
    pub codes: Vec<String>,
    pub limit: usize,
}

pub struct SearchHit {
    pub code: String,
    pub code_name: Option<String>,
    pub title: Option<String>,
    pub chapter: Option<String>,
    pub section_number: String,
    pub section_name: String,
    pub snippet: String,
    pub rank: f64,
}

const SEARCH_COLUMNS: &str = "{section_name text section_number}";
const MIN_FUZZY_STEM: usize = 3;

/// Build an FTS5 MATCH expression.
///
/// Terms are ANDed across section name, text and number. `term*` is a prefix
/// term; `term~` is fuzzy and matches anything sharing the term minus its last
/// character. Returns `None` when the query has no searchable terms.
pub fn build_match(query: &str, codes: &[String]) -> Option<String> {
    let terms: Vec<String> = query.split_whitespace().filter_map(term_expr).collect();
    if terms.is_empty() {
        return None;
    }

    let mut expr = format!("{} : ({})", SEARCH_COLUMNS, terms.join(" AND "));

    let codes: Vec<String> = codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| format!("\"{}\"", c.replace('"', "")))
        .collect();
    if !codes.is_empty() {
        expr.push_str(&format!(" AND code : ({})", codes.join(" OR ")));
    }
    Some(expr)
}

fn term_expr(raw: &str) -> Option<String> {
    let (core, fuzzy, prefix) = if let Some(t) = raw.strip_suffix('~') {
        (t, true, false)
    } else if let Some(t) = raw.strip_suffix('*') {
        (t, false, true)
    } else {
        (raw, false, false)
    };

    let core: String = core.chars().filter(|c| *c != '"').collect();
    if !core.chars().any(char::is_alphanumeric) {
        return None;
    }

    if fuzzy {
        let n = core.chars().count();
        let keep = n.saturating_sub(1).max(MIN_FUZZY_STEM).min(n);
        let stem: String = core.chars().take(keep).collect();
        Some(format!("\"{}\" *", stem))
    } else if prefix {
        Some(format!("\"{}\" *", core))
    } else {
        Some(format!("\"{}\"", core))
    }
}

pub fn search(conn: &Connection, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    let Some(expr) = build_match(&query.text, &query.codes) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT code, code_name, title, chapter, section_number, section_name,
                snippet(sections, 9, '[', ']', '...', 24), bm25(sections)
         FROM sections
         WHERE sections MATCH ?1
         ORDER BY bm25(sections)
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![expr, query.limit as i64], |row| {
            Ok(SearchHit {
                code: row.get(0)?,
                code_name: row.get(1)?,
                title: row.get(2)?,
                chapter: row.get(3)?,
                section_number: row.get(4)?,
                section_name: row.get(5)?,
                snippet: row.get(6)?,
                rank: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Search failed for {}", expr))?;
    Ok(rows)
}

// ── Tests ──
