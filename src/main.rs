mod config;
mod converter;
mod db;
mod fetcher;
mod parser;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::{CodeConfig, Settings};
use fetcher::Fetcher;

#[derive(Parser)]
#[command(
    name = "statute_indexer",
    about = "Split codified statutes into searchable section records"
)]
struct Cli {
    /// Only log warnings and hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch chapters, split them into sections and save chapter files
    Get {
        /// Code abbreviation, e.g. "fa" (reads codes/fa.json)
        #[arg(short, long)]
        code: String,
        /// Single chapter instead of the whole code
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Split a local text (or .htm) file and print its sections as JSON
    Segment {
        file: PathBuf,
        /// Code stamped on every record, e.g. "FA"
        #[arg(short, long)]
        code: String,
        /// Destination name stamped on every record (default: the file name)
        #[arg(long)]
        filename: Option<String>,
    },
    /// Rewrite the code field of every saved chapter file
    Edit {
        #[arg(short, long)]
        code: String,
    },
    /// Load saved chapter files into the search index
    Index {
        #[arg(short, long)]
        code: String,
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Get + index in one pipeline
    Run {
        #[arg(short, long)]
        code: String,
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Query the index
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        /// Restrict to these codes, e.g. FA,PE
        #[arg(short, long, value_delimiter = ',')]
        codes: Vec<String>,
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Remove every indexed section of a code
    Delete {
        #[arg(short, long)]
        code: String,
    },
    /// List indexed codes
    Codes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let settings = Settings::load()?;
    let progress = !cli.quiet;

    let result = match cli.command {
        Commands::Get { code, chapter } => {
            let saved = get_code(&settings, &code, chapter, progress).await?;
            println!("Saved {} chapters ({} sections).", saved.chapters, saved.sections);
            Ok(())
        }
        Commands::Segment {
            file,
            code,
            filename,
        } => segment_file(&file, &code, filename),
        Commands::Edit { code } => {
            let code_config = CodeConfig::load(&settings.codes_dir, &code)?;
            let abbr = &code_config.code_name;
            let touched = store::restamp_code(&settings.data_dir, abbr, abbr)?;
            println!("Rewrote {} chapter files for {}.", touched, abbr);
            Ok(())
        }
        Commands::Index { code, chapter } => {
            let n = index_code(&settings, &code, chapter, progress)?;
            println!("Indexed {} sections.", n);
            Ok(())
        }
        Commands::Run { code, chapter } => {
            let t_get = Instant::now();
            let saved = get_code(&settings, &code, chapter.clone(), progress).await?;
            println!(
                "Saved {} chapters ({} sections) in {:.1}s",
                saved.chapters,
                saved.sections,
                t_get.elapsed().as_secs_f64()
            );
            if saved.chapters == 0 {
                println!("Nothing to index.");
                return Ok(());
            }
            let t_index = Instant::now();
            let n = index_code(&settings, &code, chapter, progress)?;
            println!(
                "Indexed {} sections in {:.1}s",
                n,
                t_index.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Commands::Search {
            query,
            codes,
            limit,
        } => {
            let conn = db::connect(&settings.index_path)?;
            db::init_schema(&conn)?;
            let query = db::SearchQuery {
                text: query.join(" "),
                codes: codes.iter().map(|c| c.to_uppercase()).collect(),
                limit,
            };
            let hits = db::search(&conn, &query)?;
            if hits.is_empty() {
                println!("No matches.");
                return Ok(());
            }
            for hit in &hits {
                println!(
                    "{}: {} Section {} - {} (score {:.2})\n",
                    hit.code,
                    hit.code_name.as_deref().unwrap_or("NO CODE NAME").trim(),
                    hit.section_number,
                    hit.section_name,
                    -hit.rank
                );
                println!("{}", hit.title.as_deref().unwrap_or("NO TITLE"));
                if let Some(chapter) = &hit.chapter {
                    println!("CHAPTER {}", chapter);
                }
                println!("{}", hit.snippet);
                println!("{}", "-".repeat(120));
            }
            Ok(())
        }
        Commands::Delete { code } => {
            let conn = db::connect(&settings.index_path)?;
            db::init_schema(&conn)?;
            let removed = db::delete_code(&conn, &code.to_uppercase())?;
            println!("Deleted {} sections.", removed);
            Ok(())
        }
        Commands::Codes => {
            let conn = db::connect(&settings.index_path)?;
            db::init_schema(&conn)?;
            let codes = db::indexed_codes(&conn)?;
            if codes.is_empty() {
                println!("Index is empty. Run 'index' first.");
                return Ok(());
            }
            println!("{:<6} | {:<40} | {:>8}", "Code", "Name", "Sections");
            println!("{}", "-".repeat(60));
            for c in &codes {
                let full_name = CodeConfig::load(&settings.codes_dir, &c.code)
                    .map(|cfg| cfg.full_name())
                    .unwrap_or_else(|_| {
                        c.code_name
                            .as_deref()
                            .map(|n| format!("{}CODE", n))
                            .unwrap_or_else(|| format!("Texas {} Code", c.code))
                    });
                println!("{:<6} | {:<40} | {:>8}", c.code, full_name, c.sections);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct SaveCounts {
    chapters: usize,
    sections: usize,
}

async fn get_code(
    settings: &Settings,
    code: &str,
    chapter: Option<String>,
    progress: bool,
) -> Result<SaveCounts> {
    use rayon::prelude::*;

    let code_config = CodeConfig::load(&settings.codes_dir, code)?;
    let abbr = code_config.code_name.clone();
    let chapters = match chapter {
        Some(c) => vec![c],
        None => code_config.chapters(),
    };
    info!("Fetching {} chapters of {}", chapters.len(), code_config.full_name());

    let fetcher = Arc::new(Fetcher::new(settings)?);
    let report =
        fetcher::fetch_chapters(fetcher, &abbr, chapters, settings.concurrency, progress).await?;
    if report.missing > 0 {
        info!("{} chapters not found on the site", report.missing);
    }
    if report.errors > 0 {
        warn!("{} chapters could not be fetched", report.errors);
    }

    // Chapters are independent documents; segment them in parallel.
    let segmented: Vec<_> = report
        .chapters
        .par_iter()
        .map(|c| {
            let filename = store::chapter_file_name(&abbr, &c.chapter);
            let seg = parser::process_chapter(&c.html, &abbr, &filename);
            (c.chapter.as_str(), filename, seg)
        })
        .collect();

    let mut counts = SaveCounts {
        chapters: 0,
        sections: 0,
    };
    for (chapter, filename, seg) in segmented {
        if seg.records.is_empty() {
            warn!("Chapter {} produced no sections", chapter);
        }
        info!(
            chapter,
            sections = seg.records.len(),
            continuations = seg.tally.continuations,
            history = seg.tally.history,
            dropped = seg.tally.dropped,
            "classified"
        );
        store::save_chapter(&settings.data_dir.join(&filename), &seg.records)?;
        counts.chapters += 1;
        counts.sections += seg.records.len();
    }
    Ok(counts)
}

fn index_code(
    settings: &Settings,
    code: &str,
    chapter: Option<String>,
    progress: bool,
) -> Result<usize> {
    use indicatif::{ProgressBar, ProgressStyle};

    let code_config = CodeConfig::load(&settings.codes_dir, code)?;
    let abbr = code_config.code_name.as_str();
    let files = match &chapter {
        Some(c) => vec![store::chapter_path(&settings.data_dir, abbr, c)],
        None => store::chapter_files(&settings.data_dir, abbr)?,
    };
    if files.is_empty() {
        warn!("No chapter files for {}. Run 'get' first.", abbr);
        return Ok(0);
    }

    let pb = if progress {
        ProgressBar::new(files.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    // Read every chapter before touching the index so a bad file leaves it intact.
    let mut chapters = Vec::with_capacity(files.len());
    for file in &files {
        let records = store::load_chapter(file)?;
        pb.inc(1);
        // An empty chapter usually means a conversion problem upstream; nothing to index.
        let Some(first) = records.first() else {
            continue;
        };
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Bad chapter file name {:?}", file))?;
        info!(
            chapter = first.chapter.as_deref().unwrap_or(filename),
            sections = records.len(),
            "loaded"
        );
        chapters.push((filename.to_string(), records));
    }
    pb.finish_and_clear();

    let conn = db::connect(&settings.index_path)?;
    db::init_schema(&conn)?;
    db::replace_chapters(&conn, abbr, &chapters, chapter.is_none())
}

fn segment_file(path: &Path, code: &str, filename: Option<String>) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let filename = filename.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let is_html = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("htm") || e.eq_ignore_ascii_case("html"));

    let seg = if is_html {
        parser::process_chapter(&raw, code, &filename)
    } else {
        parser::segment_document(&raw, code, &filename)
    };
    info!(
        lines = seg.tally.non_blank(),
        sections = seg.records.len(),
        markers = seg.tally.markers,
        continuations = seg.tally.continuations,
        history = seg.tally.history,
        dropped = seg.tally.dropped,
        "segmented {:?}",
        path
    );
    println!("{}", serde_json::to_string_pretty(&seg.records)?);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
