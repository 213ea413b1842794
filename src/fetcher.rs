use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Settings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection to {url} failed after {attempts} attempts: {source}")]
    Connection {
        url: String,
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Retrieves chapter markup from the statutes site.
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    attempts: u32,
    retry_delay: Duration,
}

/// One successfully retrieved chapter.
pub struct FetchedChapter {
    pub chapter: String,
    pub html: String,
}

/// Fetch stats returned after completion.
pub struct FetchReport {
    pub chapters: Vec<FetchedChapter>,
    pub missing: usize,
    pub errors: usize,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Fetcher {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            attempts: settings.fetch_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        })
    }

    pub fn chapter_url(&self, abbr: &str, chapter: &str) -> String {
        format!("{}/Docs/{abbr}/htm/{abbr}.{chapter}.htm", self.base_url)
    }

    /// Fetch one chapter. `Ok(None)` means the site has no such chapter (404).
    ///
    /// Connection failures and timeouts are retried with a fixed delay; any
    /// other failure is returned immediately.
    pub async fn fetch_chapter(
        &self,
        abbr: &str,
        chapter: &str,
    ) -> Result<Option<String>, FetchError> {
        let url = self.chapter_url(abbr, chapter);
        let mut attempt = 1;

        let response = loop {
            let start = Instant::now();
            match self.client.get(&url).send().await {
                Ok(response) => {
                    debug!(
                        url = %url,
                        status = %response.status(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "fetched"
                    );
                    break response;
                }
                Err(e) if is_transient(&e) && attempt < self.attempts => {
                    warn!(
                        "Connection failed for {} (attempt {}/{}), retrying in {:.1}s",
                        url,
                        attempt,
                        self.attempts,
                        self.retry_delay.as_secs_f64()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) if is_transient(&e) => {
                    return Err(FetchError::Connection {
                        url,
                        attempts: attempt,
                        source: e,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }
        Ok(Some(response.text().await?))
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Fetch chapters concurrently, collecting results in chapter order.
pub async fn fetch_chapters(
    fetcher: Arc<Fetcher>,
    abbr: &str,
    chapters: Vec<String>,
    concurrency: usize,
    progress: bool,
) -> Result<FetchReport> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = chapters.len();

    let pb = if progress {
        ProgressBar::new(total as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} chapters ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop collects them
    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(usize, String, Result<Option<String>, FetchError>)>(
            concurrency.max(1) * 2,
        );

    for (idx, chapter) in chapters.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let abbr = abbr.to_string();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let result = fetcher.fetch_chapter(&abbr, &chapter).await;
            let _ = tx.send((idx, chapter, result)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut fetched = Vec::new();
    let mut missing = 0usize;
    let mut errors = 0usize;

    while let Some((idx, chapter, result)) = rx.recv().await {
        match result {
            Ok(Some(html)) => fetched.push((idx, FetchedChapter { chapter, html })),
            Ok(None) => {
                debug!("Chapter {} not found (end of range)", chapter);
                missing += 1;
            }
            Err(e) => {
                warn!("Chapter {} failed: {}", chapter, e);
                errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} of {} chapters ({} missing, {} errors)",
        fetched.len(),
        total,
        missing,
        errors
    );

    fetched.sort_by_key(|(idx, _)| *idx);
    Ok(FetchReport {
        chapters: fetched.into_iter().map(|(_, c)| c).collect(),
        missing,
        errors,
    })
}

// ── Tests ──
