//! Background optimization runs
//!
//! Each request runs on its own task. Requests are tagged with a
//! monotonically increasing sequence number and only the latest one
//! delivers a result; anything older is discarded when it finishes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::parser::{Extraction, Language};
use super::pipeline::{self, OptimizeOutcome, OptimizeRequest, Settings};

/// Runs optimize requests off the caller's task
#[derive(Debug, Clone)]
pub struct OptimizeWorker {
    settings: Arc<Settings>,
    latest: Arc<AtomicU64>,
}

impl OptimizeWorker {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sequence number of the most recent submission (0 before any)
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Start a run. Submitting again makes every earlier ticket stale.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: OptimizeRequest) -> Ticket {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let settings = Arc::clone(&self.settings);
        debug!("Submitting optimize request #{}", seq);

        let handle = tokio::spawn(async move { run(request, settings).await });

        Ticket {
            seq,
            latest: Arc::clone(&self.latest),
            handle,
        }
    }
}

/// Handle to one submitted run
#[derive(Debug)]
pub struct Ticket {
    seq: u64,
    latest: Arc<AtomicU64>,
    handle: JoinHandle<Option<OptimizeOutcome>>,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether no newer request has been submitted since this one
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.seq
    }

    /// Stop waiting for a run that is no longer wanted
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the outcome. `None` if the run is stale or did not finish.
    pub async fn wait(self) -> Option<OptimizeOutcome> {
        let outcome = match self.handle.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return None,
            Err(e) if e.is_cancelled() => {
                debug!("Optimize request #{} was cancelled", self.seq);
                return None;
            }
            Err(e) => {
                warn!("Optimize request #{} failed: {}", self.seq, e);
                return None;
            }
        };

        let latest = self.latest.load(Ordering::SeqCst);
        if latest != self.seq {
            debug!("Discarding stale result #{} (latest is #{})", self.seq, latest);
            return None;
        }
        Some(outcome)
    }
}

async fn run(request: OptimizeRequest, settings: Arc<Settings>) -> Option<OptimizeOutcome> {
    let extraction = match &request.file {
        Some(path) => {
            let owned = path.clone();
            let max_file_size = settings.max_file_size;
            let extract = move || pipeline::extract_file(&owned, max_file_size);
            Some(extract_within(path, settings.extraction_timeout, extract).await)
        }
        None => None,
    };

    let prompt = request.prompt;
    let planning = tokio::task::spawn_blocking(move || {
        pipeline::plan_extraction(&prompt, extraction, &settings)
    });

    match planning.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!("Planning task failed: {}", e);
            None
        }
    }
}

/// Run `extract` on the blocking pool with a wall-clock limit. On timeout the
/// raw file content becomes a single chunk.
pub async fn extract_within<F>(path: &Path, timeout: Duration, extract: F) -> Extraction
where
    F: FnOnce() -> Extraction + Send + 'static,
{
    let task = tokio::task::spawn_blocking(extract);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(extraction)) => extraction,
        Ok(Err(e)) => {
            warn!("Extraction of {} failed: {}", path.display(), e);
            Extraction::empty(Language::from_path(path))
        }
        Err(_) => {
            warn!(
                "Extraction of {} timed out after {:?}, using raw content",
                path.display(),
                timeout
            );
            raw_fallback(path.to_path_buf()).await
        }
    }
}

async fn raw_fallback(path: PathBuf) -> Extraction {
    let language = Language::from_path(&path);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Extraction::raw(&String::from_utf8_lossy(&bytes), language),
        Err(e) => {
            warn!("Failed to read {} for raw fallback: {}", path.display(), e);
            Extraction::empty(language)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::optimizer::TextOptimizer;
    use crate::core::parser::ExtractionStrategy;
    use crate::core::planner::{PlanLimits, StepKind, StepPlanner};
    use crate::core::tokenizer::TokenizerChain;
    use std::fs;
    use tempfile::TempDir;

    fn worker() -> OptimizeWorker {
        OptimizeWorker::new(Settings {
            planner: StepPlanner::new(PlanLimits::default(), TokenizerChain::words(), TextOptimizer::default()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_latest_request_delivers() {
        let worker = worker();
        let ticket = worker.submit(OptimizeRequest::new("Describe the Planner"));
        assert_eq!(ticket.seq(), 1);
        assert!(ticket.is_current());

        let outcome = ticket.wait().await.expect("latest result is delivered");
        assert!(outcome.steps.iter().any(|s| s.kind == StepKind::Prompt));
    }

    #[tokio::test]
    async fn test_stale_results_are_discarded() {
        let worker = worker();
        let first = worker.submit(OptimizeRequest::new("first request about Parser"));
        let second = worker.submit(OptimizeRequest::new("second request about Scorer"));

        assert_eq!(worker.latest(), 2);
        assert!(!first.is_current());
        assert!(first.wait().await.is_none());

        let outcome = second.wait().await.expect("second is current");
        assert!(outcome.keywords.contains("Scorer"));
    }

    // Single-threaded, so the spawned run cannot start before the abort
    #[tokio::test(flavor = "current_thread")]
    async fn test_aborted_request_yields_nothing() {
        let worker = worker();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lib.rs");
        fs::write(&path, "fn main() {}\n").unwrap();

        let ticket = worker.submit(OptimizeRequest::new("explain main").with_file(&path));
        assert!(ticket.is_current());
        ticket.abort();

        assert!(ticket.wait().await.is_none());
        assert_eq!(worker.latest(), 1);
    }

    #[tokio::test]
    async fn test_file_request_runs_extraction() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("calc.js");
        fs::write(&path, "function addNumbers(a, b) {\n  return a + b;\n}\n").unwrap();

        let worker = worker();
        let outcome = worker
            .submit(OptimizeRequest::new("Explain addNumbers").with_file(&path))
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.total_chunks, 1);
        assert!(outcome.steps.iter().any(|s| s.kind == StepKind::Chunk));
    }

    #[tokio::test]
    async fn test_extraction_timeout_falls_back_to_raw() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slow.py");
        fs::write(&path, "def slow():\n    pass\n").unwrap();

        let slow = || {
            std::thread::sleep(Duration::from_millis(300));
            Extraction::empty(Language::Python)
        };
        let extraction = extract_within(&path, Duration::from_millis(20), slow).await;

        assert_eq!(extraction.strategy, ExtractionStrategy::Raw);
        assert_eq!(extraction.texts(), vec!["def slow():\n    pass".to_string()]);
    }

    #[tokio::test]
    async fn test_extraction_within_limit_is_kept() {
        let path = Path::new("quick.txt");
        let quick = || Extraction::raw("quick content", Language::Text);
        let extraction = extract_within(path, Duration::from_secs(5), quick).await;
        assert_eq!(extraction.texts(), vec!["quick content".to_string()]);
    }
}
