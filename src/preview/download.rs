//! Background fetching of remote images.
//!
//! Fetches run on worker threads. Their results travel back over a channel
//! and are only acted upon when the owning thread drains them, so completion
//! handling never touches the buffer from a worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, warn};
use url::Url;

use crate::error::{PreviewError, Result};

/// Transport used to fetch remote locators.
///
/// Implementations block; the coordinator calls them off the owning thread.
pub trait Fetcher: Send + Sync {
    /// # Errors
    /// Returns [`PreviewError::Fetch`] or [`PreviewError::Io`] when the
    /// locator cannot be retrieved.
    fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Serves `file://` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileUrlFetcher;

impl Fetcher for FileUrlFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let unsupported = |reason: &str| PreviewError::Fetch {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(locator).map_err(|err| unsupported(&err.to_string()))?;
        if url.scheme() != "file" {
            return Err(unsupported("only file:// URLs are served"));
        }
        let path = url
            .to_file_path()
            .map_err(|()| unsupported("URL has no local path"))?;
        std::fs::read(&path).map_err(|source| PreviewError::Io { path, source })
    }
}

#[derive(Debug)]
struct Completion {
    locator: String,
    result: Result<Vec<u8>>,
}

/// Issues fetches and collects their results.
///
/// Requests for a locator already in flight are dropped. A coordinator built
/// with [`disabled`](Self::disabled) accepts requests but never serves them.
pub struct DownloadCoordinator {
    fetcher: Option<Arc<dyn Fetcher>>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    in_flight: HashSet<String>,
}

impl DownloadCoordinator {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetcher: Some(fetcher),
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    pub fn disabled() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetcher: None,
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    /// Fire-and-forget fetch of `locator`.
    pub fn request(&mut self, locator: &str) {
        if !self.in_flight.insert(locator.to_string()) {
            return;
        }
        let Some(fetcher) = self.fetcher.as_ref().map(Arc::clone) else {
            debug!(locator, "no fetcher configured, request parked");
            return;
        };
        crate::perf::log_event("download.request", locator);

        let tx = self.tx.clone();
        let owned = locator.to_string();
        let spawned = std::thread::Builder::new()
            .name("preview-fetch".to_string())
            .spawn(move || {
                let result = fetcher.fetch(&owned);
                let _ = tx.send(Completion {
                    locator: owned,
                    result,
                });
            });
        if let Err(err) = spawned {
            warn!(locator, %err, "failed to spawn fetch worker");
            self.in_flight.remove(locator);
        }
    }

    /// Drain finished fetches as `(locator, bytes)`. Failed fetches are
    /// logged and dropped so a later pass can request them again.
    pub fn take_completed(&mut self) -> Vec<(String, Vec<u8>)> {
        let mut done = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            self.in_flight.remove(&completion.locator);
            match completion.result {
                Ok(bytes) => {
                    crate::perf::log_event(
                        "download.done",
                        format!("{} bytes={}", completion.locator, bytes.len()),
                    );
                    done.push((completion.locator, bytes));
                }
                Err(err) => {
                    debug!(%err, "download failed");
                    crate::perf::log_event("download.error", err.to_string());
                }
            }
        }
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Outstanding locators, sorted.
    pub fn requested(&self) -> Vec<String> {
        let mut locators: Vec<String> = self.in_flight.iter().cloned().collect();
        locators.sort();
        locators
    }

    /// Whether results may still arrive.
    pub fn is_busy(&self) -> bool {
        self.fetcher.is_some() && !self.in_flight.is_empty()
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("enabled", &self.fetcher.is_some())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if locator.ends_with("fail") {
                return Err(PreviewError::Fetch {
                    locator: locator.to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(locator.as_bytes().to_vec())
        }
    }

    fn wait_for(coordinator: &mut DownloadCoordinator) -> Vec<(String, Vec<u8>)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = Vec::new();
        while coordinator.in_flight() > 0 && Instant::now() < deadline {
            done.extend(coordinator.take_completed());
            std::thread::sleep(Duration::from_millis(5));
        }
        done
    }

    #[test]
    fn test_completed_fetch_is_delivered() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let mut coordinator = DownloadCoordinator::new(fetcher.clone());
        coordinator.request("https://x/a.png");
        let done = wait_for(&mut coordinator);
        assert_eq!(
            done,
            vec![("https://x/a.png".to_string(), b"https://x/a.png".to_vec())]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fetch_is_dropped_and_can_be_retried() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let mut coordinator = DownloadCoordinator::new(fetcher.clone());
        coordinator.request("https://x/fail");
        assert!(wait_for(&mut coordinator).is_empty());
        assert_eq!(coordinator.in_flight(), 0);

        coordinator.request("https://x/fail");
        wait_for(&mut coordinator);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_coordinator_parks_requests() {
        let mut coordinator = DownloadCoordinator::disabled();
        coordinator.request("https://x/a.png");
        coordinator.request("https://x/a.png");
        assert_eq!(coordinator.requested(), vec!["https://x/a.png".to_string()]);
        assert!(!coordinator.is_busy());
        assert!(coordinator.take_completed().is_empty());
    }

    #[test]
    fn test_file_url_fetcher_reads_local_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"bytes").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(FileUrlFetcher.fetch(url.as_str()).unwrap(), b"bytes");
    }

    #[test]
    fn test_file_url_fetcher_rejects_other_schemes() {
        let err = FileUrlFetcher.fetch("https://example.com/a.png").unwrap_err();
        assert!(matches!(err, PreviewError::Fetch { .. }));
    }
}
