//! Reload the document buffer when its file changes on disk.
//!
//! Uses notify for cross-platform file system events. A reload replaces the
//! buffer text, which the previewer sees as an ordinary content change.
use std::ffi::OsString;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::editor::EditorBuffer;

/// Watches one document and reloads it after debounced changes.
pub struct DocumentWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watch_root: PathBuf,
    target_path: PathBuf,
    target_name: Option<OsString>,
    debounce: Duration,
    pending_since: Option<Instant>,
    content_hash: Option<u64>,
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

impl DocumentWatcher {
    /// Create a watcher for `path`.
    ///
    /// # Errors
    /// Returns an error if the file watcher cannot be created or the path cannot be watched.
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> notify::Result<Self> {
        // Event paths from the OS are canonical; store ours the same way.
        let target_path = path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        let target_name = target_path.file_name().map(std::ffi::OsStr::to_os_string);
        let watch_root = watch_root_for(&target_path);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&watch_root, RecursiveMode::NonRecursive)?;

        let content_hash = std::fs::read(&target_path).ok().map(|b| hash_bytes(&b));
        Ok(Self {
            _watcher: watcher,
            rx,
            watch_root,
            target_path,
            target_name,
            debounce,
            pending_since: None,
            content_hash,
        })
    }

    /// The canonical path of the file being watched.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Returns true once a debounced file change is ready.
    pub fn take_change_ready(&mut self) -> bool {
        let mut relevant = 0u32;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(ev) if self.is_relevant(&ev) => relevant += 1,
                Ok(_) => {}
                Err(err) => {
                    crate::perf::log_event("watcher.error", format!("{err}"));
                }
            }
        }
        if relevant > 0 {
            crate::perf::log_event(
                "watcher.poll",
                format!("relevant={relevant} target={}", self.target_path.display()),
            );
            self.pending_since = Some(Instant::now());
        }

        let Some(pending_since) = self.pending_since else {
            return false;
        };
        if pending_since.elapsed() >= self.debounce {
            self.pending_since = None;
            return true;
        }
        false
    }

    /// Reload `buffer` if a debounced change is ready and the file content
    /// actually differs. Returns whether the buffer was reloaded.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn reload_if_changed(&mut self, buffer: &mut EditorBuffer) -> std::io::Result<bool> {
        if !self.take_change_ready() {
            return Ok(false);
        }
        let bytes = std::fs::read(&self.target_path)?;
        let hash = hash_bytes(&bytes);
        if self.content_hash == Some(hash) {
            debug!(path = %self.target_path.display(), "change event without content change");
            return Ok(false);
        }
        self.content_hash = Some(hash);
        buffer.reload(&String::from_utf8_lossy(&bytes));
        Ok(true)
    }

    fn is_relevant(&self, event: &Event) -> bool {
        event.paths.iter().any(|path| {
            path == &self.watch_root
                || path == &self.target_path
                || self
                    .target_name
                    .as_ref()
                    .is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        })
    }
}

fn watch_root_for(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
