//! File watchers that drive live reload.
//!
//! Each server gets two watchers:
//! - the entry file: any change broadcasts a generic reload
//! - the entry's directory: `.json`/`.csv` changes (except `data.json`)
//!   broadcast a reload plus a data refresh once writes settle
//!
//! Watchers are best-effort. A watcher that cannot be attached is logged and
//! the server runs without it.

use crate::error::{Result, ServeError};
use crate::livereload::LiveReloadHub;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Written by the analysis pipeline itself, which notifies on its own.
const MANAGED_DATA_FILE: &str = "data.json";

/// Watchers owned by one server. Dropping this stops them.
#[derive(Default)]
pub struct ServerWatchers {
    entry: Option<RecommendedWatcher>,
    directory: Option<DirectoryWatcher>,
}

impl ServerWatchers {
    /// Attach both watchers, skipping any that fail.
    pub fn attach(entry: &Path, directory: &Path, hub: &Arc<LiveReloadHub>, settle: Duration) -> Self {
        Self {
            entry: attach_or_warn("entry file", entry, watch_entry(entry, hub.clone())),
            directory: attach_or_warn(
                "directory",
                directory,
                DirectoryWatcher::new(directory, hub.clone(), settle),
            ),
        }
    }

    pub fn is_watching_entry(&self) -> bool {
        self.entry.is_some()
    }

    pub fn is_watching_directory(&self) -> bool {
        self.directory.is_some()
    }
}

/// Fallback policy for watcher setup: log the failure, carry on unwatched.
fn attach_or_warn<T>(what: &str, path: &Path, result: Result<T>) -> Option<T> {
    match result {
        Ok(watcher) => {
            debug!(path = %path.display(), "watching {}", what);
            Some(watcher)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not set up {} watcher", what);
            None
        }
    }
}

/// Whether an event reflects a content change rather than a read.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// Whether `path` is a data file whose change should refresh open pages.
pub fn is_data_change(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name == MANAGED_DATA_FILE {
        return false;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("csv")
    )
}

fn watch_entry(entry: &Path, hub: Arc<LiveReloadHub>) -> Result<RecommendedWatcher> {
    if !entry.exists() {
        return Err(ServeError::FileNotFound(entry.to_path_buf()));
    }

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_change(&event.kind) => {
            debug!(kind = ?event.kind, "entry file changed");
            hub.notify_clients();
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "entry watcher error"),
    })?;
    watcher.watch(entry, RecursiveMode::NonRecursive)?;

    Ok(watcher)
}

/// Directory watcher with a settle delay.
///
/// Every matching event bumps a generation counter and schedules a check
/// after `settle`; only the check that still sees its own generation
/// broadcasts, so a burst of writes produces one notification.
struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    generation: Arc<AtomicU64>,
}

impl DirectoryWatcher {
    fn new(dir: &Path, hub: Arc<LiveReloadHub>, settle: Duration) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ServeError::FileNotFound(dir.to_path_buf()));
        }

        let runtime = Handle::try_current()
            .map_err(|e| ServeError::Server(format!("directory watcher needs a runtime: {}", e)))?;
        let generation = Arc::new(AtomicU64::new(0));
        let pending = generation.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "directory watcher error");
                    return;
                }
            };
            if !is_change(&event.kind) {
                return;
            }
            let changed: Vec<&PathBuf> = event.paths.iter().filter(|p| is_data_change(p)).collect();
            if changed.is_empty() {
                return;
            }
            debug!(paths = ?changed, "data file changed");

            let ticket = pending.fetch_add(1, Ordering::SeqCst) + 1;
            let pending = pending.clone();
            let hub = hub.clone();
            runtime.spawn(async move {
                tokio::time::sleep(settle).await;
                if pending.load(Ordering::SeqCst) == ticket {
                    hub.notify_clients();
                    hub.notify_clients_data_refresh();
                }
            });
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            generation,
        })
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        // Invalidate any settle timer still in flight.
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[test]
    fn test_data_change_filter() {
        assert!(is_data_change(Path::new("/viz/latest-analysis.json")));
        assert!(is_data_change(Path::new("/viz/metrics.csv")));
        assert!(!is_data_change(Path::new("/viz/data.json")));
        assert!(!is_data_change(Path::new("/viz/index.html")));
        assert!(!is_data_change(Path::new("/viz/notes")));
    }

    #[test]
    fn test_reads_are_not_changes() {
        use notify::event::{AccessKind, ModifyKind};
        assert!(!is_change(&EventKind::Access(AccessKind::Any)));
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
    }

    #[tokio::test]
    async fn test_missing_paths_are_skipped() {
        let temp = TempDir::new().unwrap();
        let hub = Arc::new(LiveReloadHub::new());
        let missing = temp.path().join("gone");

        let watchers = ServerWatchers::attach(
            &missing.join("index.html"),
            &missing,
            &hub,
            Duration::from_millis(10),
        );
        assert!(!watchers.is_watching_entry());
        assert!(!watchers.is_watching_directory());
    }

    #[tokio::test]
    async fn test_data_burst_coalesces() {
        let temp = TempDir::new().unwrap();
        let entry = temp.path().join("index.html");
        std::fs::write(&entry, "<body></body>").unwrap();

        let hub = Arc::new(LiveReloadHub::new());
        let mut client = hub.add_sse_client();
        let watchers = ServerWatchers::attach(&entry, temp.path(), &hub, Duration::from_millis(200));
        assert!(watchers.is_watching_directory());

        for i in 0..5 {
            std::fs::write(temp.path().join("latest-analysis.json"), format!("[{}]", i)).unwrap();
        }

        let first = timeout(Duration::from_secs(5), client.recv()).await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: reload\n\n");
        let second = timeout(Duration::from_secs(1), client.recv()).await.unwrap().unwrap();
        assert_eq!(&second[..], b"event: dataRefresh\ndata: refreshed\n\n");

        // One burst, one pair of frames.
        assert!(timeout(Duration::from_millis(500), client.recv()).await.is_err());
    }
}
