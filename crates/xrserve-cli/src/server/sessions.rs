//! Analysis sessions bound to running servers.
//!
//! Higher layers open a session per analyzed file. When a server stops, the
//! lifecycle manager asks the [`SessionHook`] to drop whatever sessions were
//! showing that server.

use super::ServerInstance;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Prefix of `analysis_file_name` for servers showing a directory analysis.
pub const DIRECTORY_PREFIX: &str = "DIR:";

/// Notified when a server stops.
pub trait SessionHook: Send + Sync {
    /// Remove sessions bound to `server`. Returns how many were removed.
    fn remove_sessions_for(&self, server: &ServerInstance) -> usize;
}

/// Kind of analysis a session displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalysisType {
    #[serde(rename = "XR")]
    Xr,
    Static,
    #[serde(rename = "DOM")]
    Dom,
    Directory,
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisType::Xr => f.write_str("XR"),
            AnalysisType::Static => f.write_str("Static"),
            AnalysisType::Dom => f.write_str("DOM"),
            AnalysisType::Directory => f.write_str("Directory"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSession {
    pub id: String,
    pub file_path: PathBuf,
    pub file_name: String,
    pub analysis_type: AnalysisType,
    /// Server showing this session, when known
    pub server_id: Option<String>,
    pub created: DateTime<Utc>,
}

impl AnalysisSession {
    /// Whether this session is displayed by `server`.
    ///
    /// Matches on the bound server id or the served file path first. Failing
    /// those, the server's analysis file name is compared with the session's
    /// file stem (XR and DOM) or directory name (`DIR:` servers).
    pub fn is_bound_to(&self, server: &ServerInstance) -> bool {
        if self.server_id.as_deref() == Some(server.id.as_str()) {
            return true;
        }
        if self.file_path == server.file_path {
            return true;
        }

        let Some(analysis_name) = server.analysis_file_name.as_deref() else {
            return false;
        };

        match self.analysis_type {
            AnalysisType::Xr | AnalysisType::Dom => {
                let stem = file_stem(&self.file_path);
                !stem.is_empty() && (analysis_name == stem || analysis_name.contains(stem.as_str()))
            }
            AnalysisType::Directory => analysis_name
                .strip_prefix(DIRECTORY_PREFIX)
                .is_some_and(|dir| dir == self.file_name),
            AnalysisType::Static => false,
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// In-memory session registry keyed by `(file path, analysis type)`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<(PathBuf, AnalysisType), AnalysisSession>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, replacing any existing one for the same file and type.
    pub fn add_session(
        &self,
        file_path: impl Into<PathBuf>,
        analysis_type: AnalysisType,
        server_id: Option<String>,
    ) -> String {
        let file_path = file_path.into();
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("session-{}-{}", Utc::now().timestamp_millis(), seq);
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let session = AnalysisSession {
            id: id.clone(),
            file_path: file_path.clone(),
            file_name,
            analysis_type,
            server_id,
            created: Utc::now(),
        };

        let replaced = self
            .sessions
            .write()
            .insert((file_path, analysis_type), session);
        if let Some(old) = replaced {
            debug!(old = %old.id, new = %id, "replaced analysis session");
        }
        id
    }

    /// Remove a session by id. Returns whether one was removed.
    pub fn remove_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.id != id);
        before != sessions.len()
    }

    pub fn get_session(&self, file_path: &Path, analysis_type: AnalysisType) -> Option<AnalysisSession> {
        self.sessions
            .read()
            .get(&(file_path.to_path_buf(), analysis_type))
            .cloned()
    }

    pub fn all_sessions(&self) -> Vec<AnalysisSession> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn clear_all_sessions(&self) {
        self.sessions.write().clear();
    }
}

impl SessionHook for SessionRegistry {
    fn remove_sessions_for(&self, server: &ServerInstance) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_bound_to(server));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(server_id = %server.id, removed, "removed analysis sessions");
        }
        removed
    }
}
