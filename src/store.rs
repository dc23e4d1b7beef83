//! Conversation log: a JSON array of entries on disk.
//!
//! The log is a best-effort sink. [`ConversationLog::read_all`] never fails:
//! a missing or malformed file reads as an empty log. Writes that fail are
//! logged and dropped so a broken disk never costs the caller a reply.
//!
//! Each append rewrites the whole file (pretty-printed). An internal mutex
//! serialises read-modify-write cycles within the process.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conversation::Role;
use crate::error::AppError;

/// Placeholder for a missing call id or caller number.
pub const UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub call_sid: String,
    pub caller_number: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl LogEntry {
    pub fn now(call: &CallInfo, role: Role, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            call_sid: call.call_sid.clone(),
            caller_number: call.caller_number.clone(),
            role,
            content: content.into(),
            audio_url: None,
        }
    }

    pub fn with_audio_url(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url;
        self
    }
}

/// Who an exchange belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub call_sid: String,
    pub caller_number: String,
}

impl CallInfo {
    /// Blank values are replaced by [`UNKNOWN`].
    pub fn new(call_sid: Option<&str>, caller_number: Option<&str>) -> Self {
        let or_unknown = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            call_sid: or_unknown(call_sid),
            caller_number: or_unknown(caller_number),
        }
    }

    pub fn console() -> Self {
        Self { call_sid: "console".into(), caller_number: "local".into() }
    }
}

#[derive(Debug)]
pub struct ConversationLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationLog {
    /// Open the log at `path`, creating its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. Missing or unreadable files yield `[]`.
    pub async fn read_all(&self) -> Vec<LogEntry> {
        read_entries(&self.path).await
    }

    /// Append the user entry and the assistant entry of one exchange.
    pub async fn record_exchange(&self, user: LogEntry, assistant: LogEntry) {
        self.append(vec![user, assistant]).await;
    }

    pub async fn append(&self, new_entries: Vec<LogEntry>) {
        let _guard = self.write_lock.lock().await;

        let mut entries = read_entries(&self.path).await;
        let added = new_entries.len();
        entries.extend(new_entries);

        let data = match serde_json::to_string_pretty(&entries) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "cannot serialise conversation log");
                return;
            }
        };

        match tokio::fs::write(&self.path, data).await {
            Ok(()) => debug!(path = %self.path.display(), added, total = entries.len(), "conversation log written"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot write conversation log"),
        }
    }
}

async fn read_entries(path: &Path) -> Vec<LogEntry> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read conversation log");
            return Vec::new();
        }
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "malformed conversation log, treating as empty");
        Vec::new()
    })
}
