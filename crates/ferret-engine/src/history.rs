//! Durable record of which (node identity, selector) pairs have worked
//! before. The scorer reads a learned boost out of it; the executor feeds
//! every attempt outcome back in. One store is shared by all sessions in a
//! process; writes are serialized and the file is rewritten atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Flat bonus a candidate earns once its pair has any recorded success.
pub const HISTORY_BOOST: f32 = 0.15;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HistoryEntry {
    pub success_count: u32,
    pub failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<u64>,
}

pub struct HistoryStore {
    path: Option<PathBuf>,
    table: Mutex<HashMap<String, HistoryEntry>>,
    /// Serializes file rewrites across sessions sharing this store.
    write_lock: tokio::sync::Mutex<()>,
}

impl HistoryStore {
    /// Open a store at `path`, loading any existing table. A file that no
    /// longer parses is quarantined aside and treated as empty rather than
    /// poisoning every future session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();
        let table = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, HistoryEntry>>(&raw) {
                Ok(table) => table,
                Err(e) => {
                    let quarantine = path.with_extension("corrupt");
                    warn!(
                        "history file {} is corrupt ({e}); moving to {}",
                        path.display(),
                        quarantine.display()
                    );
                    let _ = std::fs::rename(&path, &quarantine);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("history store loaded {} entries", table.len());
        Ok(HistoryStore {
            path: Some(path),
            table: Mutex::new(table),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// In-memory store with no persistence. Used by tests and one-shot
    /// sessions that opt out of learning.
    pub fn ephemeral() -> Self {
        HistoryStore {
            path: None,
            table: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ferret")
            .join("history.json")
    }

    fn key(node_id: &str, selector: &str) -> String {
        format!("{node_id}:{selector}")
    }

    /// Learned bonus for a pair. Must never fail: unknown pairs and any
    /// internal trouble read as zero.
    pub fn boost(&self, node_id: &str, selector: &str) -> f32 {
        let key = Self::key(node_id, selector);
        self.table
            .lock()
            .map(|table| match table.get(&key) {
                Some(entry) if entry.success_count > 0 => HISTORY_BOOST,
                _ => 0.0,
            })
            .unwrap_or(0.0)
    }

    /// Record one attempt outcome and persist the whole table atomically.
    /// Called exactly once per attempted candidate, success or failure.
    pub async fn record(
        &self,
        node_id: &str,
        selector: &str,
        ok: bool,
    ) -> Result<(), HistoryError> {
        let now = unix_now();
        let frozen = {
            let mut table = match self.table.lock() {
                Ok(t) => t,
                Err(poisoned) => poisoned.into_inner(),
            };
            let entry = table.entry(Self::key(node_id, selector)).or_default();
            if ok {
                entry.success_count += 1;
                entry.last_success = Some(now);
            } else {
                entry.failure_count += 1;
                entry.last_failure = Some(now);
            }
            table.clone()
        };
        self.persist(&frozen).await
    }

    pub fn entry(&self, node_id: &str, selector: &str) -> Option<HistoryEntry> {
        let key = Self::key(node_id, selector);
        self.table.lock().ok().and_then(|t| t.get(&key).cloned())
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full rewrite through a temp file in the same directory; the rename
    /// keeps a crash from ever leaving a half-written table behind.
    async fn persist(&self, table: &HashMap<String, HistoryEntry>) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(table)?;
        let tmp = temp_sibling(path);
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
