//! State Ledger
//!
//! Ordered log of the resources this session created and has not deleted
//! yet. Teardown walks it newest first so dependents go before their owners.
//!
//! When a state file is attached the ledger is rewritten after every change,
//! letting a later process finish a teardown this one could not. Writes happen
//! outside the entries lock, serialized so the file always ends with the
//! newest snapshot.

use crate::error::{AdoError, Result};
use crate::resource::record::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One created resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: String,
    pub identity: Identity,
    /// Template variables the resource was addressed with
    #[serde(default)]
    pub scope: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(kind: &str, identity: Identity, scope: BTreeMap<String, String>) -> Self {
        Self {
            kind: kind.to_string(),
            identity,
            scope,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    entries: Vec<LedgerEntry>,
}

/// Session record of created-but-not-yet-deleted resources
#[derive(Debug, Default)]
pub struct StateLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl StateLedger {
    /// In-memory ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger persisted to `path`, resuming any entries already stored there
    pub fn with_state_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            load_entries(&path)?
        } else {
            Vec::new()
        };

        if !entries.is_empty() {
            tracing::info!("Resumed {} ledger entries from {:?}", entries.len(), path);
        }

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
            writer: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a created resource
    pub fn add(&self, entry: LedgerEntry) {
        tracing::debug!("ledger add {} {}", entry.kind, entry.identity);
        self.lock().push(entry);
        self.persist();
    }

    /// Forget a resource, returning whether it was tracked
    pub fn remove(&self, kind: &str, identity: &Identity) -> bool {
        {
            let mut entries = self.lock();
            let Some(pos) = entries
                .iter()
                .position(|e| e.kind == kind && &e.identity == identity)
            else {
                return false;
            };
            entries.remove(pos);
        }

        tracing::debug!("ledger remove {} {}", kind, identity);
        self.persist();
        true
    }

    /// Forget every resource of `kind` whose scope maps `param` to `owner`
    pub fn remove_owned(&self, kind: &str, param: &str, owner: &str) -> usize {
        let removed = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|e| {
                !(e.kind == kind && e.scope.get(param).map(|v| v.as_str()) == Some(owner))
            });
            before - entries.len()
        };
        if removed > 0 {
            tracing::debug!("ledger dropped {} {} owned by {}", removed, kind, owner);
            self.persist();
        }
        removed
    }

    pub fn contains(&self, kind: &str, identity: &Identity) -> bool {
        self.lock()
            .iter()
            .any(|e| e.kind == kind && &e.identity == identity)
    }

    /// Entries in creation order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().clone()
    }

    /// Entries newest first, the order teardown deletes them in
    pub fn teardown_order(&self) -> Vec<LedgerEntry> {
        let mut entries = self.entries();
        entries.reverse();
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.entries();
        if let Err(e) = write_entries(path, &snapshot) {
            tracing::warn!("Failed to write state file {:?}: {}", path, e);
        }
    }
}

fn load_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AdoError::Persistence(format!("reading {:?}: {}", path, e)))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: LedgerFile = serde_json::from_str(&content)
        .map_err(|e| AdoError::Persistence(format!("parsing {:?}: {}", path, e)))?;
    Ok(file.entries)
}

fn write_entries(path: &Path, entries: &[LedgerEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AdoError::Persistence(format!("creating {:?}: {}", parent, e)))?;
        }
    }

    let file = LedgerFile {
        entries: entries.to_vec(),
    };
    let content = serde_json::to_string_pretty(&file)
        .map_err(|e| AdoError::Persistence(e.to_string()))?;
    std::fs::write(path, content)
        .map_err(|e| AdoError::Persistence(format!("writing {:?}: {}", path, e)))
}
