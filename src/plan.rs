//! Plan mode
//!
//! A planning session validates and renders every mutation exactly as it
//! would send it, then records the request here instead of issuing it.
//! Reads still go to the service.

use crate::resource::record::Identity;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    Create,
    Update,
    Delete,
}

/// One request a real session would have made
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub action: PlannedAction,
    pub kind: String,
    /// Placeholder for creates the backend has not numbered yet
    pub identity: Identity,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Ordered log of planned changes
#[derive(Debug, Default)]
pub struct Plan {
    changes: Mutex<Vec<PlannedChange>>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PlannedChange>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, change: PlannedChange) {
        tracing::info!(
            "[plan] {:?} {} {}: {} {}",
            change.action,
            change.kind,
            change.identity,
            change.method,
            change.url
        );
        self.lock().push(change);
    }

    /// Changes in the order they were planned
    pub fn changes(&self) -> Vec<PlannedChange> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
