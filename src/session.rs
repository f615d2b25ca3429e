//! Session context
//!
//! A session owns everything that lives as long as one unit of work against
//! the service: the client, the result cache and the state ledger. It is
//! created explicitly and torn down explicitly with [`Session::revert_all`].
//!
//! A session in plan mode sends no mutations; see [`crate::plan`].

use crate::ado::client::AdoClient;
use crate::cache::Cache;
use crate::error::{AdoError, Result};
use crate::job::batch::BatchRunner;
use crate::job::engine::PollingEngine;
use crate::ledger::{LedgerEntry, StateLedger};
use crate::plan::Plan;
use crate::resource::manager::ResourceManager;
use crate::resource::record::ResourceRecord;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default interval between job status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What the cache holds for a key
#[derive(Debug, Clone)]
pub enum CachedValue {
    One(ResourceRecord),
    Many(Arc<Vec<ResourceRecord>>),
}

impl CachedValue {
    pub fn into_record(self) -> Result<ResourceRecord> {
        match self {
            Self::One(record) => Ok(record),
            Self::Many(_) => Err(AdoError::Internal("expected one cached record".to_string())),
        }
    }

    pub fn into_records(self) -> Result<Arc<Vec<ResourceRecord>>> {
        match self {
            Self::Many(records) => Ok(records),
            Self::One(_) => Err(AdoError::Internal("expected a cached listing".to_string())),
        }
    }
}

/// Outcome of a best-effort teardown
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<LedgerEntry>,
    /// Kinds the service cannot delete; dropped from the ledger
    pub skipped: Vec<LedgerEntry>,
    pub failures: Vec<(LedgerEntry, AdoError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Session {
    pub id: Uuid,
    client: AdoClient,
    cache: Cache<CachedValue>,
    ledger: StateLedger,
    poll_interval: Duration,
    plan: Option<Plan>,
}

impl Session {
    pub fn new(client: AdoClient) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            cache: Cache::new(),
            ledger: StateLedger::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            plan: None,
        }
    }

    /// Record creates, updates and deletes instead of sending them
    pub fn with_plan_mode(mut self) -> Self {
        self.plan = Some(Plan::new());
        self
    }

    /// Use a prepared ledger (e.g. one backed by a state file)
    pub fn with_ledger(mut self, ledger: StateLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn client(&self) -> &AdoClient {
        &self.client
    }

    pub fn cache(&self) -> &Cache<CachedValue> {
        &self.cache
    }

    pub fn ledger(&self) -> &StateLedger {
        &self.ledger
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The plan being collected, when in plan mode
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn is_planning(&self) -> bool {
        self.plan.is_some()
    }

    /// Manager for one resource kind
    pub fn manager(self: &Arc<Self>, kind: &str) -> Result<ResourceManager> {
        ResourceManager::new(Arc::clone(self), kind)
    }

    /// Polling engine for a long-running kind (builds, pipeline runs)
    pub fn polling_engine(self: &Arc<Self>, kind: &str) -> Result<PollingEngine> {
        PollingEngine::new(self.manager(kind)?)
    }

    pub fn batch_runner(self: &Arc<Self>, kind: &str) -> Result<BatchRunner> {
        Ok(BatchRunner::new(self.polling_engine(kind)?))
    }

    /// Delete everything this session created, newest first.
    ///
    /// Failures are collected, never raised; failed entries stay in the
    /// ledger so a later attempt can retry them. In plan mode the deletes
    /// are only recorded and the ledger is left as it was.
    pub async fn revert_all(self: &Arc<Self>) -> CleanupReport {
        let mut report = CleanupReport::default();
        let entries = self.ledger.teardown_order();
        tracing::info!("[{}] Reverting {} tracked resources", self.id, entries.len());

        for entry in entries {
            // An owner's deletion may already have dropped it
            if !self.ledger.contains(&entry.kind, &entry.identity) {
                continue;
            }

            let manager = match self.manager(&entry.kind) {
                Ok(manager) => manager.with_scope(entry.scope.clone()),
                Err(e) => {
                    report.failures.push((entry, e));
                    continue;
                },
            };

            if !manager.supports_delete() {
                tracing::warn!(
                    "{} {} cannot be deleted, dropping it from the ledger",
                    entry.kind,
                    entry.identity
                );
                if !self.is_planning() {
                    self.ledger.remove(&entry.kind, &entry.identity);
                }
                report.skipped.push(entry);
                continue;
            }

            match manager.delete(&entry.identity).await {
                Ok(()) => report.deleted.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to delete {} {}: {}", entry.kind, entry.identity, e);
                    report.failures.push((entry, e));
                },
            }
        }

        tracing::info!(
            "[{}] Revert finished: {} deleted, {} skipped, {} failed",
            self.id,
            report.deleted.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }
}
