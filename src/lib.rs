//! adokit
//!
//! Uniform lifecycle management for Azure DevOps resources: one CRUD contract
//! for every resource kind, a session ledger of what was created so it can be
//! torn down, a single-flight read cache, and polling of long-running builds
//! and pipeline runs.
//!
//! ```ignore
//! use std::sync::Arc;
//! use adokit::{ado::client::AdoClient, Session};
//!
//! let session = Arc::new(Session::new(client));
//! let repo = session.manager("repositories")?.create(params).await?;
//! // ...
//! let report = session.revert_all().await;
//! ```

pub mod ado;
pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod ledger;
pub mod plan;
pub mod resource;
pub mod session;

pub use error::{AdoError, Result};
pub use job::{JobOutcome, JobSpec, JobStatus};
pub use plan::{PlannedAction, PlannedChange};
pub use resource::{Identity, ResourceManager, ResourceRecord};
pub use session::{CleanupReport, Session};
