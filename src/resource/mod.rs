//! Resource abstraction layer
//!
//! Every resource kind shares one lifecycle contract, implemented once in
//! [`manager`] and parametrized by per-kind data. Definitions are loaded from
//! JSON files embedded at compile time, so a new kind is a registry entry
//! rather than new code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`fetcher`] - Lists resources with continuation-token pagination
//! - [`record`] - Identity and field map of one remote object
//! - [`manager`] - create / get / update / delete through the session cache and ledger
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `core.json` - projects, teams, agent pools
//! - `git.json` - repositories, branches, commits, pull requests
//! - `pipelines.json` - build definitions, builds, pipelines, runs, environments, variable groups
//!
//! # Example
//!
//! ```ignore
//! let repos = session.manager("repositories")?;
//! let repo = repos.create(params).await?;
//! let prs = session.manager("pull-requests")?.scoped("repository_id", &repo.identity);
//! for pr in prs.get_all().await? {
//!     println!("{}", pr.identity);
//! }
//! ```

pub mod fetcher;
pub mod manager;
pub mod record;
pub mod registry;

pub use manager::ResourceManager;
pub use record::{Identity, ResourceRecord};
pub use registry::{get_all_resource_keys, get_resource, ResourceDef};
