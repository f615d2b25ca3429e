//! Azure DevOps API interaction module
//!
//! This module provides the transport-level plumbing for talking to the
//! Azure DevOps REST API: credentials, the HTTP session and URL construction.
//!
//! # Module Structure
//!
//! - [`auth`] - Personal access token credentials and environment discovery
//! - [`client`] - Client binding a transport to an organization and project
//! - [`http`] - The `Transport` contract and its reqwest implementation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adokit::ado::{auth::Credentials, client::AdoClient, http::AdoHttpClient};
//!
//! fn example() -> adokit::Result<AdoClient> {
//!     let http = AdoHttpClient::new(Credentials::new("me@example.com", "pat"))?;
//!     Ok(AdoClient::new(Arc::new(http), "contoso", "Fabrikam"))
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
