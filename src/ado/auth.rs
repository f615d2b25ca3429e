//! Azure DevOps Authentication
//!
//! Personal access token credentials and environment discovery of the
//! organization and project to work against.

use anyhow::{Context, Result};
use std::fmt;

pub const ENV_ORGANIZATION: &str = "ADO_ORG";
pub const ENV_PROJECT: &str = "ADO_PROJECT";
pub const ENV_EMAIL: &str = "ADO_EMAIL";
pub const ENV_PAT: &str = "ADO_PAT";

/// Email + personal access token pair, sent as HTTP basic auth
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pat: String,
}

impl Credentials {
    pub fn new(email: &str, pat: &str) -> Self {
        Self {
            email: email.to_string(),
            pat: pat.to_string(),
        }
    }

    /// Read credentials from `ADO_EMAIL` (optional, falls back to `fallback_email`) and `ADO_PAT`
    pub fn from_env(fallback_email: Option<&str>) -> Result<Self> {
        let pat = std::env::var(ENV_PAT)
            .with_context(|| format!("{} is not set. Create a personal access token and export it", ENV_PAT))?;

        let email = std::env::var(ENV_EMAIL)
            .ok()
            .or_else(|| fallback_email.map(|s| s.to_string()))
            .unwrap_or_default();

        Ok(Self::new(&email, &pat))
    }

    pub fn pat(&self) -> &str {
        &self.pat
    }
}

impl fmt::Debug for Credentials {
    // Security: never print the token
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("pat", &"***")
            .finish()
    }
}

/// Validate an organization name
/// 1-50 characters, ASCII letters, digits and hyphens, cannot start or end with a hyphen
pub fn validate_organization(org: &str) -> bool {
    if org.is_empty() || org.len() > 50 {
        return false;
    }
    if org.starts_with('-') || org.ends_with('-') {
        return false;
    }
    org.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Validate a project name
/// Rejects names the service refuses: empty, over 64 chars, reserved characters,
/// leading underscore or trailing dot
pub fn validate_project(project: &str) -> bool {
    const RESERVED: &[char] = &[
        '/', '\\', ':', '*', '?', '"', '<', '>', ';', '#', '$', '{', '}', ',', '+', '=', '[', ']',
        '|', '%', '&',
    ];

    if project.is_empty() || project.chars().count() > 64 {
        return false;
    }
    if project.starts_with('_') || project.ends_with('.') {
        return false;
    }
    !project.chars().any(|c| c.is_control() || RESERVED.contains(&c))
}

/// Read the default organization from the environment
/// Security: Validates the name before returning
pub fn get_default_organization() -> Option<String> {
    let org = std::env::var(ENV_ORGANIZATION).ok()?;
    if validate_organization(&org) {
        return Some(org);
    }
    tracing::warn!("Invalid organization name in {}", ENV_ORGANIZATION);
    None
}

/// Read the default project from the environment
pub fn get_default_project() -> Option<String> {
    let project = std::env::var(ENV_PROJECT).ok()?;
    if validate_project(&project) {
        return Some(project);
    }
    tracing::warn!("Invalid project name in {}", ENV_PROJECT);
    None
}
