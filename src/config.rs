//! Configuration Management
//!
//! Handles persistent configuration storage for adokit. The PAT is never
//! stored here; it only comes from the environment.

use crate::ado::auth;
use crate::ado::client::DEFAULT_BASE_URL;
use crate::session::DEFAULT_POLL_INTERVAL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    /// Account the PAT belongs to
    #[serde(default)]
    pub email: Option<String>,
    /// Service root, for on-premises servers
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Where the state ledger is persisted
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("adokit").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {:?}: {:#}", path, e);
                Self::default()
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config {:?}", path))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing config {:?}", path))?;

        Ok(())
    }

    /// Get effective organization (env > config)
    pub fn effective_organization(&self) -> Option<String> {
        auth::get_default_organization().or_else(|| {
            self.organization
                .clone()
                .filter(|org| auth::validate_organization(org))
        })
    }

    /// Get effective project (env > config)
    pub fn effective_project(&self) -> Option<String> {
        auth::get_default_project().or_else(|| {
            self.project
                .clone()
                .filter(|project| auth::validate_project(project))
        })
    }

    /// Get effective email (env > config)
    pub fn effective_email(&self) -> Option<String> {
        std::env::var(auth::ENV_EMAIL)
            .ok()
            .filter(|e| !e.is_empty())
            .or_else(|| self.email.clone())
    }

    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Configured state file, or `state.json` next to the config file
    pub fn effective_state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_file)
    }

    /// Set organization, rejecting names the service would refuse.
    /// Call [`Config::save`] to persist.
    pub fn set_organization(&mut self, organization: &str) -> Result<()> {
        anyhow::ensure!(
            auth::validate_organization(organization),
            "invalid organization name: {}",
            organization
        );
        self.organization = Some(organization.to_string());
        Ok(())
    }

    /// Set project, rejecting names the service would refuse
    pub fn set_project(&mut self, project: &str) -> Result<()> {
        anyhow::ensure!(
            auth::validate_project(project),
            "invalid project name: {}",
            project
        );
        self.project = Some(project.to_string());
        Ok(())
    }
}

fn default_state_file() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("adokit").join("state.json");
    }
    PathBuf::from("adokit-state.json")
}
