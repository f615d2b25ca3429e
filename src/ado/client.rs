//! Azure DevOps Client
//!
//! Main client for interacting with the REST API, combining a transport with
//! the organization/project the session works against.

use super::http::{Transport, TransportResponse};
use crate::error::{AdoError, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";

/// Main Azure DevOps client
#[derive(Clone)]
pub struct AdoClient {
    transport: Arc<dyn Transport>,
    pub organization: String,
    pub project: String,
    pub base_url: String,
}

impl fmt::Debug for AdoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdoClient")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AdoClient {
    /// Create a new client against the public service
    pub fn new(transport: Arc<dyn Transport>, organization: &str, project: &str) -> Self {
        Self {
            transport,
            organization: organization.to_string(),
            project: project.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at another host (on-prem server or a mock)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Issue a request through the transport
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<TransportResponse> {
        self.transport.request(method, url, body).await
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.request(Method::GET, url, None).await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<TransportResponse> {
        self.request(Method::POST, url, body).await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Fill `{project}` and scope placeholders in an endpoint template.
    /// Values are percent-encoded; a placeholder without a value is an error.
    pub fn render_path(&self, template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(AdoError::Registry(format!("unclosed placeholder in {}", template)));
            };
            let name = &after[..end];
            let value = match name {
                "project" => self.project.as_str(),
                "org" => self.organization.as_str(),
                other => vars.get(other).map(|s| s.as_str()).ok_or_else(|| {
                    AdoError::Registry(format!("{} needs a value for {{{}}}", template, other))
                })?,
            };
            rendered.push_str(&urlencoding::encode(value));
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }

    /// Build an absolute organization-scoped API URL with its api-version
    pub fn api_url(&self, path: &str, api_version: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(&self.organization),
            path.trim_start_matches('/')
        ))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("api-version", api_version);
        }

        Ok(url.into())
    }

    /// Render a template and turn it into an absolute URL
    pub fn resource_url(
        &self,
        template: &str,
        vars: &BTreeMap<String, String>,
        api_version: &str,
        query: &[(&str, &str)],
    ) -> Result<String> {
        let path = self.render_path(template, vars)?;
        self.api_url(&path, api_version, query)
    }
}
