//! Resource Fetcher
//!
//! Handles fetching resource collections based on resource definitions,
//! following continuation tokens until the backend reports no more pages.

use super::registry::ResourceDef;
use crate::ado::client::AdoClient;
use crate::ado::http::TransportResponse;
use crate::error::{AdoError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Upper bound on pages followed for one listing
const MAX_PAGES: usize = 1000;

/// Result of paginated fetch
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Fetch all items of a kind (auto-paginate), in backend order
pub async fn fetch_resources(
    client: &AdoClient,
    kind: &str,
    def: &ResourceDef,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<Value>> {
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let result =
            fetch_resources_paginated(client, kind, def, vars, page_token.as_deref()).await?;
        all_items.extend(result.items);

        if result.next_token.is_none() {
            return Ok(all_items);
        }
        page_token = result.next_token;
    }

    tracing::warn!("Stopped listing {} after {} pages", kind, MAX_PAGES);
    Ok(all_items)
}

/// Fetch one page of a kind
pub async fn fetch_resources_paginated(
    client: &AdoClient,
    kind: &str,
    def: &ResourceDef,
    vars: &BTreeMap<String, String>,
    page_token: Option<&str>,
) -> Result<PaginatedResult> {
    let mut query: Vec<(&str, &str)> = def
        .list_query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if let Some(token) = page_token {
        query.push(("continuationToken", token));
    }

    let url = client.resource_url(&def.list_path, vars, &def.api_version, &query)?;
    let response = client.get(&url).await?;

    if !response.is_success() {
        return Err(read_error(kind, &def.display_name, &response));
    }

    let items = extract_items(&response.body, &def.response_path);

    // Builds and a few others send the token as a header, most list bodies carry it
    let next_token = response.continuation_token.clone().or_else(|| {
        response
            .body
            .get("continuationToken")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    });

    Ok(PaginatedResult { items, next_token })
}

/// Map a failed read to the error taxonomy
pub fn read_error(kind: &str, identifier: &str, response: &TransportResponse) -> AdoError {
    if response.is_not_found() {
        return AdoError::not_found(kind, identifier);
    }
    if response.is_permission_denied() {
        return AdoError::Permission {
            status: response.status,
            message: response.backend_message(),
        };
    }
    AdoError::transport(format!(
        "reading {} failed ({}): {}",
        kind,
        response.status,
        response.backend_message()
    ))
}

/// Extract items from response using the response_path
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    lookup_path(response, path)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Follow a dot-notation path (numeric segments index arrays)
pub fn lookup_path<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;

    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    Some(current)
}
