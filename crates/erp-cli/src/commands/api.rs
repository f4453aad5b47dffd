//! Raw authenticated API access.

use crate::output;
use anyhow::{bail, Result};
use serde_json::Value;
use session_engine::{AuthFacade, Method, PendingRequest};

/// GET an API path with the stored session and print the JSON result.
///
/// The response envelope is unwrapped unless `raw` is set.
pub async fn get(facade: &AuthFacade, path: &str, query: &[String], raw: bool) -> Result<()> {
    let path = normalize_path(path);
    let request = parse_query(query)?
        .into_iter()
        .fold(PendingRequest::new(Method::GET, path), |req, (k, v)| {
            req.query(k, v)
        });

    let client = facade.client();
    let body = if raw {
        client.request_value(request).await?
    } else {
        client.request::<Value>(request).await?
    };

    output::print_json(&body)
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_query(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => bail!("Invalid query parameter '{}', expected key=value", pair),
        })
        .collect()
}
