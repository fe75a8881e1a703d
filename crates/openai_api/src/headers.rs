use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ApiConfig;
use crate::error::ApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_ORGANIZATION: &str = "openai-organization";

pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";
pub const ACCEPT_JSON: &str = "application/json";

/// Build a deterministic header map for one request.
pub fn build_headers(config: &ApiConfig, accept: &str) -> Result<BTreeMap<String, String>, ApiError> {
    if config.bearer_token.trim().is_empty() {
        return Err(ApiError::MissingBearerToken);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_AUTHORIZATION.to_owned(),
        format!("Bearer {}", config.bearer_token.trim()),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), accept.to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    if let Some(organization) = config.organization.as_deref() {
        if !organization.trim().is_empty() {
            headers.insert(HEADER_ORGANIZATION.to_owned(), organization.trim().to_owned());
        }
    }

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

/// Convert the deterministic map into a reqwest `HeaderMap`.
pub fn header_map(config: &ApiConfig, accept: &str) -> Result<HeaderMap, ApiError> {
    let headers = build_headers(config, accept)?;
    let mut out = HeaderMap::new();
    for (key, value) in headers {
        out.insert(
            HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ApiError::InvalidBaseUrl(format!("invalid header key: {key}")))?,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::InvalidBaseUrl(format!("invalid header value for {key}")))?,
        );
    }
    Ok(out)
}
