use std::collections::BTreeMap;
use std::time::Duration;

use turn_provider::ToolSpec;

use crate::url::DEFAULT_BASE_URL;

/// Resolved transport configuration for one endpoint.
///
/// Configuration-file merging and credential lookup happen upstream; this
/// struct only carries their resolved values.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Bearer token passed to `Authorization`.
    pub bearer_token: String,
    /// Base URL the protocol paths are appended to.
    pub base_url: String,
    /// Optional `OpenAI-Organization` header value.
    pub organization: Option<String>,
    /// Tool definitions advertised on every request.
    pub tools: Vec<ToolSpec>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout.
    pub timeout: Option<Duration>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            bearer_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            tools: Vec::new(),
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ApiConfig {
    pub fn new(model: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            bearer_token: bearer_token.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
