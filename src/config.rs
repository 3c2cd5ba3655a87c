//! Configuration for the HTTP transport

use crate::error::{Result, UploadError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default slice size used to meter upload progress (64 KiB)
pub const DEFAULT_PROGRESS_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration for [`crate::transport::HttpTransport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransportConfig {
    /// Base URL that relative upload targets are resolved against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Total request timeout in seconds (default: none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Connect timeout in seconds (default: 30)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Keep cookies between credentialed requests
    pub cookie_store: bool,

    /// Sent as `Authorization: Bearer ...` on credentialed requests only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Slice size used to meter upload progress
    pub progress_chunk_size: usize,

    /// Headers added to every request by the client
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub default_headers: BTreeMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: None,
            connect_timeout_secs: Some(30),
            user_agent: None,
            cookie_store: true,
            bearer_token: None,
            progress_chunk_size: DEFAULT_PROGRESS_CHUNK_SIZE,
            default_headers: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: TransportConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn progress_chunk_size(mut self, size: usize) -> Self {
        self.progress_chunk_size = size;
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_chunk_size == 0 {
            return Err(UploadError::config_error(
                "progress-chunk-size must be greater than 0",
            ));
        }

        if self.timeout_secs == Some(0) {
            return Err(UploadError::config_error("timeout-secs must be greater than 0"));
        }

        if self.connect_timeout_secs == Some(0) {
            return Err(UploadError::config_error(
                "connect-timeout-secs must be greater than 0",
            ));
        }

        if let Some(base) = &self.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(UploadError::config_error(format!(
                    "base-url must be an http(s) URL, got '{}'",
                    base
                )));
            }
        }

        Ok(())
    }
}
