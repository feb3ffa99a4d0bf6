//! Endpoint configuration for the HTTP gateway.

use std::time::Duration;

use crate::error::{FunctionsError, Result};

const FUNCTIONS_URL_ENV: &str = "TOKENBOARD_FUNCTIONS_URL";
const DOCUMENTS_URL_ENV: &str = "TOKENBOARD_DOCUMENTS_URL";
const POLL_INTERVAL_ENV: &str = "TOKENBOARD_POLL_INTERVAL_MS";
const REQUEST_TIMEOUT_ENV: &str = "TOKENBOARD_REQUEST_TIMEOUT_SECS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the board functions and documents live, and how often to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionsConfig {
    /// Base URL of the callable functions (`{functions_url}/{name}`).
    pub functions_url: String,
    /// Base URL of the board documents (`{documents_url}/boards/{id}`).
    pub documents_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

fn normalize_url(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches('/');
    (!value.is_empty()).then(|| value.to_string())
}

impl FunctionsConfig {
    pub fn new(functions_url: &str) -> Result<Self> {
        let functions_url = normalize_url(functions_url)
            .ok_or_else(|| FunctionsError::invalid_request("functions URL is empty"))?;
        Ok(Self {
            documents_url: functions_url.clone(),
            functions_url,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn with_documents_url(mut self, documents_url: &str) -> Self {
        if let Some(url) = normalize_url(documents_url) {
            self.documents_url = url;
        }
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Read the configuration from `TOKENBOARD_*` environment variables.
    ///
    /// `TOKENBOARD_FUNCTIONS_URL` is required; the others fall back to
    /// defaults when unset or unparsable.
    pub fn from_env() -> Result<Self> {
        let functions_url = std::env::var(FUNCTIONS_URL_ENV).unwrap_or_default();
        if normalize_url(&functions_url).is_none() {
            return Err(FunctionsError::invalid_request(format!(
                "{} not configured. Board functions are disabled.",
                FUNCTIONS_URL_ENV
            )));
        }

        let mut config = Self::new(&functions_url)?;
        if let Ok(documents_url) = std::env::var(DOCUMENTS_URL_ENV) {
            config = config.with_documents_url(&documents_url);
        }
        if let Some(ms) = parse_env_u64(POLL_INTERVAL_ENV) {
            config.poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(secs) = parse_env_u64(REQUEST_TIMEOUT_ENV) {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[Functions] Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}
