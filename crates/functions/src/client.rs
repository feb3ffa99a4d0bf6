//! HTTP client for the board cloud functions and board documents.

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::sync::{Arc, RwLock};

use tokenboard_core::boards::{BoardCall, BoardDocument, BoardId};

use crate::config::FunctionsConfig;
use crate::error::{FunctionsError, Result};
use crate::types::{CallableRequest, CallableResponse};

const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the board callable functions.
///
/// Every request carries the current id token as a bearer token when one is
/// set. Clones share the token.
#[derive(Debug, Clone)]
pub struct BoardFunctionsClient {
    client: reqwest::Client,
    functions_url: String,
    documents_url: String,
    id_token: Arc<RwLock<Option<String>>>,
}

impl BoardFunctionsClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Functions] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Functions] Response error ({}): {}", status, preview);
    }

    pub fn new(config: &FunctionsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            functions_url: config.functions_url.clone(),
            documents_url: config.documents_url.clone(),
            id_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Replace the id token sent with every request. `None` signs out.
    pub fn set_id_token(&self, token: Option<String>) {
        *self.id_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let token = self
            .id_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(token) = token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| FunctionsError::auth("Invalid id token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    /// Parse a callable response envelope into its `result` value.
    async fn parse_callable(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        let envelope = serde_json::from_str::<CallableResponse>(&body);
        if let Ok(CallableResponse {
            error: Some(error), ..
        }) = &envelope
        {
            return Err(FunctionsError::callable(
                error.status.clone(),
                error.message.clone(),
            ));
        }
        if !status.is_success() {
            return Err(FunctionsError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        Ok(envelope?.result.unwrap_or(serde_json::Value::Null))
    }

    /// Invoke callable function `name` with `payload` as its data.
    ///
    /// POST {functions_url}/{name}
    pub async fn call_function<T: Serialize>(
        &self,
        name: &str,
        payload: &T,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.functions_url, name);
        debug!("[Functions] Calling {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&CallableRequest { data: payload })
            .send()
            .await?;

        Self::parse_callable(response).await
    }

    /// Run a board mutation remotely.
    pub async fn call(&self, call: &BoardCall) -> Result<()> {
        self.call_function(call.function_name(), call).await?;
        Ok(())
    }

    /// Fetch the current board document.
    ///
    /// GET {documents_url}/boards/{boardId}
    pub async fn fetch_board(&self, board_id: &BoardId) -> Result<BoardDocument> {
        let url = format!(
            "{}/boards/{}",
            self.documents_url,
            urlencoding::encode(board_id.as_str())
        );

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        if !status.is_success() {
            return Err(FunctionsError::api(
                status.as_u16(),
                format!("Failed to fetch board {}: {}", board_id, body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "[Functions] Failed to decode board {}. Error: {}",
                board_id,
                e
            );
            FunctionsError::Json(e)
        })
    }
}
