// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication and error-code mapping.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::{AuthMethod, RemoteConfig};
use crate::error::{ErrorCode, RemoteError};

/// HTTP client for remote store requests.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: RemoteConfig,
}

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl From<ErrorBody> for RemoteError {
    fn from(body: ErrorBody) -> Self {
        Self::Server {
            code: body.code,
            message: body.message,
            field: body.field,
        }
    }
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    /// Joins a path onto the configured base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint_root(), path.trim_start_matches('/'))
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::ApiKey { header, key } => {
                req = req.header(header.as_str(), key.as_str());
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Executes a request and maps error responses onto [`ErrorCode`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or returns an error status code.
    pub async fn execute(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = req.send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
            return Err(body.into());
        }

        Err(RemoteError::server(code_for_status(status), format!("{status}: {text}")))
    }
}

/// Fallback mapping for error responses without a JSON error body.
pub fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorCode::UnknownItem,
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ErrorCode::ServerRecordChanged,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RequestRateLimited,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ErrorCode::ServiceUnavailable
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::NotAuthenticated,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::InvalidArguments,
        _ => ErrorCode::Other,
    }
}
