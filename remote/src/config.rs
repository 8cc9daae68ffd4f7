// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::RemoteError;

/// How requests to the remote store authenticate.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Anonymous access, e.g. a local development server.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// `Authorization: Bearer` with a user or session token.
    Bearer {
        /// Session token.
        token: String,
    },
    /// A static API key sent in a custom header.
    ApiKey {
        /// Header carrying the key.
        #[serde(default = "default_api_key_header")]
        header: String,
        /// The key.
        key: String,
    },
}

fn default_api_key_header() -> String {
    "X-Api-Key".to_string()
}

/// Connection settings of the HTTP remote store driver.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteConfig {
    /// Root of the document store API, e.g. `https://sync.example.com/api/v1`.
    pub base_url: String,

    /// Optional container (database) segment placed between the base URL and
    /// every endpoint path.
    #[serde(default)]
    pub container: Option<String>,

    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("trailsync-remote/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            container: None,
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl RemoteConfig {
    /// Checks the settings before any connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Config`] for an empty base URL, a zero timeout or
    /// an empty credential.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.base_url.trim().is_empty() {
            return Err(RemoteError::Config("base_url is empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(RemoteError::Config("timeout_secs must be positive".to_string()));
        }
        if self.container.as_deref().is_some_and(|c| c.trim_matches('/').is_empty()) {
            return Err(RemoteError::Config("container is empty".to_string()));
        }

        let empty_credential = match &self.auth {
            AuthMethod::None => false,
            AuthMethod::Basic { username, .. } => username.is_empty(),
            AuthMethod::Bearer { token } => token.is_empty(),
            AuthMethod::ApiKey { header, key } => header.is_empty() || key.is_empty(),
        };
        if empty_credential {
            return Err(RemoteError::Config("credential is empty".to_string()));
        }
        Ok(())
    }

    /// The URL every endpoint path is joined onto.
    pub(crate) fn endpoint_root(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.container.as_deref().map(|c| c.trim_matches('/')) {
            Some(container) => format!("{base}/{container}"),
            None => base.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn api_key_header_defaults() {
        let auth: AuthMethod = serde_json::from_str(r#"{"type":"api_key","key":"k"}"#).unwrap();
        assert!(matches!(auth, AuthMethod::ApiKey { ref header, ref key } if header == "X-Api-Key" && key == "k"));
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(config("").validate().is_err());
        assert!(config("https://h").validate().is_ok());

        let zero_timeout = RemoteConfig {
            timeout_secs: 0,
            ..config("https://h")
        };
        assert!(zero_timeout.validate().is_err());

        let empty_token = RemoteConfig {
            auth: AuthMethod::Bearer { token: String::new() },
            ..config("https://h")
        };
        assert!(empty_token.validate().is_err());
    }

    #[test]
    fn container_joins_the_base_url() {
        assert_eq!(config("https://h/api/").endpoint_root(), "https://h/api");

        let with_container = RemoteConfig {
            container: Some("/iCloud.trails/".to_string()),
            ..config("https://h/api/")
        };
        assert_eq!(with_container.endpoint_root(), "https://h/api/iCloud.trails");
    }
}
