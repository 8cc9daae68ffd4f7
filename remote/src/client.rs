// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP/JSON driver for a REST-shaped document store.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::http::{ErrorBody, HttpClient};
use crate::query::{Query, QueryCursor, QueryPage};
use crate::store::{ChangeSet, DeletedRecord, ModifyRequest, ModifyResponse, RemoteStore};
use crate::types::{ChangeToken, Record, RecordId, ZoneId};

/// Remote store driver speaking JSON over HTTP.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use trailsync_remote::{AuthMethod, Executor, HttpRemoteStore, RemoteConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RemoteConfig {
///     base_url: "https://sync.example.com/api/v1".to_string(),
///     auth: AuthMethod::Bearer {
///         token: "secret".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let store = HttpRemoteStore::new(config)?;
/// let executor = Executor::new(Arc::new(store), 50);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    http: Arc<HttpClient>,
}

impl HttpRemoteStore {
    /// Creates a new driver.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let http = HttpClient::new(config)?;
        Ok(Self {
            http: Arc::new(http),
        })
    }

    fn record_url(&self, id: &RecordId) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.http.url("records"))
            .map_err(|e| RemoteError::Config(format!("Invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Config("base_url cannot be a base".to_string()))?
            .push(id.zone())
            .push(id.name());
        Ok(url)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.http.url(path);
        let resp = self
            .http
            .execute(self.http.build_request(Method::POST, &url).json(body))
            .await?;
        Ok(resp.json().await?)
    }
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a Query,
    cursor: Option<&'a QueryCursor>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    cursor: Option<QueryCursor>,
}

#[derive(Debug, Serialize)]
struct ChangesBody<'a> {
    token: Option<&'a ChangeToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangesReply {
    #[serde(default)]
    changed: Vec<Record>,
    #[serde(default)]
    deleted: Vec<DeletedReply>,
    token: ChangeToken,
    #[serde(default)]
    more_coming: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedReply {
    id: RecordId,
    record_type: String,
}

#[derive(Debug, Serialize)]
struct ModifyBody<'a> {
    saves: &'a [Record],
    deletes: &'a [RecordId],
    atomic: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModifyReply {
    #[serde(default)]
    saved: Vec<ItemReply>,
    #[serde(default)]
    deleted: Vec<ItemReply>,
}

#[derive(Debug, Deserialize)]
struct ItemReply {
    id: RecordId,
    #[serde(default)]
    record: Option<Record>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn query(
        &self,
        query: &Query,
        cursor: Option<&QueryCursor>,
        limit: usize,
    ) -> Result<QueryPage, RemoteError> {
        let body = QueryBody {
            query,
            cursor,
            limit,
        };
        let reply: QueryReply = self.post("records/query", &body).await?;
        Ok(QueryPage {
            records: reply.records,
            cursor: reply.cursor,
        })
    }

    async fn fetch_changes(
        &self,
        zone: &ZoneId,
        token: Option<&ChangeToken>,
    ) -> Result<ChangeSet, RemoteError> {
        let mut url = Url::parse(&self.http.url("zones"))
            .map_err(|e| RemoteError::Config(format!("Invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Config("base_url cannot be a base".to_string()))?
            .push(zone)
            .push("changes");

        let resp = self
            .http
            .execute(
                self.http
                    .build_request(Method::POST, url.as_str())
                    .json(&ChangesBody { token }),
            )
            .await?;
        let reply: ChangesReply = resp.json().await?;

        Ok(ChangeSet {
            changed: reply.changed,
            deleted: reply
                .deleted
                .into_iter()
                .map(|d| DeletedRecord {
                    id: d.id,
                    record_type: d.record_type,
                })
                .collect(),
            token: reply.token,
            more_coming: reply.more_coming,
        })
    }

    async fn modify(&self, request: ModifyRequest) -> Result<ModifyResponse, RemoteError> {
        let body = ModifyBody {
            saves: &request.saves,
            deletes: &request.deletes,
            atomic: request.atomic,
        };
        let reply: ModifyReply = self.post("records/modify", &body).await?;

        let saved = reply
            .saved
            .into_iter()
            .map(|item| {
                let result = match (item.record, item.error) {
                    (_, Some(err)) => Err(err.into()),
                    (Some(record), None) => Ok(record),
                    (None, None) => Err(RemoteError::InvalidResponse(format!(
                        "save of {} returned neither record nor error",
                        item.id
                    ))),
                };
                (item.id, result)
            })
            .collect();

        let deleted = reply
            .deleted
            .into_iter()
            .map(|item| {
                let result = item.error.map_or(Ok(()), |err| Err(err.into()));
                (item.id, result)
            })
            .collect();

        Ok(ModifyResponse { saved, deleted })
    }

    async fn fetch(&self, id: &RecordId) -> Result<Record, RemoteError> {
        let url = self.record_url(id)?;
        let resp = self
            .http
            .execute(self.http.build_request(Method::GET, url.as_str()))
            .await?;
        Ok(resp.json().await?)
    }

    async fn overwrite(&self, record: Record) -> Result<Record, RemoteError> {
        let url = self.record_url(record.id())?;
        let resp = self
            .http
            .execute(self.http.build_request(Method::PUT, url.as_str()).json(&record))
            .await?;
        Ok(resp.json().await?)
    }
}
