//! ARA REST API client.
//!
//! Implements the four record store operations against `/api/v1/plays`
//! and `/api/v1/records`.

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{NewRecord, OwnerId, RecordId, RecordUpdate, RemoteRecord, RunToken};
use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings for the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the ARA API server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Verify the server's TLS certificate.
    #[serde(default)]
    pub verify_tls: bool,

    /// Per-request timeout. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            verify_tls: false,
            timeout_seconds: None,
            username: None,
            password: None,
        }
    }
}

pub fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

/// HTTP record store speaking the ARA API.
pub struct AraClient {
    config: StoreConfig,
    http_client: reqwest::Client,
}

impl AraClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        info!("Using record store at {}", config.endpoint);
        if !config.verify_tls {
            debug!("TLS certificate verification disabled");
        }

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(!config.verify_tls);
        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let http_client = builder
            .build()
            .map_err(|source| StoreError::RemoteUnavailable {
                operation: "build client",
                source,
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.config.endpoint.trim_end_matches('/'),
            path
        )
    }

    /// Send a request and decode the JSON body of a 2xx response.
    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, StoreError> {
        let request = match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        };

        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                warn!(
                    "{} timed out after {}s",
                    operation,
                    self.config.timeout_seconds.unwrap_or_default()
                );
            } else if source.is_connect() {
                warn!(
                    "Cannot connect to record store at {}",
                    self.config.endpoint
                );
            }
            StoreError::RemoteUnavailable { operation, source }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| StoreError::RemoteUnavailable { operation, source })?;

        if !status.is_success() {
            return Err(StoreError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        parse_body(operation, &body)
    }
}

#[async_trait]
impl RecordStore for AraClient {
    async fn find_run_owner(&self, run_token: &RunToken) -> Result<OwnerId, StoreError> {
        let body = self
            .send(
                "find run",
                self.http_client
                    .get(self.api_url("plays"))
                    .query(&[("uuid", run_token.0.as_str())]),
            )
            .await?;
        owner_from_plays(&body, run_token)
    }

    async fn find_record(
        &self,
        owner: OwnerId,
        key: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let owner_param = owner.to_string();
        let body = self
            .send(
                "find record",
                self.http_client
                    .get(self.api_url("records"))
                    .query(&[("playbook", owner_param.as_str()), ("key", key)]),
            )
            .await?;

        let Some(id) = first_record_id(&body)? else {
            return Ok(None);
        };

        // the listing omits the value, fetch the full record
        let detail = self
            .send(
                "fetch record",
                self.http_client.get(self.api_url(&format!("records/{}", id))),
            )
            .await?;
        record_from_body("fetch record", detail).map(Some)
    }

    async fn create_record(&self, record: &NewRecord) -> Result<RemoteRecord, StoreError> {
        let body = self
            .send(
                "create record",
                self.http_client.post(self.api_url("records")).json(record),
            )
            .await?;
        record_from_body("create record", body)
    }

    async fn update_record(
        &self,
        id: RecordId,
        update: &RecordUpdate,
    ) -> Result<RemoteRecord, StoreError> {
        let body = self
            .send(
                "update record",
                self.http_client
                    .patch(self.api_url(&format!("records/{}", id)))
                    .json(update),
            )
            .await?;
        record_from_body("update record", body)
    }
}

fn parse_body(operation: &'static str, body: &str) -> Result<Value, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Protocol {
        operation,
        message: format!("invalid JSON body: {}", e),
    })
}

fn missing(operation: &'static str, field: &str) -> StoreError {
    StoreError::Protocol {
        operation,
        message: format!("missing {}", field),
    }
}

/// Owning playbook id of the first play in a `/plays` listing.
fn owner_from_plays(body: &Value, run_token: &RunToken) -> Result<OwnerId, StoreError> {
    let first = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("find run", "results"))?
        .first()
        .ok_or_else(|| StoreError::RunNotFound(run_token.0.clone()))?;

    id_of(first.get("playbook")).ok_or_else(|| missing("find run", "results[0].playbook"))
}

/// Id of the first record in a `/records` listing, or `None` when empty.
fn first_record_id(body: &Value) -> Result<Option<RecordId>, StoreError> {
    let count = body
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| missing("find record", "count"))?;
    if count == 0 {
        return Ok(None);
    }

    body.pointer("/results/0/id")
        .and_then(Value::as_u64)
        .map(Some)
        .ok_or_else(|| missing("find record", "results[0].id"))
}

/// Decode a record body, accepting the playbook as an id or a nested object.
fn record_from_body(operation: &'static str, mut body: Value) -> Result<RemoteRecord, StoreError> {
    if let Some(fields) = body.as_object_mut() {
        if let Some(owner) = id_of(fields.get("playbook")) {
            fields.insert("playbook".to_string(), Value::from(owner));
        }
        for stamp in ["created", "updated"] {
            let parses = fields
                .get(stamp)
                .and_then(Value::as_str)
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
            if !parses {
                fields.remove(stamp);
            }
        }
    }

    serde_json::from_value(body).map_err(|e| StoreError::Protocol {
        operation,
        message: format!("invalid record: {}", e),
    })
}

fn id_of(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Object(fields) => fields.get("id").and_then(Value::as_u64),
        other => other.as_u64(),
    }
}
