//! REST wrappers for the RunningHub HTTP endpoints.
//!
//! Wraps the RunningHub task API (asset upload, task creation, status,
//! outputs, account probe) using [`reqwest`]. Every response arrives in
//! the service's `{code, msg, data}` envelope; `code == 0` is success
//! and a handful of well-known codes carry protocol meaning (queue
//! full, task not found).

use serde::Deserialize;

use prodshot_core::Account;

/// Envelope codes with protocol meaning.
pub mod codes {
    /// Successful call.
    pub const OK: i64 = 0;
    /// The account's remote task queue is at capacity (`TASK_QUEUE_MAXED`).
    /// Not a failure: back off and retry creation.
    pub const TASK_QUEUE_MAXED: i64 = 421;
    /// The referenced task does not exist (expired or never created).
    pub const TASK_NOT_FOUND: i64 = 805;
}

/// HTTP client for the RunningHub API.
pub struct RunningHubApi {
    client: reqwest::Client,
    base_url: String,
}

/// The `{code, msg, data}` envelope every endpoint responds with.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the envelope into its payload, mapping non-zero codes and
    /// a missing payload to [`ApiError`].
    pub fn into_data(self) -> Result<T, ApiError> {
        if self.code != codes::OK {
            return Err(ApiError::Api {
                code: self.code,
                msg: self.msg,
            });
        }
        self.data.ok_or_else(|| {
            ApiError::Malformed("response code 0 but no data field".to_string())
        })
    }
}

/// Payload of a successful upload.
#[derive(Debug, Deserialize)]
pub struct UploadData {
    /// Remote reference for the uploaded asset.
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// Payload of a successful task creation.
#[derive(Debug, Deserialize)]
pub struct CreateData {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// One produced output of a finished task.
#[derive(Debug, Deserialize)]
pub struct TaskOutput {
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "fileType", default)]
    pub file_type: Option<String>,
    /// Remote-reported processing time in seconds. Feeds the freshness
    /// gate: a near-zero value means the service served a cached result.
    #[serde(rename = "taskCostTime", default)]
    pub task_cost_time: Option<f64>,
}

/// Account status probe payload.
#[derive(Debug, Deserialize)]
pub struct AccountStatusData {
    #[serde(rename = "remainCoins", default)]
    pub remain_coins: Option<String>,
    #[serde(rename = "currentTaskCounts", default)]
    pub current_task_counts: Option<String>,
}

/// One entry of the `nodeInfoList` sent on task creation: binds an
/// uploaded file into a workflow input node.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeInfo {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(rename = "fieldValue")]
    pub field_value: String,
}

/// Task status reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl RemoteStatus {
    /// Parse the status string used by the service.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Errors from the RunningHub REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// RunningHub returned a non-2xx status code.
    #[error("RunningHub HTTP error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The envelope carried a non-zero application code.
    #[error("RunningHub API error (code {code}): {msg}")]
    Api { code: i64, msg: String },

    /// The response did not match the expected shape.
    #[error("malformed RunningHub response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Whether a retry with backoff is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Api { .. } | ApiError::Malformed(_) => false,
        }
    }

    /// Whether the call timed out at the HTTP layer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Request(e) if e.is_timeout())
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, ApiError::Api { code, .. } if *code == codes::TASK_QUEUE_MAXED)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api { code, .. } if *code == codes::TASK_NOT_FOUND)
    }
}

impl RunningHubApi {
    /// Create a new API client.
    ///
    /// * `base_url` - e.g. `https://api.runninghub.com` (no trailing slash).
    /// * `timeout`  - per-HTTP-call timeout, independent of any job deadline.
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build the RunningHub HTTP client");
        Self { client, base_url }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Upload an asset under the account's credential.
    ///
    /// Sends `POST /task/openapi/upload` as a multipart form. Returns
    /// the remote file reference.
    pub async fn upload(&self, account: &Account, bytes: Vec<u8>) -> Result<UploadData, ApiError> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name("input.png"),
            )
            .text("fileType", "image");

        let response = self
            .client
            .post(format!("{}/task/openapi/upload", self.base_url))
            .bearer_auth(account.api_key.expose())
            .multipart(form)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    /// Create a task from a workflow id and input-node bindings.
    ///
    /// Sends `POST /task/openapi/create`. A `TASK_QUEUE_MAXED` envelope
    /// code surfaces as an [`ApiError::Api`] the caller can detect via
    /// [`ApiError::is_queue_full`].
    pub async fn create_task(
        &self,
        account: &Account,
        workflow_id: &str,
        node_info_list: &[NodeInfo],
    ) -> Result<CreateData, ApiError> {
        let body = serde_json::json!({
            "workflowId": workflow_id,
            "apiKey": account.api_key.expose(),
            "nodeInfoList": node_info_list,
        });

        let response = self
            .client
            .post(format!("{}/task/openapi/create", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    /// Fetch the current status of a task.
    ///
    /// Sends `POST /task/openapi/status`. The payload is the bare
    /// status string; parse it with [`RemoteStatus::parse`].
    pub async fn task_status(
        &self,
        account: &Account,
        task_id: &str,
    ) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "taskId": task_id,
            "apiKey": account.api_key.expose(),
        });

        let response = self
            .client
            .post(format!("{}/task/openapi/status", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    /// Fetch the outputs of a finished task.
    ///
    /// Sends `POST /task/openapi/outputs`.
    pub async fn task_outputs(
        &self,
        account: &Account,
        task_id: &str,
    ) -> Result<Vec<TaskOutput>, ApiError> {
        let body = serde_json::json!({
            "taskId": task_id,
            "apiKey": account.api_key.expose(),
        });

        let response = self
            .client
            .post(format!("{}/task/openapi/outputs", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    /// Probe the account's remaining quota and running task count.
    ///
    /// Sends `POST /uc/openapi/accountStatus`. Used by operational
    /// tooling, not by the dispatch path.
    pub async fn account_status(&self, account: &Account) -> Result<AccountStatusData, ApiError> {
        let body = serde_json::json!({
            "apikey": account.api_key.expose(),
        });

        let response = self
            .client
            .post(format!("{}/uc/openapi/accountStatus", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    // ---- private helpers ----

    /// Check the HTTP status, then decode the envelope and unwrap it.
    async fn parse_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let envelope = response.json::<Envelope<T>>().await?;
        envelope.into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn client_builds_with_a_call_timeout() {
        let _api = RunningHubApi::new(
            "https://api.example.com".to_string(),
            std::time::Duration::from_secs(5),
        );
    }

    #[test]
    fn envelope_success_yields_data() {
        let env: Envelope<UploadData> = serde_json::from_str(
            r#"{"code": 0, "msg": "success", "data": {"fileName": "api/x.png"}}"#,
        )
        .unwrap();
        let data = env.into_data().unwrap();
        assert_eq!(data.file_name, "api/x.png");
    }

    #[test]
    fn envelope_queue_full_maps_to_api_error() {
        let env: Envelope<CreateData> = serde_json::from_str(
            r#"{"code": 421, "msg": "TASK_QUEUE_MAXED", "data": null}"#,
        )
        .unwrap();
        let err = env.into_data().unwrap_err();
        assert!(err.is_queue_full());
        assert!(!err.is_transient());
    }

    #[test]
    fn envelope_missing_data_is_malformed() {
        let env: Envelope<CreateData> =
            serde_json::from_str(r#"{"code": 0, "msg": "success"}"#).unwrap();
        assert_matches!(env.into_data(), Err(ApiError::Malformed(_)));
    }

    #[test]
    fn not_found_code_is_detected() {
        let err = ApiError::Api {
            code: codes::TASK_NOT_FOUND,
            msg: "task not exists".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_queue_full());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let five_hundred = ApiError::Http {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(five_hundred.is_transient());

        let four_hundred = ApiError::Http {
            status: 400,
            body: "bad request".into(),
        };
        assert!(!four_hundred.is_transient());
    }

    #[test]
    fn remote_status_parses_known_values() {
        assert_eq!(RemoteStatus::parse("QUEUED"), Some(RemoteStatus::Queued));
        assert_eq!(RemoteStatus::parse("RUNNING"), Some(RemoteStatus::Running));
        assert_eq!(RemoteStatus::parse("SUCCESS"), Some(RemoteStatus::Success));
        assert_eq!(RemoteStatus::parse("FAILED"), Some(RemoteStatus::Failed));
        assert_eq!(RemoteStatus::parse("EXPLODED"), None);
    }

    #[test]
    fn node_info_serializes_camel_case() {
        let info = NodeInfo {
            node_id: "2".into(),
            field_name: "image".into(),
            field_value: "api/x.png".into(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["nodeId"], "2");
        assert_eq!(json["fieldName"], "image");
        assert_eq!(json["fieldValue"], "api/x.png");
    }

    #[test]
    fn task_output_deserializes_optional_cost_time() {
        let out: TaskOutput = serde_json::from_str(
            r#"{"fileUrl": "https://cdn/x.png", "fileType": "png", "taskCostTime": 7.5}"#,
        )
        .unwrap();
        assert_eq!(out.task_cost_time, Some(7.5));

        let bare: TaskOutput = serde_json::from_str(r#"{"fileUrl": "https://cdn/y.png"}"#).unwrap();
        assert_eq!(bare.task_cost_time, None);
    }
}
