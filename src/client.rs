use std::fmt;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach TrueNAS at {host}: {detail}")]
    Unreachable { host: String, detail: String },
    #[error("empty response from {endpoint}")]
    EmptyResponse { endpoint: String },
    #[error("API key rejected: system/info returned no version field")]
    AuthenticationFailed,
    #[error("failed to fetch {what}: {detail}")]
    FetchFailed { what: String, detail: String },
    #[error("upgrade rejected for {app}: {reason}")]
    UpgradeRejected { app: String, reason: String },
}

/// App lifecycle state as reported by the middleware. Values the API grows
/// later land in `Unknown` instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum AppState {
    Running,
    Stopped,
    Deploying,
    Updating,
    Failed,
    Error,
    Unknown(String),
}

impl From<String> for AppState {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "RUNNING" => AppState::Running,
            "STOPPED" => AppState::Stopped,
            "DEPLOYING" => AppState::Deploying,
            "UPDATING" => AppState::Updating,
            "FAILED" => AppState::Failed,
            "ERROR" => AppState::Error,
            _ => AppState::Unknown(raw),
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Running => write!(f, "RUNNING"),
            AppState::Stopped => write!(f, "STOPPED"),
            AppState::Deploying => write!(f, "DEPLOYING"),
            AppState::Updating => write!(f, "UPDATING"),
            AppState::Failed => write!(f, "FAILED"),
            AppState::Error => write!(f, "ERROR"),
            AppState::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// One installed app, as returned by `GET app`. A fresh snapshot is fetched
/// per run; nothing here is cached.
#[derive(Debug, Clone, Deserialize)]
pub struct AppRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub state: AppState,
    #[serde(default)]
    pub update_available: Option<bool>,
    #[serde(default)]
    pub upgrade_available: Option<bool>,
}

impl AppRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// `update_available` wins when present, then `upgrade_available`.
    /// Both absent counts as not available, matching the middleware's own
    /// fallback even though it under-reports on API versions that omit the
    /// field.
    pub fn update_pending(&self) -> bool {
        self.update_available.or(self.upgrade_available).unwrap_or(false)
    }

    pub fn is_plex(&self) -> bool {
        self.id.eq_ignore_ascii_case("plex") || self.display_name().eq_ignore_ascii_case("plex")
    }
}

/// Operations the orchestrator and poller need from the management API.
/// `ApiClient` is the live implementation; tests substitute their own.
pub trait ManagementApi {
    fn list_apps(&self) -> Result<Vec<AppRecord>, ClientError>;
    fn app_status(&self, id: &str) -> Result<AppRecord, ClientError>;
    fn upgrade_app(&self, id: &str) -> Result<(), ClientError>;
}

/// Authenticated wrapper around the TrueNAS REST API at
/// `http://<host>/api/v2.0/`. No retries here; failures propagate to the
/// caller, which decides whether they are fatal or local.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    host: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(host: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("truenas-app-updater/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ApiClient {
            http,
            host: host.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<String, ClientError> {
        let url = format!("http://{}/api/v2.0/{}", self.host, endpoint);
        let mut request = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().map_err(|e| ClientError::Unreachable {
            host: self.host.clone(),
            detail: e.to_string(),
        })?;
        let text = response.text().map_err(|e| ClientError::Unreachable {
            host: self.host.clone(),
            detail: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyResponse {
                endpoint: endpoint.to_string(),
            });
        }
        Ok(text)
    }

    /// Connectivity preflight. Authenticates a `GET system/info` and returns
    /// the reported version string. Always runs before any other call.
    pub fn ping(&self) -> Result<String, ClientError> {
        let body = self
            .request(Method::GET, "system/info", None)
            .map_err(|e| match e {
                ClientError::EmptyResponse { endpoint } => ClientError::Unreachable {
                    host: self.host.clone(),
                    detail: format!("empty response from {endpoint}"),
                },
                other => other,
            })?;
        version_from_info(&body).ok_or(ClientError::AuthenticationFailed)
    }
}

impl ManagementApi for ApiClient {
    fn list_apps(&self) -> Result<Vec<AppRecord>, ClientError> {
        let body = self.request(Method::GET, "app", None)?;
        serde_json::from_str(&body).map_err(|e| ClientError::FetchFailed {
            what: "application listing".to_string(),
            detail: e.to_string(),
        })
    }

    fn app_status(&self, id: &str) -> Result<AppRecord, ClientError> {
        let body = self
            .request(Method::GET, &format!("app/id/{id}"), None)
            .map_err(|e| ClientError::FetchFailed {
                what: format!("status for {id}"),
                detail: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| ClientError::FetchFailed {
            what: format!("status for {id}"),
            detail: e.to_string(),
        })
    }

    fn upgrade_app(&self, id: &str) -> Result<(), ClientError> {
        let body = self.request(Method::POST, &format!("app/id/{id}/upgrade"), Some(&json!({})))?;
        // The middleware answers an accepted trigger with a job id; it only
        // signals acceptance, never completion.
        match upgrade_rejection(&body) {
            Some(reason) => Err(ClientError::UpgradeRejected {
                app: id.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Pull a string `version` field out of a `system/info` body. A body without
/// one (an HTML login page, an auth error object) means the key was rejected.
fn version_from_info(body: &str) -> Option<String> {
    let info: Value = serde_json::from_str(body).ok()?;
    info.get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// An upgrade response carrying a non-null `error` field is a rejection.
fn upgrade_rejection(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error").filter(|e| !e.is_null())?;
    Some(match error.as_str() {
        Some(text) => text.to_string(),
        None => error.to_string(),
    })
}
