//! REST collaborator for notification lists and read markers.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use classhub_core::config::api::ApiConfig;
use classhub_core::error::{AppError, ErrorKind};
use classhub_core::result::AppResult;

/// Notification endpoints of the ClassHub REST API.
#[async_trait]
pub trait NotificationApi: Send + Sync + std::fmt::Debug + 'static {
    /// Recent notifications of `user_id`, as raw server items.
    async fn get_notifications(&self, user_id: &str) -> AppResult<Vec<Value>>;

    /// Mark one notification as read.
    async fn mark_notification_as_read(&self, id: &str) -> AppResult<()>;

    /// Mark every notification of `user_id` as read.
    async fn mark_all_notifications_as_read(&self, user_id: &str) -> AppResult<()>;

    /// Replace the bearer token used for subsequent calls. `None` signs out.
    fn set_token(&self, _token: Option<String>) {}
}

/// `{success, data, message}` response wrapper.
#[derive(Debug, Default, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiEnvelope {
    fn detail(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }

    fn signals_expired_session(&self) -> bool {
        self.detail().is_some_and(|detail| {
            let detail = detail.to_lowercase();
            detail.contains("unauthorized") || detail.contains("token expired")
        })
    }
}

/// [`NotificationApi`] over HTTP with bearer authentication.
#[derive(Debug)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpNotificationApi {
    /// Client for the API rooted at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::configuration(format!(
                "API base URL '{base_url}' cannot be a base"
            )));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    /// Client configured from the `[api]` section.
    pub fn from_config(config: &ApiConfig) -> AppResult<Self> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    /// Builder-style token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::configuration("API base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.token.read().unwrap_or_else(|e| e.into_inner()).clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder, action: &str) -> AppResult<ApiEnvelope> {
        let response = self.authorize(request).send().await.map_err(|e| {
            let kind = if e.is_timeout() || e.is_connect() {
                ErrorKind::ServiceUnavailable
            } else {
                ErrorKind::ExternalService
            };
            AppError::with_source(kind, format!("{action} request failed"), e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::with_source(ErrorKind::ExternalService, format!("{action} response unreadable"), e)
        })?;
        debug!(action = %action, status = %status, "API response");

        let envelope: Option<ApiEnvelope> = serde_json::from_str(&body).ok();

        if status == StatusCode::UNAUTHORIZED
            || envelope.as_ref().is_some_and(ApiEnvelope::signals_expired_session)
        {
            warn!(action = %action, "API rejected the session token");
            return Err(AppError::authentication(format!("{action}: session expired")));
        }

        if !status.is_success() {
            let detail = envelope.as_ref().and_then(ApiEnvelope::detail).unwrap_or("");
            return Err(AppError::external_service(format!(
                "{action} failed with HTTP {status} {detail}"
            ).trim_end().to_string()));
        }

        let envelope = envelope.ok_or_else(|| {
            AppError::new(ErrorKind::Serialization, format!("{action} returned a non-JSON body"))
        })?;

        if envelope.success == Some(false) {
            return Err(AppError::external_service(format!(
                "{action} failed: {}",
                envelope.detail().unwrap_or("unknown error")
            )));
        }

        Ok(envelope)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn get_notifications(&self, user_id: &str) -> AppResult<Vec<Value>> {
        let mut url = self.endpoint(&["notifications"])?;
        url.query_pairs_mut().append_pair("user_id", user_id);

        let envelope = self
            .execute(self.client.get(url), "get_notifications")
            .await?;

        match envelope.data {
            Some(Value::Array(items)) => Ok(items),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(AppError::external_service(
                "get_notifications returned a non-list data field",
            )),
        }
    }

    async fn mark_notification_as_read(&self, id: &str) -> AppResult<()> {
        let url = self.endpoint(&["notifications", id, "read"])?;
        self.execute(self.client.post(url), "mark_notification_as_read")
            .await
            .map(|_| ())
    }

    async fn mark_all_notifications_as_read(&self, user_id: &str) -> AppResult<()> {
        let url = self.endpoint(&["notifications", "read-all"])?;
        let request = self.client.post(url).json(&json!({ "user_id": user_id }));
        self.execute(request, "mark_all_notifications_as_read")
            .await
            .map(|_| ())
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}
