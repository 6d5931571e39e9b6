//! The concrete Looker API 4.0 transport. `lv_client::LookerClient` is
//! trait-only by design (§6, out of scope: "the concrete SDK transport,
//! auth token refresh, and TLS configuration"); this module is the "real
//! SDK wrapper" its doc comment says lives outside that crate, kept
//! deliberately thin rather than a full-refresh, connection-pooled client.

use std::fmt;

use async_trait::async_trait;
use lv_client::{LookerClient, LookerClientError, LookerClientErrorKind, Page, Viewer};
use lv_types::ContentType;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct LookerHttpConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

pub struct LookerHttpClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl fmt::Debug for LookerHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookerHttpClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

impl LookerHttpClient {
    /// Exchanges client credentials for a bearer token once, at
    /// construction time. The Looker API 4.0 endpoint for this is
    /// `POST /login`, taking `client_id`/`client_secret` as form fields
    /// (spec.md §6: "authentication via OAuth-style client credentials
    /// supplied through environment variables").
    pub async fn connect(config: LookerHttpConfig) -> Result<Self, LookerClientError> {
        let http = Client::builder()
            .build()
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Network, e))?;

        let login_url = format!("{}/login", config.base_url.trim_end_matches('/'));
        let response = http
            .post(&login_url)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let response = check_status(response).await?;
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: body.access_token,
        })
    }

    fn endpoint(&self, content_type: ContentType) -> &'static str {
        match content_type {
            ContentType::User => "users",
            ContentType::Group => "groups",
            ContentType::Role => "roles",
            ContentType::PermissionSet => "permission_sets",
            ContentType::ModelSet => "model_sets",
            ContentType::Folder => "folders",
            ContentType::LookmlModel => "lookml_models",
            ContentType::Look => "looks",
            ContentType::Dashboard => "dashboards",
            ContentType::Board => "boards",
            ContentType::ScheduledPlan => "scheduled_plans",
            ContentType::Explore => "lookml_models",
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LookerClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => LookerClientErrorKind::RateLimited,
        StatusCode::NOT_FOUND => LookerClientErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LookerClientErrorKind::Auth,
        s if s.is_server_error() => LookerClientErrorKind::Server5xx,
        _ => LookerClientErrorKind::Unknown,
    };
    let body = response.text().await.unwrap_or_default();
    Err(LookerClientError::new(kind, format!("HTTP {status}: {body}")))
}

fn classify_transport_error(e: reqwest::Error) -> LookerClientError {
    let kind = if e.is_timeout() {
        LookerClientErrorKind::Timeout
    } else {
        LookerClientErrorKind::Network
    };
    LookerClientError::new(kind, e)
}

#[async_trait]
impl LookerClient for LookerHttpClient {
    async fn list(
        &self,
        content_type: ContentType,
        folder_id: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> lv_client::Result<Page> {
        let url = format!("{}/{}", self.base_url, self.endpoint(content_type));
        let mut request = self.authed(self.http.get(&url)).query(&[
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        if content_type.supports_folder_filter() {
            if let Some(folder_id) = folder_id {
                request = request.query(&[("folder_id", folder_id)]);
            }
        }
        let response = check_status(request.send().await.map_err(classify_transport_error)?).await?;
        let items: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;
        let has_more = items.len() as i64 == limit;
        Ok(Page { items, has_more })
    }

    async fn get(&self, content_type: ContentType, id: &str) -> lv_client::Result<Option<serde_json::Value>> {
        let url = format!("{}/{}/{}", self.base_url, self.endpoint(content_type), id);
        let response = self.authed(self.http.get(&url)).send().await.map_err(classify_transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let value = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;
        Ok(Some(value))
    }

    async fn exists(&self, content_type: ContentType, id: &str) -> lv_client::Result<bool> {
        Ok(self.get(content_type, id).await?.is_some())
    }

    async fn create(
        &self,
        content_type: ContentType,
        write_model: serde_json::Value,
    ) -> lv_client::Result<String> {
        let url = format!("{}/{}", self.base_url, self.endpoint(content_type));
        let response = check_status(
            self.authed(self.http.post(&url))
                .json(&write_model)
                .send()
                .await
                .map_err(classify_transport_error)?,
        )
        .await?;
        let created: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;
        created
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| LookerClientError::new(LookerClientErrorKind::Unknown, "response missing id"))
    }

    async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        write_model: serde_json::Value,
    ) -> lv_client::Result<()> {
        let url = format!("{}/{}/{}", self.base_url, self.endpoint(content_type), id);
        check_status(
            self.authed(self.http.patch(&url))
                .json(&write_model)
                .send()
                .await
                .map_err(classify_transport_error)?,
        )
        .await?;
        Ok(())
    }

    async fn me(&self) -> lv_client::Result<Viewer> {
        let url = format!("{}/user", self.base_url);
        let response = check_status(
            self.authed(self.http.get(&url)).send().await.map_err(classify_transport_error)?,
        )
        .await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;
        Ok(Viewer {
            id: value.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            display_name: value
                .get("display_name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn versions(&self) -> lv_client::Result<String> {
        let url = format!("{}/versions", self.base_url);
        let response = check_status(
            self.authed(self.http.get(&url)).send().await.map_err(classify_transport_error)?,
        )
        .await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookerClientError::new(LookerClientErrorKind::Unknown, e))?;
        Ok(value
            .get("looker_release_version")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }
}
