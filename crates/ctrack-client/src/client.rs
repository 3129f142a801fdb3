//! REST implementation of [`AssessmentBackend`]

use crate::config::ClientConfig;
use crate::dto::{AssessmentDto, NewComment, StatusUpdate};
use crate::error::{Error, Result};
use crate::VERSION;
use async_trait::async_trait;
use ctrack_common::{ControlCode, SystemId, TrackerError, TrackerResult};
use ctrack_compliance::catalog::{CategoryMap, ControlRecord, ExternalMapping};
use ctrack_compliance::{
    Assessment, AssessmentBackend, CatalogSnapshot, Comment, ComplianceStatus, Hierarchy,
};
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Backend client over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<BackendInner>,
}

struct BackendInner {
    config: ClientConfig,
    base_url: Url,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Create a client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)?;

        let mut headers = header::HeaderMap::new();
        if !config.api_key.is_empty() {
            let bearer = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|_| Error::Config("API key contains invalid header characters".into()))?;
            headers.insert(header::AUTHORIZATION, bearer);
        }
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&format!("ctrack-rust/{VERSION}"))
                .map_err(|_| Error::Config("invalid user agent".into()))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendInner { config, base_url, http }),
        })
    }

    /// Load the given profile and connect
    pub fn from_profile(profile: Option<&str>) -> Result<Self> {
        Self::new(ClientConfig::load(profile)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Base URL plus percent-encoded path segments
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be used as a base URL", self.inner.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.request(Method::GET, segments, None::<()>).await
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<B>,
    ) -> Result<T> {
        let url = self.url(segments)?;
        let config = &self.inner.config;
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            let mut request = self.inner.http.request(method.clone(), url.clone());
            if let Some(ref body) = body {
                request = request.json(body);
            }

            tracing::debug!(%method, %url, attempt, "backend request");
            let error = match request.send().await {
                Ok(response) => match Self::read_response(response).await {
                    Ok(value) => return Ok(value),
                    Err(e) => e,
                },
                Err(e) => Error::Http(e),
            };

            if !error.is_retryable() || attempt == config.max_retries {
                return Err(error);
            }
            let delay = config.retry_delay * 2u32.saturating_pow(attempt);
            tracing::warn!(%method, %url, attempt, ?delay, error = %error, "retrying backend request");
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        }

        Err(last_error.unwrap_or_else(|| Error::Config("request failed".to_string())))
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            if status == StatusCode::NO_CONTENT || body.iter().all(u8::is_ascii_whitespace) {
                return Ok(serde_json::from_str("null")?);
            }

            #[derive(Deserialize)]
            struct Envelope<T> {
                data: Option<T>,
            }

            // Try the data wrapper first
            if let Ok(envelope) = serde_json::from_slice::<Envelope<T>>(&body) {
                if let Some(data) = envelope.data {
                    return Ok(data);
                }
            }
            return Ok(serde_json::from_slice(&body)?);
        }

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            code: String,
            message: String,
        }

        Err(match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(parsed) => Error::Api {
                status_code: status.as_u16(),
                code: parsed.error.code,
                message: parsed.error.message,
            },
            Err(_) => Error::Api {
                status_code: status.as_u16(),
                code: "unknown_error".to_string(),
                message: String::from_utf8_lossy(&body).to_string(),
            },
        })
    }
}

#[async_trait]
impl AssessmentBackend for HttpBackend {
    async fn fetch_hierarchy(&self) -> TrackerResult<Hierarchy> {
        Ok(self.get(&["hierarchy"]).await?)
    }

    async fn fetch_catalog(&self) -> TrackerResult<CatalogSnapshot> {
        let controls: Vec<ControlRecord> = self.get(&["controls"]).await?;
        let mappings: Vec<ExternalMapping> = self.get(&["control-mappings"]).await?;
        let category_map = match self.get::<CategoryMap>(&["category-map"]).await {
            Ok(map) => Some(map),
            Err(e) if e.is_not_found_error() => None,
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(controls = controls.len(), mappings = mappings.len(), "fetched catalog");
        Ok(CatalogSnapshot { controls, mappings, category_map })
    }

    async fn list_assessments(&self, system_id: &SystemId) -> TrackerResult<Vec<Assessment>> {
        let dtos: Vec<AssessmentDto> = self.get(&["systems", system_id.as_str(), "assessments"]).await?;
        let mut assessments = Vec::with_capacity(dtos.len());
        for dto in dtos {
            let id = dto.id.clone();
            match dto.into_assessment(system_id) {
                Ok(assessment) => assessments.push(assessment),
                Err(e) => tracing::warn!(assessment = %id, error = %e, "skipping malformed assessment"),
            }
        }
        Ok(assessments)
    }

    async fn upsert_status(
        &self,
        system_id: &SystemId,
        control_id: &ControlCode,
        status: ComplianceStatus,
    ) -> TrackerResult<Assessment> {
        let body = StatusUpdate { status: status.to_server() };
        let dto: AssessmentDto = self
            .request(
                Method::PUT,
                &["systems", system_id.as_str(), "assessments", control_id.as_str()],
                Some(body),
            )
            .await?;
        Ok(dto.into_assessment(system_id)?)
    }

    async fn delete_assessment(&self, system_id: &SystemId, control_id: &ControlCode) -> TrackerResult<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &["systems", system_id.as_str(), "assessments", control_id.as_str()],
                None::<()>,
            )
            .await?;
        Ok(())
    }

    async fn list_comments(&self, assessment_id: &str) -> TrackerResult<Vec<Comment>> {
        Ok(self.get(&["assessments", assessment_id, "comments"]).await?)
    }

    async fn post_comment(&self, assessment_id: &str, content: &str) -> TrackerResult<Comment> {
        if content.trim().is_empty() {
            return Err(TrackerError::Backend("comment content is empty".into()));
        }
        Ok(self
            .request(
                Method::POST,
                &["assessments", assessment_id, "comments"],
                Some(NewComment { content }),
            )
            .await?)
    }
}
