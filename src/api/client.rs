//! Authenticated HTTP client for the remote status API
//!
//! Requests carry the access-key headers plus a bearer token obtained from
//! the `iam/jwt` endpoint and cached for its one-hour lifetime. Transient
//! failures are retried with exponential backoff; rate limits honor the
//! server's `Retry-After` header.

use crate::api::StatusApi;
use crate::api::types::{
    InverterProfile, JwtResponse, PvSystemMetadata, PvSystemsPage, SystemStatusDetails,
};
use crate::config::ApiConfig;
use crate::error::{HyperionError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;

/// Lifetime of a cached bearer token in seconds
const JWT_LIFETIME_SECS: i64 = 3600;

/// Upper bound on a server-requested rate-limit wait
const RETRY_AFTER_CAP_SECS: u64 = 300;

#[derive(Debug, Default)]
struct JwtCache {
    token: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
}

impl JwtCache {
    fn valid(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.token.as_ref()?;
        let fetched = self.fetched_at?;
        if now.signed_duration_since(fetched).num_seconds() < JWT_LIFETIME_SECS {
            Some(token.clone())
        } else {
            None
        }
    }

    fn store(&mut self, token: String, now: DateTime<Utc>) {
        self.token = Some(token);
        self.fetched_at = Some(now);
    }

    fn invalidate(&mut self) {
        self.token = None;
        self.fetched_at = None;
    }
}

/// HTTP implementation of [`StatusApi`]
pub struct HttpStatusApi {
    base_url: String,
    access_key_id: String,
    access_key_value: String,
    user_id: String,
    password: String,
    max_retries: u32,
    retry_delay: Duration,
    http: reqwest::Client,
    jwt: Mutex<JwtCache>,
    logger: StructuredLogger,
}

impl HttpStatusApi {
    /// Build a client from API configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key_id: config.access_key_id.clone(),
            access_key_value: config.access_key_value.clone(),
            user_id: config.user_id.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            http,
            jwt: Mutex::new(JwtCache::default()),
            logger: get_logger("api"),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Return a bearer token, requesting a fresh one when the cache is stale.
    /// The cache lock is held across the request so concurrent callers do not
    /// stampede the token endpoint.
    async fn bearer(&self) -> Result<String> {
        let now = Utc::now();
        let mut cache = self.jwt.lock().await;
        if let Some(token) = cache.valid(now) {
            return Ok(token);
        }

        self.logger.debug("Requesting fresh bearer token");
        let response = self
            .http
            .post(self.endpoint("iam/jwt"))
            .header("AccessKeyId", &self.access_key_id)
            .header("AccessKeyValue", &self.access_key_value)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({
                "UserId": self.user_id,
                "password": self.password,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HyperionError::api(format!(
                "Token request failed with status {}",
                response.status()
            )));
        }

        let body: JwtResponse = response.json().await?;
        cache.store(body.jwt_token.clone(), now);
        Ok(body.jwt_token)
    }

    async fn invalidate_token(&self) {
        self.jwt.lock().await.invalidate();
    }

    /// GET a JSON document with auth headers, retrying transient failures
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        let mut last_error = HyperionError::api(format!("GET {} was never attempted", path));

        for attempt in 0..self.max_retries {
            let token = match self.bearer().await {
                Ok(token) => token,
                Err(e) if e.is_transient() => {
                    self.logger
                        .warn(&format!("Token fetch attempt {} failed: {}", attempt + 1, e));
                    last_error = e;
                    self.backoff(attempt).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let sent = self
                .http
                .get(&url)
                .header("AccessKeyId", &self.access_key_id)
                .header("AccessKeyValue", &self.access_key_value)
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(ACCEPT, "application/json")
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    self.logger
                        .warn(&format!("GET {} attempt {} failed: {}", path, attempt + 1, e));
                    last_error = e.into();
                    self.backoff(attempt).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<T>().await?);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after_secs(&response).min(RETRY_AFTER_CAP_SECS);
                self.logger
                    .warn(&format!("Rate limited on {}, waiting {}s", path, wait));
                tokio::time::sleep(Duration::from_secs(wait)).await;
                last_error = HyperionError::api("Rate limited");
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                // Stale or revoked token; drop it and retry with a fresh one
                self.logger.warn("Bearer token rejected, re-authenticating");
                self.invalidate_token().await;
                last_error = HyperionError::api("Unauthorized");
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(HyperionError::not_found(path));
            }

            last_error = HyperionError::api(format!("GET {} returned {}", path, status));
            if !status.is_server_error() {
                return Err(last_error);
            }
            self.backoff(attempt).await;
        }

        self.logger.error(&format!(
            "GET {} failed after {} attempts: {}",
            path, self.max_retries, last_error
        ));
        Err(last_error)
    }

    async fn backoff(&self, attempt: u32) {
        if attempt + 1 < self.max_retries {
            tokio::time::sleep(self.retry_delay * 2u32.saturating_pow(attempt)).await;
        }
    }
}

#[async_trait::async_trait]
impl StatusApi for HttpStatusApi {
    async fn get_pv_systems(&self, offset: usize, limit: usize) -> Result<Vec<PvSystemMetadata>> {
        let page: PvSystemsPage = self
            .get_json(&format!("pvsystems?offset={}&limit={}", offset, limit))
            .await?;
        Ok(page.pv_systems)
    }

    async fn get_system_status_details(&self, system_id: &str) -> Result<SystemStatusDetails> {
        self.get_json(&format!("pvsystems/{}/status", system_id))
            .await
    }

    async fn get_inverter_profile(&self, inverter_id: &str) -> Result<InverterProfile> {
        self.get_json(&format!("devices/{}/profile", inverter_id))
            .await
    }
}

fn retry_after_secs(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(60)
}
