//! Resilient HTTP client for the model-serving proxy admin API.
//!
//! Every admin call funnels through [`ProxyClient::request`], which layers a
//! circuit breaker, bounded linear-backoff retry, and per-endpoint TTL caching
//! over reqwest. A mock mode serves canned fixtures for local development
//! without a running proxy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::ProxyConfig;

use super::types::{
    DailyActivityDay, DailyActivityReport, GenerateKeyRequest, GeneratedKey, KeyInfo, ProxyModel,
    ProxyUserInfo, normalize_key_info, normalize_user_info,
};

/// Header carrying the admin credential on every proxy request.
const AUTH_HEADER: &str = "x-proxy-api-key";

/// Errors surfaced by proxy interactions.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy answered with a 4xx; the request itself is wrong and a
    /// retry would not help.
    #[error("proxy rejected request ({status}): {message}")]
    Validation { status: u16, message: String },

    /// The circuit breaker is open; no request was attempted.
    #[error("proxy circuit breaker is open")]
    CircuitOpen,

    /// The proxy could not be reached or kept failing after retries.
    #[error("proxy unavailable: {message}")]
    Unavailable { message: String },

    /// The proxy answered but the payload did not match any known shape.
    #[error("unexpected proxy response: {message}")]
    UnexpectedResponse { message: String },
}

/// Consecutive-failure circuit breaker shared across all proxy calls.
///
/// Closed until `failure_threshold` consecutive failures, then open for
/// `open_duration`. The first call after the open window acts as the
/// half-open trial: success closes the breaker, failure reopens it.
struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    open_duration: Duration,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            failure_threshold,
            open_duration,
        }
    }

    /// Returns an error while the open window is in effect. After the window
    /// elapses the call is admitted as a half-open trial.
    fn check(&self) -> Result<(), ProxyError> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.opened_at {
            Some(opened_at) if opened_at.elapsed() < self.open_duration => {
                Err(ProxyError::CircuitOpen)
            }
            _ => Ok(()),
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            if state.opened_at.is_none() {
                tracing::warn!(
                    failures = state.consecutive_failures,
                    "Circuit breaker opened for model-serving proxy"
                );
            }
            state.opened_at = Some(Instant::now());
        }
    }

    fn is_open(&self) -> bool {
        self.check().is_err()
    }
}

struct CacheEntry {
    value: JsonValue,
    stored_at: Instant,
}

/// TTL cache for idempotent reads. Entries past their TTL are still kept and
/// can be served as a stale fallback when the proxy is down.
struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn get_fresh(&self, key: &str) -> Option<JsonValue> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    fn get_stale(&self, key: &str) -> Option<JsonValue> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn put(&self, key: &str, value: JsonValue) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|key, _| !key.starts_with(prefix));
    }
}

/// Client for the model-serving proxy's admin API.
pub struct ProxyClient {
    http: reqwest::Client,
    config: ProxyConfig,
    breaker: CircuitBreaker,
    cache: ResponseCache,
}

impl ProxyClient {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProxyError::UnexpectedResponse {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_open_seconds),
            ),
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_seconds)),
            http,
            config,
        })
    }

    /// Whether the circuit breaker currently refuses requests.
    pub fn circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Core request path: circuit breaker, then up to `retry_attempts` tries
    /// with linear backoff (`retry_delay * attempt`). 4xx responses surface
    /// immediately without a retry and do not trip the breaker.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, ProxyError> {
        if self.config.mock_mode {
            return self.mock_response(&method, endpoint, body);
        }

        self.breaker.check()?;

        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        );
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let mut builder = self.http.request(method.clone(), &url);
            if let Some(api_key) = &self.config.api_key {
                builder = builder.header(AUTH_HEADER, api_key);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        self.breaker.record_success();
                        metrics::counter!("proxy_requests_total", "outcome" => "success")
                            .increment(1);
                        if text.is_empty() {
                            return Ok(JsonValue::Null);
                        }
                        return serde_json::from_str(&text).map_err(|e| {
                            ProxyError::UnexpectedResponse {
                                message: format!("invalid JSON from {}: {}", endpoint, e),
                            }
                        });
                    }

                    if status.is_client_error() {
                        // The proxy is up and made a decision; not a breaker
                        // failure and never retried.
                        self.breaker.record_success();
                        metrics::counter!("proxy_requests_total", "outcome" => "rejected")
                            .increment(1);
                        return Err(ProxyError::Validation {
                            status: status.as_u16(),
                            message: extract_error_message(&text),
                        });
                    }

                    last_error = format!("{} returned {}", endpoint, status);
                    self.breaker.record_failure();
                }
                Err(e) => {
                    last_error = format!("{} failed: {}", endpoint, e);
                    self.breaker.record_failure();
                }
            }

            metrics::counter!("proxy_requests_total", "outcome" => "failure").increment(1);

            if attempt < attempts {
                let delay = Duration::from_millis(self.config.retry_delay_ms * attempt as u64);
                tracing::warn!(
                    endpoint,
                    attempt,
                    error = %last_error,
                    delay_ms = delay.as_millis() as u64,
                    "Proxy request failed, retrying"
                );
                sleep(delay).await;
            }
        }

        Err(ProxyError::Unavailable {
            message: last_error,
        })
    }

    // --- models ---

    /// Fetch the model catalog, honoring the TTL cache unless `force_refresh`
    /// is set. A "no models configured" rejection is an empty catalog, not an
    /// error. When the proxy is down a stale cached catalog is served with a
    /// warning instead of failing.
    pub async fn get_models(&self, force_refresh: bool) -> Result<Vec<ProxyModel>, ProxyError> {
        let cache_key = format!(
            "models:{}",
            self.config.team_id.as_deref().unwrap_or("default")
        );

        if !force_refresh {
            if let Some(cached) = self.cache.get_fresh(&cache_key) {
                return Ok(parse_model_list(&cached));
            }
        }

        match self.request(Method::GET, "/model/info", None).await {
            Ok(raw) => {
                self.cache.put(&cache_key, raw.clone());
                Ok(parse_model_list(&raw))
            }
            Err(ProxyError::Validation { message, .. })
                if message.to_lowercase().contains("no model") =>
            {
                let empty = json!({ "data": [] });
                self.cache.put(&cache_key, empty.clone());
                Ok(Vec::new())
            }
            Err(err @ (ProxyError::Unavailable { .. } | ProxyError::CircuitOpen)) => {
                if let Some(stale) = self.cache.get_stale(&cache_key) {
                    tracing::warn!(error = %err, "Serving stale model catalog, proxy unreachable");
                    return Ok(parse_model_list(&stale));
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Register a model on the proxy, then wait the settle delay so an
    /// immediate follow-up read observes it.
    pub async fn create_model(&self, payload: &JsonValue) -> Result<JsonValue, ProxyError> {
        let result = self.request(Method::POST, "/model/new", Some(payload)).await?;
        self.settle().await;
        self.cache.invalidate_prefix("models:");
        Ok(result)
    }

    pub async fn update_model(
        &self,
        external_id: &str,
        payload: &JsonValue,
    ) -> Result<JsonValue, ProxyError> {
        let endpoint = format!("/model/{}/update", external_id);
        let result = self
            .request(Method::PATCH, &endpoint, Some(payload))
            .await?;
        self.settle().await;
        self.cache.invalidate_prefix("models:");
        Ok(result)
    }

    pub async fn delete_model(&self, external_id: &str) -> Result<(), ProxyError> {
        let payload = json!({ "id": external_id });
        self.request(Method::POST, "/model/delete", Some(&payload))
            .await?;
        self.settle().await;
        self.cache.invalidate_prefix("models:");
        Ok(())
    }

    // --- keys ---

    pub async fn generate_key(
        &self,
        request: &GenerateKeyRequest,
    ) -> Result<GeneratedKey, ProxyError> {
        let payload = serde_json::to_value(request).map_err(|e| {
            ProxyError::UnexpectedResponse {
                message: format!("failed to serialize key request: {}", e),
            }
        })?;
        let raw = self
            .request(Method::POST, "/key/generate", Some(&payload))
            .await?;
        serde_json::from_value(raw).map_err(|e| ProxyError::UnexpectedResponse {
            message: format!("malformed /key/generate response: {}", e),
        })
    }

    pub async fn get_key_info(&self, key: &str) -> Result<KeyInfo, ProxyError> {
        let endpoint = format!("/key/info?key={}", key);
        let raw = self.request(Method::GET, &endpoint, None).await?;
        normalize_key_info(&raw).ok_or_else(|| ProxyError::UnexpectedResponse {
            message: "malformed /key/info response".to_string(),
        })
    }

    pub async fn update_key(
        &self,
        key: &str,
        fields: &JsonValue,
    ) -> Result<JsonValue, ProxyError> {
        let mut payload = fields.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("key".to_string(), json!(key));
        }
        self.request(Method::POST, "/key/update", Some(&payload))
            .await
    }

    /// Delete a key on the proxy. A key the proxy no longer knows counts as
    /// deleted, so 404-style rejections are swallowed.
    pub async fn delete_key(&self, key: &str) -> Result<(), ProxyError> {
        let payload = json!({ "keys": [key] });
        match self
            .request(Method::POST, "/key/delete", Some(&payload))
            .await
        {
            Ok(_) => Ok(()),
            Err(ProxyError::Validation { status, message })
                if status == StatusCode::NOT_FOUND.as_u16()
                    || message.to_lowercase().contains("not found") =>
            {
                tracing::debug!(message, "Key already absent on proxy, treating as deleted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // --- users and teams ---

    /// Look up a user. The proxy never 404s here; absence is inferred from
    /// the placeholder-shaped response.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<ProxyUserInfo>, ProxyError> {
        let endpoint = format!("/user/info?user_id={}", user_id);
        match self.request(Method::GET, &endpoint, None).await {
            Ok(raw) => {
                let info =
                    normalize_user_info(&raw).ok_or_else(|| ProxyError::UnexpectedResponse {
                        message: "malformed /user/info response".to_string(),
                    })?;
                Ok(info.exists().then_some(info))
            }
            Err(ProxyError::Validation { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn create_user(
        &self,
        user_id: &str,
        user_email: Option<&str>,
    ) -> Result<JsonValue, ProxyError> {
        let mut payload = json!({ "user_id": user_id, "auto_create_key": false });
        if let Some(email) = user_email {
            payload["user_email"] = json!(email);
        }
        if let Some(team_id) = &self.config.team_id {
            payload["team_id"] = json!(team_id);
        }
        self.request(Method::POST, "/user/new", Some(&payload)).await
    }

    /// Create the user on the proxy if it does not exist yet.
    pub async fn ensure_user(
        &self,
        user_id: &str,
        user_email: Option<&str>,
    ) -> Result<(), ProxyError> {
        if self.get_user(user_id).await?.is_none() {
            tracing::info!(user_id, "Creating user on proxy");
            self.create_user(user_id, user_email).await?;
        }
        Ok(())
    }

    pub async fn get_team(&self, team_id: &str) -> Result<Option<JsonValue>, ProxyError> {
        let endpoint = format!("/team/info?team_id={}", team_id);
        match self.request(Method::GET, &endpoint, None).await {
            Ok(raw) => Ok(Some(raw)),
            Err(ProxyError::Validation { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn ensure_team(&self, team_id: &str) -> Result<(), ProxyError> {
        if self.get_team(team_id).await?.is_none() {
            tracing::info!(team_id, "Creating team on proxy");
            let payload = json!({ "team_id": team_id });
            self.request(Method::POST, "/team/new", Some(&payload))
                .await?;
        }
        Ok(())
    }

    // --- activity ---

    /// Fetch the daily activity report across all pages. Pages are walked
    /// until the proxy reports no further pages; the metadata aggregates from
    /// the final page are kept verbatim.
    pub async fn get_daily_activity(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<DailyActivityReport, ProxyError> {
        let mut days: Vec<DailyActivityDay> = Vec::new();
        let mut metadata = JsonValue::Null;
        let mut page: u32 = 1;

        loop {
            let endpoint = format!(
                "/user/daily/activity?start_date={}&end_date={}&page={}&page_size={}",
                start_date, end_date, page, self.config.activity_page_size
            );
            let raw = self.request(Method::GET, &endpoint, None).await?;

            let results = raw
                .get("results")
                .and_then(JsonValue::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in &results {
                if let Ok(day) = serde_json::from_value::<DailyActivityDay>(entry.clone()) {
                    days.push(day);
                }
            }
            if let Some(meta) = raw.get("metadata") {
                metadata = meta.clone();
            }

            let total_pages = raw
                .get("metadata")
                .and_then(|m| m.get("total_pages"))
                .and_then(JsonValue::as_u64)
                .unwrap_or(1);

            if results.is_empty() || u64::from(page) >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(DailyActivityReport { days, metadata })
    }

    // --- health ---

    /// Liveness probe against the proxy, cached like any other read.
    pub async fn health(&self, force_refresh: bool) -> Result<JsonValue, ProxyError> {
        if !force_refresh {
            if let Some(cached) = self.cache.get_fresh("health") {
                return Ok(cached);
            }
        }
        let raw = self.request(Method::GET, "/health/liveliness", None).await?;
        self.cache.put("health", raw.clone());
        Ok(raw)
    }

    async fn settle(&self) {
        // The proxy applies model writes asynchronously; give its internal
        // config a moment before the next read.
        sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
    }

    // --- mock mode ---

    /// Canned responses for development without a running proxy.
    fn mock_response(
        &self,
        method: &Method,
        endpoint: &str,
        _body: Option<&JsonValue>,
    ) -> Result<JsonValue, ProxyError> {
        tracing::debug!(%method, endpoint, "Serving mock proxy response");

        if endpoint.starts_with("/model/info") {
            return Ok(json!({
                "data": [
                    {
                        "model_name": "mock-gpt",
                        "litellm_params": { "model": "openai/mock-gpt" },
                        "model_info": {
                            "id": "mock-model-1",
                            "litellm_provider": "openai",
                            "input_cost_per_token": 0.000001,
                            "output_cost_per_token": 0.000002,
                            "max_input_tokens": 128000,
                            "supports_vision": true,
                            "supports_function_calling": true
                        }
                    }
                ]
            }));
        }

        if endpoint.starts_with("/key/generate") {
            let suffix: String = rand::thread_rng()
                .sample_iter(rand::distributions::Alphanumeric)
                .take(24)
                .map(char::from)
                .collect();
            return Ok(json!({ "key": format!("sk-mock-{}", suffix) }));
        }

        if endpoint.starts_with("/key/info") {
            return Ok(json!({
                "info": { "key_alias": "mock-alias", "models": ["mock-gpt"], "spend": 0.0 }
            }));
        }

        if endpoint.starts_with("/user/info") {
            return Ok(json!({
                "user_id": "mock-user",
                "teams": [],
                "user_info": { "user_email": "mock@example.com" }
            }));
        }

        if endpoint.starts_with("/user/daily/activity") {
            return Ok(json!({
                "results": [],
                "metadata": { "total_pages": 1, "total_spend": 0.0 }
            }));
        }

        if endpoint.starts_with("/health") {
            return Ok(json!({ "status": "healthy" }));
        }

        // Writes (model/key/user/team mutations) acknowledge with an empty
        // object.
        Ok(json!({}))
    }
}

fn parse_model_list(raw: &JsonValue) -> Vec<ProxyModel> {
    raw.get("data")
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(ProxyModel::from_info_entry)
                .collect()
        })
        .unwrap_or_default()
}

/// Pull a human-readable message out of a proxy error body, whatever its
/// nesting.
fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<JsonValue>(body) {
        for path in [
            &["error", "message"][..],
            &["detail", "error"][..],
            &["detail"][..],
            &["message"][..],
        ] {
            let mut cursor = &parsed;
            let mut found = true;
            for segment in path {
                match cursor.get(segment) {
                    Some(next) => cursor = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(text) = cursor.as_str() {
                    return text.to_string();
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
