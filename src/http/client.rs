use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{
    ApplyReceipt, BackendError, BackendResult, ConfirmRequest, DefaultDataPayload, Envelope,
    EtcBackend, ProgressReport, ProvinceList, TaskId,
};
use crate::config::BackendConfig;
use crate::forms::{FormPayload, VehicleClass};
use crate::observability::{backend_metrics, BackendApiMetrics, OperationTimer};

/// reqwest-backed [`EtcBackend`] with a local rate limit and a response
/// cache for reference lookups.
pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    cache: Cache<String, Envelope<Value>>,
    metrics: Option<&'static BackendApiMetrics>,
}

fn class_prefix(class: VehicleClass) -> &'static str {
    match class {
        VehicleClass::Passenger => "etc",
        VehicleClass::Truck => "truck",
    }
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let per_second =
            NonZeroU32::new(config.rate_limit.requests_per_second).ok_or_else(|| {
                BackendError::Config("requests_per_second must be positive".to_string())
            })?;
        let burst = NonZeroU32::new(config.rate_limit.burst_capacity.max(1))
            .ok_or_else(|| BackendError::Config("burst_capacity must be positive".to_string()))?;
        let quota = Quota::per_second(per_second).allow_burst(burst);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        let cache = Cache::builder()
            .max_capacity(config.cache.max_capacity)
            .time_to_live(Duration::from_secs(config.cache.ttl_seconds))
            .build();

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        info!(base_url = %base_url, timeout_s = config.timeout_seconds, "Backend client ready");

        Ok(Self {
            http,
            base_url,
            timeout: config.timeout(),
            rate_limiter,
            cache,
            metrics: Some(backend_metrics()),
        })
    }

    /// Turn counter recording on or off
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled.then(backend_metrics);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// URL for `path` followed by one opaque, percent-encoded segment
    fn segment_url(&self, path: &str, segment: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| BackendError::Config(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Config("base url cannot take a path".to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    fn record(&self, f: impl FnOnce(&BackendApiMetrics)) {
        if let Some(metrics) = self.metrics {
            f(metrics);
        }
    }

    /// Rate-limit, send, check the HTTP status and decode the envelope.
    /// Successful envelopes are cached under `cache_key` when one is given.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        cache_key: Option<String>,
    ) -> BackendResult<T> {
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key).await {
                debug!(operation, key = %key, "Cache hit");
                self.record(BackendApiMetrics::record_cache_hit);
                return decode_envelope(operation, cached);
            }
            self.record(BackendApiMetrics::record_cache_miss);
        }

        if self.rate_limiter.check().is_err() {
            self.record(BackendApiMetrics::record_rate_limit_wait);
            self.rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
                .await;
        }

        self.record(BackendApiMetrics::record_request);
        let timer = OperationTimer::new(operation);
        let result = self.round_trip(operation, request).await;
        timer.finish(result.is_ok());

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(err) => {
                if matches!(err, BackendError::Timeout { .. }) {
                    self.record(BackendApiMetrics::record_timeout);
                }
                self.record(BackendApiMetrics::record_error);
                return Err(err);
            }
        };

        if !envelope.success {
            warn!(operation, message = ?envelope.message(), "Backend answered success=false");
        }
        if let (Some(key), true) = (cache_key, envelope.success) {
            self.cache.insert(key, envelope.clone()).await;
        }
        decode_envelope(operation, envelope)
    }

    async fn round_trip(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Envelope<Value>, BackendError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::from_transport(e, operation, timeout_ms))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_transport(e, operation, timeout_ms))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Envelope<Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.message().map(str::to_string));
            return Err(BackendError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| BackendError::Protocol(format!("{operation}: malformed response: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> BackendResult<T> {
        self.execute(operation, self.request(Method::GET, path), None)
            .await
    }

    /// GET `path/{segment}`, cached under the decoded segment
    async fn get_segment<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        segment: &str,
        cached: bool,
    ) -> BackendResult<T> {
        let url = self.segment_url(path, segment)?;
        let key = cached.then(|| format!("{path}/{segment}"));
        self.execute(operation, self.http.get(url), key).await
    }

    async fn get_cached<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> BackendResult<T> {
        let key = cache_key(path, query);
        let request = self.request(Method::GET, path).query(query);
        self.execute(operation, request, Some(key)).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> BackendResult<T> {
        self.execute(operation, self.request(Method::POST, path).json(body), None)
            .await
    }
}

fn cache_key(path: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let params: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{}?{}", path, params.join("&"))
}

/// Decode `data` into `T`. A success envelope with undecodable data is a
/// protocol failure; failure envelopes keep their message and drop the data.
fn decode_envelope<T: DeserializeOwned>(
    operation: &str,
    envelope: Envelope<Value>,
) -> BackendResult<T> {
    let data = match envelope.data {
        None | Some(Value::Null) => None,
        Some(value) if envelope.success => Some(serde_json::from_value(value).map_err(|e| {
            BackendError::Protocol(format!("{operation}: unexpected data: {e}"))
        })?),
        Some(value) => serde_json::from_value(value).ok(),
    };
    Ok(Envelope {
        success: envelope.success,
        message: envelope.message,
        data,
    })
}

#[async_trait]
impl EtcBackend for HttpBackendClient {
    async fn default_data(&self, class: VehicleClass) -> BackendResult<DefaultDataPayload> {
        let path = format!("/{}/get_default_data", class_prefix(class));
        self.get_cached("default_data", &path, &[]).await
    }

    async fn provinces(&self) -> BackendResult<ProvinceList> {
        self.get_cached("provinces", "/common/provinces", &[]).await
    }

    async fn apply(
        &self,
        class: VehicleClass,
        payload: &FormPayload,
    ) -> BackendResult<ApplyReceipt> {
        let path = format!("/{}/apply", class_prefix(class));
        self.post("apply", &path, payload).await
    }

    async fn progress(&self, task_id: &TaskId) -> BackendResult<ProgressReport> {
        self.get_segment("progress", "/etc/progress", task_id.as_str(), false)
            .await
    }

    async fn confirm_verify_code(&self, request: &ConfirmRequest) -> BackendResult<Value> {
        self.post("confirm_verify_code", "/etc/confirm_verify_code", request)
            .await
    }

    async fn save_data(&self, class: VehicleClass, payload: &FormPayload) -> BackendResult<Value> {
        let path = format!("/{}/save_data", class_prefix(class));
        self.post("save_data", &path, payload).await
    }

    async fn send_verify_code(&self, phone: &str) -> BackendResult<Value> {
        self.post(
            "send_verify_code",
            "/etc/verify_code",
            &serde_json::json!({ "phone": phone }),
        )
        .await
    }

    async fn plate_letters(&self, province: &str) -> BackendResult<Vec<String>> {
        self.get_segment("plate_letters", "/common/plate_letters", province, true)
            .await
    }

    async fn operators(&self, class: VehicleClass) -> BackendResult<Value> {
        match class {
            VehicleClass::Passenger => {
                self.get_cached("operators", "/etc/operators", &[("vehicle_type", "0")])
                    .await
            }
            VehicleClass::Truck => self.get_cached("operators", "/truck/operators", &[]).await,
        }
    }

    async fn products(&self, class: VehicleClass, operator_code: &str) -> BackendResult<Value> {
        match class {
            VehicleClass::Passenger => {
                self.get_cached(
                    "products",
                    "/etc/products",
                    &[("operator_code", operator_code), ("vehicle_type", "0")],
                )
                .await
            }
            VehicleClass::Truck => {
                self.get_cached("products", "/truck/products", &[("operator_code", operator_code)])
                    .await
            }
        }
    }

    async fn service_status(&self, class: VehicleClass) -> BackendResult<Value> {
        let path = format!("/{}/status", class_prefix(class));
        self.get("service_status", &path).await
    }
}
