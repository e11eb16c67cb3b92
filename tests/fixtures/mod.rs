//! Shared wiremock fixtures for the ETC backend
#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use etc_apply::config::{BackendConfig, EtcApplyConfig};
use etc_apply::http::HttpBackendClient;

/// Mock ETC backend rooted at `<server>/api`
pub struct EtcApiMock {
    pub server: MockServer,
    pub base_url: String,
}

impl EtcApiMock {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let base_url = format!("{}/api", server.uri());
        Self { server, base_url }
    }

    pub fn backend_config(&self) -> BackendConfig {
        let mut config = EtcApplyConfig::default().backend;
        config.base_url = self.base_url.clone();
        config.timeout_seconds = 2;
        config.rate_limit.requests_per_second = 100;
        config.rate_limit.burst_capacity = 100;
        config
    }

    pub fn client(&self) -> HttpBackendClient {
        HttpBackendClient::new(&self.backend_config())
            .expect("client")
            .with_metrics(false)
    }

    /// Answer `verb api_path` with `body` (status 200)
    pub async fn respond(&self, verb: &str, api_path: &str, body: Value) {
        Mock::given(method(verb))
            .and(path(format!("/api{api_path}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Like [`respond`](Self::respond) but only for the next `times` requests
    pub async fn respond_times(&self, verb: &str, api_path: &str, body: Value, times: u64) {
        Mock::given(method(verb))
            .and(path(format!("/api{api_path}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    pub async fn respond_status(&self, verb: &str, api_path: &str, status: u16, body: Value) {
        Mock::given(method(verb))
            .and(path(format!("/api{api_path}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

pub fn ok(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

pub fn ok_with_message(data: Value, message: &str) -> Value {
    json!({ "success": true, "message": message, "data": data })
}

pub fn rejected(message: &str) -> Value {
    json!({ "success": false, "message": message })
}
