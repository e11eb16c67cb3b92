// Scripted backend for workflow tests - no network, every call recorded

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::backend::*;
use crate::forms::{FormPayload, VehicleClass};

/// Calls observed by [`ScriptedBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    DefaultData(VehicleClass),
    Provinces,
    Apply {
        class: VehicleClass,
        payload: serde_json::Value,
    },
    Progress(TaskId),
    ConfirmVerifyCode(ConfirmRequest),
    SaveData {
        class: VehicleClass,
        payload: serde_json::Value,
    },
    SendVerifyCode(String),
    PlateLetters(String),
    Operators(VehicleClass),
    Products {
        class: VehicleClass,
        operator_code: String,
    },
    ServiceStatus(VehicleClass),
}

/// Backend double that answers from per-operation queues.
///
/// An operation with an empty queue answers with a network error, so a test
/// only has to script the responses it cares about.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    default_data: Mutex<VecDeque<BackendResult<DefaultDataPayload>>>,
    provinces: Mutex<VecDeque<BackendResult<ProvinceList>>>,
    apply: Mutex<VecDeque<BackendResult<ApplyReceipt>>>,
    progress: Mutex<VecDeque<BackendResult<ProgressReport>>>,
    confirm: Mutex<VecDeque<BackendResult<serde_json::Value>>>,
    raw: Mutex<VecDeque<BackendResult<serde_json::Value>>>,
    plate_letters: Mutex<VecDeque<BackendResult<Vec<String>>>>,
    calls: Mutex<Vec<BackendCall>>,
    latency: Mutex<Duration>,
}

fn pop<T>(queue: &Mutex<VecDeque<BackendResult<T>>>, operation: &str) -> BackendResult<T> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| {
            Err(BackendError::Network(format!(
                "no scripted response for {operation}"
            )))
        })
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_default_data(&self, response: BackendResult<DefaultDataPayload>) -> &Self {
        self.default_data.lock().unwrap().push_back(response);
        self
    }

    pub fn push_provinces(&self, response: BackendResult<ProvinceList>) -> &Self {
        self.provinces.lock().unwrap().push_back(response);
        self
    }

    pub fn push_apply(&self, response: BackendResult<ApplyReceipt>) -> &Self {
        self.apply.lock().unwrap().push_back(response);
        self
    }

    pub fn push_progress(&self, response: BackendResult<ProgressReport>) -> &Self {
        self.progress.lock().unwrap().push_back(response);
        self
    }

    pub fn push_confirm(&self, response: BackendResult<serde_json::Value>) -> &Self {
        self.confirm.lock().unwrap().push_back(response);
        self
    }

    /// Answer for the pass-through operations (save, SMS, operators, products, status)
    pub fn push_raw(&self, response: BackendResult<serde_json::Value>) -> &Self {
        self.raw.lock().unwrap().push_back(response);
        self
    }

    pub fn push_plate_letters(&self, response: BackendResult<Vec<String>>) -> &Self {
        self.plate_letters.lock().unwrap().push_back(response);
        self
    }

    /// Delay applied before apply, progress and confirm calls answer
    pub fn set_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn progress_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, BackendCall::Progress(_)))
            .count()
    }

    pub fn confirm_requests(&self) -> Vec<ConfirmRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                BackendCall::ConfirmVerifyCode(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl EtcBackend for ScriptedBackend {
    async fn default_data(&self, class: VehicleClass) -> BackendResult<DefaultDataPayload> {
        self.record(BackendCall::DefaultData(class));
        pop(&self.default_data, "default_data")
    }

    async fn provinces(&self) -> BackendResult<ProvinceList> {
        self.record(BackendCall::Provinces);
        pop(&self.provinces, "provinces")
    }

    async fn apply(
        &self,
        class: VehicleClass,
        payload: &FormPayload,
    ) -> BackendResult<ApplyReceipt> {
        self.record(BackendCall::Apply {
            class,
            payload: serde_json::to_value(payload).unwrap_or_default(),
        });
        self.wait().await;
        pop(&self.apply, "apply")
    }

    async fn progress(&self, task_id: &TaskId) -> BackendResult<ProgressReport> {
        self.record(BackendCall::Progress(task_id.clone()));
        self.wait().await;
        pop(&self.progress, "progress")
    }

    async fn confirm_verify_code(
        &self,
        request: &ConfirmRequest,
    ) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::ConfirmVerifyCode(request.clone()));
        self.wait().await;
        pop(&self.confirm, "confirm_verify_code")
    }

    async fn save_data(
        &self,
        class: VehicleClass,
        payload: &FormPayload,
    ) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::SaveData {
            class,
            payload: serde_json::to_value(payload).unwrap_or_default(),
        });
        pop(&self.raw, "save_data")
    }

    async fn send_verify_code(&self, phone: &str) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::SendVerifyCode(phone.to_string()));
        pop(&self.raw, "send_verify_code")
    }

    async fn plate_letters(&self, province: &str) -> BackendResult<Vec<String>> {
        self.record(BackendCall::PlateLetters(province.to_string()));
        pop(&self.plate_letters, "plate_letters")
    }

    async fn operators(&self, class: VehicleClass) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::Operators(class));
        pop(&self.raw, "operators")
    }

    async fn products(
        &self,
        class: VehicleClass,
        operator_code: &str,
    ) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::Products {
            class,
            operator_code: operator_code.to_string(),
        });
        pop(&self.raw, "products")
    }

    async fn service_status(&self, class: VehicleClass) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::ServiceStatus(class));
        pop(&self.raw, "service_status")
    }
}
