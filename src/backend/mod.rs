//! Backend service contract
//!
//! The enrollment workflow only talks to the backend through [`EtcBackend`].
//! `crate::http::HttpBackendClient` is the production implementation; tests
//! swap in the scripted fake from [`mocks`] or the `mockall` double.

pub mod errors;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mocks;

use async_trait::async_trait;

use crate::forms::{FormPayload, VehicleClass};

pub use errors::BackendError;
pub use types::{
    ApplyReceipt, ConfirmRequest, DefaultDataPayload, Envelope, ProgressReport, ProvinceList,
    TaskId, VehicleColors,
};

pub type BackendResult<T> = Result<Envelope<T>, BackendError>;

/// Request/response operations exposed by the ETC backend
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EtcBackend: Send + Sync {
    /// Default field values and reference lists for one vehicle class
    async fn default_data(&self, class: VehicleClass) -> BackendResult<DefaultDataPayload>;

    async fn provinces(&self) -> BackendResult<ProvinceList>;

    /// Submit a filled form. Passenger and truck use separate endpoints.
    async fn apply(
        &self,
        class: VehicleClass,
        payload: &FormPayload,
    ) -> BackendResult<ApplyReceipt>;

    /// Progress of a passenger enrollment run
    async fn progress(&self, task_id: &TaskId) -> BackendResult<ProgressReport>;

    async fn confirm_verify_code(
        &self,
        request: &ConfirmRequest,
    ) -> BackendResult<serde_json::Value>;

    /// Store a form without starting an enrollment
    async fn save_data(
        &self,
        class: VehicleClass,
        payload: &FormPayload,
    ) -> BackendResult<serde_json::Value>;

    async fn send_verify_code(&self, phone: &str) -> BackendResult<serde_json::Value>;

    async fn plate_letters(&self, province: &str) -> BackendResult<Vec<String>>;

    async fn operators(&self, class: VehicleClass) -> BackendResult<serde_json::Value>;

    async fn products(
        &self,
        class: VehicleClass,
        operator_code: &str,
    ) -> BackendResult<serde_json::Value>;

    async fn service_status(&self, class: VehicleClass) -> BackendResult<serde_json::Value>;
}
