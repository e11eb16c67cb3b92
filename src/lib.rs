// ETC application client
// Form state, backend access and the enrollment workflow, plus the CLI front end

pub mod backend;
pub mod cli;
pub mod config;
pub mod forms;
pub mod http;
pub mod observability;
pub mod shutdown;
pub mod status;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use backend::{BackendError, Envelope, EtcBackend, TaskId};
pub use crate::config::{config, EtcApplyConfig};
pub use forms::{FormError, FormPayload, FormStore, VehicleClass};
pub use http::HttpBackendClient;
pub use observability::{backend_metrics, create_workflow_span, BackendApiMetrics, OperationTimer};
pub use shutdown::ShutdownCoordinator;
pub use status::{ApplyState, ApplyStatus, StatusTracker, StatusUpdate};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflow::{
    EnrollmentWorkflow, SubmitPolicy, WorkflowError, WorkflowSettings, WorkflowState,
};
