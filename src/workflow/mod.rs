//! Enrollment workflow
//!
//! [`EnrollmentWorkflow`] owns the form store and the status tracker, submits
//! applications through an [`EtcBackend`](crate::backend::EtcBackend), polls
//! passenger runs until they settle and confirms SMS codes.

pub mod errors;
pub mod messages;
pub mod orchestrator;
pub mod polling;
pub mod state_machine;

pub use errors::WorkflowError;
pub use orchestrator::{EnrollmentWorkflow, SubmitPolicy, WorkflowSettings};
pub use polling::{PollControl, PollHandle, PollToken};
pub use state_machine::{Settlement, TransitionError, WorkflowEvent, WorkflowState};
