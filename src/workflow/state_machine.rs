use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::backend::TaskId;
use crate::forms::VehicleClass;
use crate::status::ApplyState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    Completed,
    Failed,
}

impl Settlement {
    /// Terminal outcome implied by a progress value and backend status, if any
    pub fn from_progress(progress: u8, state: ApplyState) -> Option<Self> {
        match state {
            ApplyState::Failed => Some(Settlement::Failed),
            ApplyState::Completed => Some(Settlement::Completed),
            _ if progress >= 100 => Some(Settlement::Completed),
            _ => None,
        }
    }
}

/// Where one enrollment attempt stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Submitting {
        class: VehicleClass,
        attempt: u64,
    },
    /// Backend answered `success: false`, or the request never completed
    SubmitFailed {
        class: VehicleClass,
    },
    /// Passenger run accepted; progress is polled while a task id is known
    Polling {
        task_id: Option<TaskId>,
    },
    /// Passenger run waiting for the SMS code the backend sent out
    AwaitingVerification {
        task_id: Option<TaskId>,
        verify_code_no: String,
    },
    /// Truck run accepted; trucks have no polling or verification step
    Accepted {
        task_id: Option<TaskId>,
    },
    Confirming {
        attempt: u64,
        resume: Box<WorkflowState>,
    },
    Settled(Settlement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Submit {
        class: VehicleClass,
        attempt: u64,
    },
    SubmissionAccepted {
        class: VehicleClass,
        task_id: Option<TaskId>,
        verify_code_no: Option<String>,
        progress: u8,
        state: ApplyState,
    },
    SubmissionFailed,
    ProgressReported {
        progress: u8,
        state: ApplyState,
    },
    ConfirmStarted {
        attempt: u64,
    },
    Confirmed,
    ConfirmFailed,
    Abandon,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot handle {event} while {state}")]
    InvalidTransition { state: String, event: String },
    #[error("Submission for {event} arrived while submitting {state}")]
    ClassMismatch { state: VehicleClass, event: VehicleClass },
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Submitting { .. } => "submitting",
            WorkflowState::SubmitFailed { .. } => "submit-failed",
            WorkflowState::Polling { .. } => "polling",
            WorkflowState::AwaitingVerification { .. } => "awaiting-verification",
            WorkflowState::Accepted { .. } => "accepted",
            WorkflowState::Confirming { .. } => "confirming",
            WorkflowState::Settled(Settlement::Completed) => "completed",
            WorkflowState::Settled(Settlement::Failed) => "failed",
        }
    }

    /// Task id the state is tracking, looking through a pending confirmation
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            WorkflowState::Polling { task_id }
            | WorkflowState::AwaitingVerification { task_id, .. }
            | WorkflowState::Accepted { task_id } => task_id.as_ref(),
            WorkflowState::Confirming { resume, .. } => resume.task_id(),
            _ => None,
        }
    }

    /// A request or an enrollment run is still outstanding
    pub fn is_in_flight(&self) -> bool {
        match self {
            WorkflowState::Submitting { .. }
            | WorkflowState::Confirming { .. }
            | WorkflowState::AwaitingVerification { .. } => true,
            WorkflowState::Polling { task_id } => task_id.is_some(),
            WorkflowState::Idle
            | WorkflowState::SubmitFailed { .. }
            | WorkflowState::Accepted { .. }
            | WorkflowState::Settled(_) => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, WorkflowState::Settled(_))
    }

    pub fn awaits_verification(&self) -> bool {
        matches!(self, WorkflowState::AwaitingVerification { .. })
    }

    pub fn submission_attempt(&self) -> Option<u64> {
        match self {
            WorkflowState::Submitting { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    pub fn confirmation_attempt(&self) -> Option<u64> {
        match self {
            WorkflowState::Confirming { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    /// Apply one event. Invalid combinations leave the caller's state untouched.
    pub fn on(&self, event: WorkflowEvent) -> Result<WorkflowState, TransitionError> {
        use WorkflowEvent as E;
        use WorkflowState as S;

        let next = match (self, event) {
            // Latest submission wins from every state
            (_, E::Submit { class, attempt }) => S::Submitting { class, attempt },
            (_, E::Abandon) => S::Idle,

            (
                S::Submitting { class, .. },
                E::SubmissionAccepted {
                    class: accepted,
                    task_id,
                    verify_code_no,
                    progress,
                    state,
                },
            ) => {
                if *class != accepted {
                    return Err(TransitionError::ClassMismatch {
                        state: *class,
                        event: accepted,
                    });
                }
                match accepted {
                    VehicleClass::Truck => S::Accepted { task_id },
                    VehicleClass::Passenger => match Settlement::from_progress(progress, state) {
                        Some(settlement) => S::Settled(settlement),
                        None => match verify_code_no {
                            Some(verify_code_no) => S::AwaitingVerification {
                                task_id,
                                verify_code_no,
                            },
                            None => S::Polling { task_id },
                        },
                    },
                }
            }
            (S::Submitting { class, .. }, E::SubmissionFailed) => S::SubmitFailed { class: *class },

            (
                current @ (S::Polling { .. } | S::AwaitingVerification { .. }),
                E::ProgressReported { progress, state },
            ) => match Settlement::from_progress(progress, state) {
                Some(settlement) => S::Settled(settlement),
                None => current.clone(),
            },
            (current @ S::Confirming { .. }, E::ProgressReported { progress, state }) => {
                match Settlement::from_progress(progress, state) {
                    Some(settlement) => S::Settled(settlement),
                    None => current.clone(),
                }
            }

            (
                current @ (S::Polling { .. } | S::AwaitingVerification { .. }),
                E::ConfirmStarted { attempt },
            ) => S::Confirming {
                attempt,
                resume: Box::new(current.clone()),
            },
            (S::Confirming { .. }, E::Confirmed) => S::Settled(Settlement::Completed),
            (S::Confirming { resume, .. }, E::ConfirmFailed) => (**resume).clone(),

            // A poll tick may settle the run while the confirmation is in flight
            (S::Settled(Settlement::Completed), E::Confirmed) => S::Settled(Settlement::Completed),
            (settled @ S::Settled(_), E::ConfirmFailed) => settled.clone(),

            (state, event) => {
                return Err(TransitionError::InvalidTransition {
                    state: state.to_string(),
                    event: event.name().to_string(),
                })
            }
        };
        Ok(next)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Submit { .. } => "submit",
            WorkflowEvent::SubmissionAccepted { .. } => "submission-accepted",
            WorkflowEvent::SubmissionFailed => "submission-failed",
            WorkflowEvent::ProgressReported { .. } => "progress-reported",
            WorkflowEvent::ConfirmStarted { .. } => "confirm-started",
            WorkflowEvent::Confirmed => "confirmed",
            WorkflowEvent::ConfirmFailed => "confirm-failed",
            WorkflowEvent::Abandon => "abandon",
        }
    }
}
