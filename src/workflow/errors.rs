use thiserror::Error;

use super::state_machine::TransitionError;
use crate::backend::BackendError;
use crate::forms::FormError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("A submission is already in flight ({state})")]
    SubmissionInFlight { state: String },

    #[error("Superseded by a newer {operation} before the response arrived")]
    Superseded { operation: &'static str },
}

impl WorkflowError {
    /// Text suitable for the status line of a UI
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Backend(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}
