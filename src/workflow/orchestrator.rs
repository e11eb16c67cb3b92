use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::errors::WorkflowError;
use super::messages;
use super::polling::{spawn_poll_loop, PollControl, PollHandle};
use super::state_machine::{WorkflowEvent, WorkflowState};
use crate::backend::{
    ApplyReceipt, BackendError, BackendResult, ConfirmRequest, DefaultDataPayload, Envelope,
    EtcBackend, ProvinceList, TaskId,
};
use crate::forms::{DefaultReferenceData, FormPayload, FormStore, MergeReport, VehicleClass};
use crate::status::{ApplyState, ApplyStatus, StatusTracker, StatusUpdate};

/// What happens when `submit` is called while another run is still going
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    /// The new submission cancels the previous run's polling; late
    /// responses from the old run are discarded.
    #[default]
    LatestWins,
    RejectWhileInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub poll_interval: Duration,
    pub submit_policy: SubmitPolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            submit_policy: SubmitPolicy::LatestWins,
        }
    }
}

struct Shared {
    backend: Arc<dyn EtcBackend>,
    forms: RwLock<FormStore>,
    tracker: StatusTracker,
    // Lock order: state, then poller
    state: Mutex<WorkflowState>,
    poller: Mutex<Option<PollHandle>>,
    attempts: AtomicU64,
    // Attempt number of the submission that opened the current run
    run: AtomicU64,
    settings: WorkflowSettings,
}

/// Drives one applicant's enrollment: form state, submission, progress
/// polling and SMS verification.
///
/// Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct EnrollmentWorkflow {
    shared: Arc<Shared>,
}

impl EnrollmentWorkflow {
    pub fn new(backend: Arc<dyn EtcBackend>, settings: WorkflowSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                forms: RwLock::new(FormStore::new()),
                tracker: StatusTracker::new(),
                state: Mutex::new(WorkflowState::Idle),
                poller: Mutex::new(None),
                attempts: AtomicU64::new(0),
                run: AtomicU64::new(0),
                settings,
            }),
        }
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.shared.settings
    }

    pub fn status(&self) -> ApplyStatus {
        self.shared.tracker.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplyStatus> {
        self.shared.tracker.subscribe()
    }

    pub async fn state(&self) -> WorkflowState {
        self.shared.state.lock().await.clone()
    }

    pub async fn is_polling(&self) -> bool {
        self.shared
            .poller
            .lock()
            .await
            .as_ref()
            .is_some_and(PollHandle::is_active)
    }

    pub async fn form(&self, class: VehicleClass) -> FormPayload {
        self.shared.forms.read().await.form(class).clone()
    }

    pub async fn reference_data(&self) -> DefaultReferenceData {
        self.shared.forms.read().await.reference_data().clone()
    }

    pub async fn update_form<I, K, V>(&self, class: VehicleClass, partial: I) -> MergeReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.shared.forms.write().await.update_form(class, partial)
    }

    /// Same as [`update_form`](Self::update_form) for a class given by name.
    pub async fn update_form_named<I, K, V>(
        &self,
        class: &str,
        partial: I,
    ) -> Result<MergeReport, WorkflowError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let class: VehicleClass = class.parse()?;
        Ok(self.update_form(class, partial).await)
    }

    pub async fn reset_form(&self, class: VehicleClass) {
        self.shared.forms.write().await.reset_form(class);
        debug!(vehicle_class = %class, "Form reset to defaults");
    }

    /// Fetch defaults for `class` and merge them into the reference data.
    pub async fn load_defaults(
        &self,
        class: VehicleClass,
    ) -> Result<Envelope<DefaultDataPayload>, WorkflowError> {
        let envelope = logged("default_data", self.shared.backend.default_data(class).await)?;
        match (&envelope.data, envelope.success) {
            (Some(data), true) => {
                self.shared.forms.write().await.merge_defaults(data.clone());
                info!(vehicle_class = %class, "Default data loaded");
            }
            _ => warn!(
                vehicle_class = %class,
                message = ?envelope.message(),
                "Default data request was not successful"
            ),
        }
        Ok(envelope)
    }

    pub async fn load_provinces(&self) -> Result<Envelope<ProvinceList>, WorkflowError> {
        let envelope = logged("provinces", self.shared.backend.provinces().await)?;
        match (&envelope.data, envelope.success) {
            (Some(list), true) => {
                self.shared.forms.write().await.merge_provinces(list.clone());
                info!("Province list loaded");
            }
            _ => warn!(message = ?envelope.message(), "Province request was not successful"),
        }
        Ok(envelope)
    }

    pub async fn save_draft(
        &self,
        class: VehicleClass,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        let payload = self.form(class).await;
        let envelope = logged("save_data", self.shared.backend.save_data(class, &payload).await)?;
        info!(vehicle_class = %class, success = envelope.success, "Draft saved");
        Ok(envelope)
    }

    pub async fn request_verification_code(
        &self,
        phone: &str,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        let envelope = logged(
            "send_verify_code",
            self.shared.backend.send_verify_code(phone).await,
        )?;
        info!(success = envelope.success, "Verification code requested");
        Ok(envelope)
    }

    pub async fn plate_letters(
        &self,
        province: &str,
    ) -> Result<Envelope<Vec<String>>, WorkflowError> {
        Ok(logged("plate_letters", self.shared.backend.plate_letters(province).await)?)
    }

    pub async fn operators(
        &self,
        class: VehicleClass,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        Ok(logged("operators", self.shared.backend.operators(class).await)?)
    }

    pub async fn products(
        &self,
        class: VehicleClass,
        operator_code: &str,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        Ok(logged(
            "products",
            self.shared.backend.products(class, operator_code).await,
        )?)
    }

    pub async fn service_status(
        &self,
        class: VehicleClass,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        Ok(logged("service_status", self.shared.backend.service_status(class).await)?)
    }

    pub async fn submit_passenger(&self) -> Result<Envelope<ApplyReceipt>, WorkflowError> {
        self.submit(VehicleClass::Passenger).await
    }

    pub async fn submit_truck(&self) -> Result<Envelope<ApplyReceipt>, WorkflowError> {
        self.submit(VehicleClass::Truck).await
    }

    /// Submit the current form for `class`.
    ///
    /// A passenger run that is accepted with a task id starts progress
    /// polling. Truck runs are accepted without polling.
    pub async fn submit(
        &self,
        class: VehicleClass,
    ) -> Result<Envelope<ApplyReceipt>, WorkflowError> {
        let attempt = self.next_attempt();
        {
            let mut state = self.shared.state.lock().await;
            if self.shared.settings.submit_policy == SubmitPolicy::RejectWhileInFlight
                && state.is_in_flight()
            {
                warn!(
                    vehicle_class = %class,
                    state = %*state,
                    "Rejecting submission while another run is in flight"
                );
                return Err(WorkflowError::SubmissionInFlight {
                    state: state.to_string(),
                });
            }
            let next = state.on(WorkflowEvent::Submit { class, attempt })?;
            *state = next;
            self.shared.run.store(attempt, Ordering::SeqCst);
            self.stop_polling().await;
            self.shared
                .tracker
                .replace(ApplyStatus::submitting(class, messages::SUBMITTING));
        }

        info!(vehicle_class = %class, attempt, "Submitting application");
        let payload = self.form(class).await;
        let result = self.shared.backend.apply(class, &payload).await;

        let mut state = self.shared.state.lock().await;
        if state.submission_attempt() != Some(attempt) {
            warn!(
                vehicle_class = %class,
                attempt,
                state = %*state,
                "Discarding apply response for a superseded submission"
            );
            return Err(WorkflowError::Superseded {
                operation: "submission",
            });
        }

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(err) => return Err(self.fail_submission(&mut state, class, err)),
        };

        if !envelope.success {
            let message = envelope.message().unwrap_or(messages::SUBMIT_FAILED).to_string();
            warn!(vehicle_class = %class, message = %message, "Application rejected by backend");
            *state = state.on(WorkflowEvent::SubmissionFailed)?;
            self.shared
                .tracker
                .set_status(StatusUpdate::new().applying(false).message(message));
            return Ok(envelope);
        }

        let Some(receipt) = envelope.data.clone() else {
            let err = BackendError::Protocol("apply response carried no data".to_string());
            return Err(self.fail_submission(&mut state, class, err));
        };

        let task_id = match class {
            VehicleClass::Passenger => receipt.apply_id.clone(),
            VehicleClass::Truck => receipt.task_id.clone(),
        }
        .map(TaskId::from);
        // A reported 0 counts as "not reported"
        let progress = receipt
            .progress
            .filter(|p| *p > 0)
            .unwrap_or(messages::INITIAL_PROGRESS)
            .min(100);
        let apply_state = receipt
            .status
            .as_deref()
            .map(ApplyState::from_wire)
            .unwrap_or_default();

        let mut update = StatusUpdate::new()
            .task_id(task_id.clone())
            .progress(progress)
            .message(envelope.message().unwrap_or(messages::SUBMITTED));
        let verify_code_no = match class {
            VehicleClass::Passenger => {
                update.order_id = receipt.order_id.clone();
                update.sign_order_id = receipt.sign_order_id.clone();
                update.verify_code_no = receipt.verify_code_no.clone();
                update.status = receipt.status.as_deref().map(ApplyState::from_wire);
                receipt.verify_code_no.clone()
            }
            VehicleClass::Truck => None,
        };

        let next = state.on(WorkflowEvent::SubmissionAccepted {
            class,
            task_id: task_id.clone(),
            verify_code_no,
            progress,
            state: apply_state,
        })?;
        let settled = next.is_settled();
        *state = next;
        if settled {
            update = update.applying(false);
        }
        self.shared.tracker.set_status(update);

        info!(
            vehicle_class = %class,
            task_id = ?task_id,
            progress,
            state = %*state,
            "Application accepted"
        );

        if class == VehicleClass::Passenger && !settled {
            if let Some(task_id) = task_id {
                self.start_polling(task_id).await;
            }
        }
        Ok(envelope)
    }

    /// Confirm the SMS code for the current passenger run.
    ///
    /// Ids missing from the status record are sent as nulls.
    pub async fn confirm_verify_code(
        &self,
        code: &str,
    ) -> Result<Envelope<serde_json::Value>, WorkflowError> {
        let attempt = self.next_attempt();
        let run = self.shared.run.load(Ordering::SeqCst);
        let request = {
            let mut state = self.shared.state.lock().await;
            let next = state.on(WorkflowEvent::ConfirmStarted { attempt })?;
            *state = next;
            let status = self.shared.tracker.set_status(
                StatusUpdate::new()
                    .applying(true)
                    .message(messages::CONFIRMING),
            );
            ConfirmRequest {
                verify_code: code.to_string(),
                order_id: status.order_id,
                sign_order_id: status.sign_order_id,
                verify_code_no: status.verify_code_no,
            }
        };

        if request.verify_code_no.is_none() {
            warn!("Confirming verification code without a verification serial number");
        }
        info!(attempt, "Confirming verification code");
        let result = self.shared.backend.confirm_verify_code(&request).await;

        let mut state = self.shared.state.lock().await;
        // A run settled by polling still takes its own confirmation
        let same_run = self.shared.run.load(Ordering::SeqCst) == run;
        let current = same_run
            && (state.confirmation_attempt() == Some(attempt) || state.is_settled());
        if !current {
            warn!(
                attempt,
                state = %*state,
                "Discarding confirmation response for a superseded run"
            );
            return Err(WorkflowError::Superseded {
                operation: "confirmation",
            });
        }

        match result {
            Ok(envelope) if envelope.success => {
                match state.on(WorkflowEvent::Confirmed) {
                    Ok(next) => *state = next,
                    Err(transition) => {
                        warn!(error = %transition, "Confirmation arrived after the run failed");
                        self.shared
                            .tracker
                            .set_status(StatusUpdate::new().applying(false));
                        return Err(transition.into());
                    }
                }
                self.stop_polling().await;
                let message = envelope.message().unwrap_or(messages::CONFIRMED).to_string();
                self.shared.tracker.set_status(
                    StatusUpdate::new()
                        .applying(false)
                        .progress(100)
                        .status(ApplyState::Completed)
                        .message(message),
                );
                info!("Verification code confirmed, enrollment completed");
                Ok(envelope)
            }
            Ok(envelope) => {
                if let Ok(next) = state.on(WorkflowEvent::ConfirmFailed) {
                    *state = next;
                }
                let message = envelope.message().unwrap_or(messages::CONFIRM_FAILED).to_string();
                warn!(message = %message, "Verification code rejected by backend");
                self.shared
                    .tracker
                    .set_status(StatusUpdate::new().applying(false).message(message));
                Ok(envelope)
            }
            Err(err) => {
                error!(error = %err, "Verification code confirmation failed");
                match state.on(WorkflowEvent::ConfirmFailed) {
                    Ok(next) => *state = next,
                    Err(transition) => {
                        warn!(error = %transition, "Could not roll back confirmation")
                    }
                }
                self.shared.tracker.set_status(
                    StatusUpdate::new()
                        .applying(false)
                        .message(messages::CONFIRM_FAILED),
                );
                Err(err.into())
            }
        }
    }

    /// Poll progress of `task_id` on the configured interval, replacing any
    /// loop that is already running.
    pub async fn start_polling(&self, task_id: TaskId) {
        let mut poller = self.shared.poller.lock().await;
        if let Some(previous) = poller.take() {
            debug!(
                previous = %previous.task_id(),
                next = %task_id,
                "Replacing progress poll loop"
            );
            previous.cancel();
        }

        let shared = Arc::clone(&self.shared);
        let tick_task_id = task_id.clone();
        let period = self.shared.settings.poll_interval;
        let handle = spawn_poll_loop(task_id.clone(), period, move || {
            let shared = Arc::clone(&shared);
            let task_id = tick_task_id.clone();
            async move { shared.poll_once(&task_id).await }
        });
        info!(
            task_id = %task_id,
            interval_ms = self.shared.settings.poll_interval.as_millis() as u64,
            "Progress polling started"
        );
        *poller = Some(handle);
    }

    pub async fn stop_polling(&self) {
        if let Some(handle) = self.shared.poller.lock().await.take() {
            handle.cancel();
        }
    }

    /// Drop the current run: polling stops and late responses are discarded.
    pub async fn abandon(&self) -> Result<(), WorkflowError> {
        let mut state = self.shared.state.lock().await;
        let previous = state.to_string();
        *state = state.on(WorkflowEvent::Abandon)?;
        self.stop_polling().await;
        self.shared.tracker.set_status(
            StatusUpdate::new()
                .applying(false)
                .message(messages::ABANDONED),
        );
        info!(previous_state = %previous, "Enrollment abandoned");
        Ok(())
    }

    fn next_attempt(&self) -> u64 {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fail_submission(
        &self,
        state: &mut WorkflowState,
        class: VehicleClass,
        err: BackendError,
    ) -> WorkflowError {
        error!(vehicle_class = %class, error = %err, "Application submission failed");
        match state.on(WorkflowEvent::SubmissionFailed) {
            Ok(next) => *state = next,
            Err(transition) => warn!(error = %transition, "Could not record failed submission"),
        }
        self.shared.tracker.set_status(
            StatusUpdate::new()
                .applying(false)
                .message(messages::SUBMIT_FAILED),
        );
        err.into()
    }
}

impl Shared {
    async fn poll_once(&self, task_id: &TaskId) -> PollControl {
        let result = self.backend.progress(task_id).await;

        let mut state = self.state.lock().await;
        if state.task_id() != Some(task_id) {
            debug!(
                task_id = %task_id,
                state = %*state,
                "Run moved on, dropping progress response"
            );
            return PollControl::Stop;
        }

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(err) if err.is_protocol() => {
                error!(
                    task_id = %task_id,
                    error = %err,
                    "Unreadable progress response, stopping"
                );
                return PollControl::Stop;
            }
            Err(err) => {
                error!(task_id = %task_id, error = %err, "Progress polling failed, stopping");
                return PollControl::Stop;
            }
        };
        if !envelope.success {
            warn!(
                task_id = %task_id,
                message = ?envelope.message(),
                "Progress lookup was not successful, retrying on next tick"
            );
            return PollControl::Continue;
        }
        let Some(report) = envelope.data else {
            error!(task_id = %task_id, "Progress response carried no data, stopping");
            return PollControl::Stop;
        };

        let current = self.tracker.snapshot();
        let reported_state = report.status.as_deref().map(ApplyState::from_wire);
        // Progress never moves backwards within a run
        let progress = report
            .progress
            .unwrap_or(current.progress)
            .min(100)
            .max(current.progress);
        let effective_state = reported_state.unwrap_or(current.status);

        let next = match state.on(WorkflowEvent::ProgressReported {
            progress,
            state: effective_state,
        }) {
            Ok(next) => next,
            Err(err) => {
                warn!(
                    task_id = %task_id,
                    error = %err,
                    "Progress arrived in an unexpected state, stopping"
                );
                return PollControl::Stop;
            }
        };
        let settled = next.is_settled();
        *state = next;

        let mut update = StatusUpdate::new().progress(progress);
        update.message = report.message;
        update.status = reported_state;
        if settled {
            update = update.applying(false);
        }
        self.tracker
            .modify_for_task(task_id, |status| update.apply_to(status));

        debug!(task_id = %task_id, progress, state = %*state, "Progress updated");
        if settled {
            info!(task_id = %task_id, outcome = %*state, "Enrollment run settled");
            PollControl::Stop
        } else {
            PollControl::Continue
        }
    }
}

fn logged<T>(
    operation: &'static str,
    result: BackendResult<T>,
) -> Result<Envelope<T>, BackendError> {
    result.map_err(|err| {
        error!(operation, error = %err, "Backend request failed");
        err
    })
}
