//! Application status tracker
//!
//! A single [`ApplyStatus`] record behind a `watch` channel. Writers merge
//! partial [`StatusUpdate`]s; readers take snapshots or subscribe for changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::TaskId;
use crate::forms::VehicleClass;

/// Backend-reported state of the enrollment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyState {
    #[default]
    Unset,
    InProgress,
    Completed,
    Failed,
}

impl ApplyState {
    /// `completed` and `failed` are terminal; any other non-empty status
    /// string (`processing`, `in-progress`, ...) means the run is still going.
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "" => ApplyState::Unset,
            "completed" => ApplyState::Completed,
            "failed" => ApplyState::Failed,
            _ => ApplyState::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ApplyState::Completed | ApplyState::Failed)
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApplyState::Unset => "unset",
            ApplyState::InProgress => "in-progress",
            ApplyState::Completed => "completed",
            ApplyState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStatus {
    pub is_applying: bool,
    pub progress: u8,
    pub message: String,
    pub task_id: Option<TaskId>,
    pub order_id: Option<String>,
    pub sign_order_id: Option<String>,
    pub verify_code_no: Option<String>,
    pub status: ApplyState,
    pub vehicle_class: Option<VehicleClass>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ApplyStatus {
    /// Fresh record for a new submission; everything from the previous run is dropped.
    pub fn submitting(class: VehicleClass, message: &str) -> Self {
        Self {
            is_applying: true,
            progress: 0,
            message: message.to_string(),
            vehicle_class: Some(class),
            updated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.progress >= 100 || self.status.is_terminal()
    }
}

/// Partial status; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub is_applying: Option<bool>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub task_id: Option<TaskId>,
    pub order_id: Option<String>,
    pub sign_order_id: Option<String>,
    pub verify_code_no: Option<String>,
    pub status: Option<ApplyState>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applying(mut self, is_applying: bool) -> Self {
        self.is_applying = Some(is_applying);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn task_id(mut self, task_id: Option<TaskId>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn status(mut self, status: ApplyState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn apply_to(self, target: &mut ApplyStatus) {
        if let Some(is_applying) = self.is_applying {
            target.is_applying = is_applying;
        }
        if let Some(progress) = self.progress {
            target.progress = progress;
        }
        if let Some(message) = self.message {
            target.message = message;
        }
        if let Some(task_id) = self.task_id {
            target.task_id = Some(task_id);
        }
        if let Some(order_id) = self.order_id {
            target.order_id = Some(order_id);
        }
        if let Some(sign_order_id) = self.sign_order_id {
            target.sign_order_id = Some(sign_order_id);
        }
        if let Some(verify_code_no) = self.verify_code_no {
            target.verify_code_no = Some(verify_code_no);
        }
        if let Some(status) = self.status {
            target.status = status;
        }
        target.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone)]
pub struct StatusTracker {
    tx: Arc<watch::Sender<ApplyStatus>>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ApplyStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> ApplyStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ApplyStatus> {
        self.tx.subscribe()
    }

    /// Merge-style setter: untouched fields keep their values.
    pub fn set_status(&self, update: StatusUpdate) -> ApplyStatus {
        self.tx.send_modify(|status| update.apply_to(status));
        self.snapshot()
    }

    pub fn replace(&self, status: ApplyStatus) {
        self.tx.send_replace(status);
    }

    /// Run `f` only while the record still belongs to `task_id`.
    /// Returns the new status, or `None` when the record has moved on.
    pub fn modify_for_task<F>(&self, task_id: &TaskId, f: F) -> Option<ApplyStatus>
    where
        F: FnOnce(&mut ApplyStatus),
    {
        let applied = self.tx.send_if_modified(|status| {
            if status.task_id.as_ref() == Some(task_id) {
                f(status);
                true
            } else {
                false
            }
        });
        applied.then(|| self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_status_mapping() {
        assert_eq!(ApplyState::from_wire("completed"), ApplyState::Completed);
        assert_eq!(ApplyState::from_wire("FAILED"), ApplyState::Failed);
        assert_eq!(ApplyState::from_wire("processing"), ApplyState::InProgress);
        assert_eq!(ApplyState::from_wire("in-progress"), ApplyState::InProgress);
        assert_eq!(ApplyState::from_wire(""), ApplyState::Unset);
    }

    #[test]
    fn test_set_status_merges() {
        let tracker = StatusTracker::new();
        tracker.set_status(StatusUpdate::new().applying(true).progress(10).message("a"));
        let status = tracker.set_status(StatusUpdate::new().message("b"));

        assert!(status.is_applying);
        assert_eq!(status.progress, 10);
        assert_eq!(status.message, "b");
        assert!(status.updated_at.is_some());
    }

    #[test]
    fn test_no_range_validation_in_tracker() {
        let tracker = StatusTracker::new();
        tracker.set_status(StatusUpdate::new().progress(80));
        let status = tracker.set_status(StatusUpdate::new().progress(20));
        assert_eq!(status.progress, 20);
    }

    #[test]
    fn test_submitting_drops_previous_run() {
        let tracker = StatusTracker::new();
        tracker.set_status(StatusUpdate::new().task_id(Some(TaskId::from("old"))).progress(70));
        tracker.replace(ApplyStatus::submitting(VehicleClass::Truck, "正在提交申办..."));

        let status = tracker.snapshot();
        assert_eq!(status.task_id, None);
        assert_eq!(status.progress, 0);
        assert!(status.is_applying);
        assert_eq!(status.vehicle_class, Some(VehicleClass::Truck));
    }

    #[test]
    fn test_modify_for_task_ignores_other_tasks() {
        let tracker = StatusTracker::new();
        tracker.set_status(StatusUpdate::new().task_id(Some(TaskId::from("T2"))));

        let stale = tracker.modify_for_task(&TaskId::from("T1"), |s| s.progress = 99);
        assert!(stale.is_none());
        assert_eq!(tracker.snapshot().progress, 0);

        let fresh = tracker.modify_for_task(&TaskId::from("T2"), |s| s.progress = 40);
        assert_eq!(fresh.map(|s| s.progress), Some(40));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let tracker = StatusTracker::new();
        let mut rx = tracker.subscribe();

        tracker.set_status(StatusUpdate::new().message("正在提交申办..."));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().message, "正在提交申办...");
    }

    #[test]
    fn test_terminal_detection() {
        let mut status = ApplyStatus::default();
        assert!(!status.is_terminal());
        status.progress = 100;
        assert!(status.is_terminal());
        status.progress = 30;
        status.status = ApplyState::Failed;
        assert!(status.is_terminal());
    }
}
