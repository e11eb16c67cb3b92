use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::observability::backend_metrics;
use crate::workflow::EnrollmentWorkflow;

/// Broadcasts a single "stop" signal to whoever is watching the run
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger on Ctrl-C. The returned task ends after the first signal.
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, shutting down");
                    coordinator.trigger();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        })
    }

    /// Resolves once the stop signal is raised
    pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
        // A dropped coordinator never fires
        if rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Abandon the current enrollment run and flush final metrics.
    pub async fn shutdown_workflow(
        workflow: &EnrollmentWorkflow,
        metrics_enabled: bool,
    ) -> Result<()> {
        info!("Abandoning enrollment run");

        timeout(Duration::from_secs(5), workflow.abandon())
            .await
            .map_err(|_| anyhow::anyhow!("Timeout waiting for the workflow to stop"))??;

        if metrics_enabled {
            backend_metrics().log_stats();
        }
        info!("Shutdown completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mocks::ScriptedBackend;
    use crate::backend::{ApplyReceipt, Envelope};
    use crate::workflow::{WorkflowSettings, WorkflowState};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.is_triggered());

        coordinator.trigger();
        ShutdownCoordinator::wait_for_shutdown(&mut rx).await;
        assert!(coordinator.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_polling_run() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_apply(Ok(Envelope::ok(ApplyReceipt {
            apply_id: Some("T1".to_string()),
            ..Default::default()
        })));
        let workflow = EnrollmentWorkflow::new(backend.clone(), WorkflowSettings::default());
        workflow.submit_passenger().await.unwrap();
        assert!(workflow.is_polling().await);

        ShutdownCoordinator::shutdown_workflow(&workflow, false).await.unwrap();

        assert_eq!(workflow.state().await, WorkflowState::Idle);
        assert!(!workflow.is_polling().await);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.progress_calls(), 0);
    }
}
