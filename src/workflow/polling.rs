use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::backend::TaskId;

/// Decision returned by one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Cancellation token scoped to one poll loop. Dropping the owning
/// [`PollHandle`] cancels it as well.
#[derive(Debug, Clone)]
pub struct PollToken {
    rx: watch::Receiver<bool>,
}

impl PollToken {
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owner side of a running poll loop
#[derive(Debug)]
pub struct PollHandle {
    task_id: TaskId,
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
        debug!(task_id = %self.task_id, "Progress polling cancelled");
    }

    pub fn is_active(&self) -> bool {
        !self.join.is_finished() && !*self.cancel.borrow()
    }
}

/// Run `tick` every `period`, first after one full period.
///
/// A tick is awaited before the next one is scheduled, so slow responses
/// delay the schedule instead of stacking requests.
pub fn spawn_poll_loop<F, Fut>(task_id: TaskId, period: Duration, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = PollControl> + Send + 'static,
{
    let (cancel, rx) = watch::channel(false);
    let mut token = PollToken { rx };
    let loop_task_id = task_id.clone();

    let join = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let control = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                control = tick() => control,
            };

            if control == PollControl::Stop {
                break;
            }
        }
        debug!(task_id = %loop_task_id, "Progress polling loop exited");
    });

    PollHandle {
        task_id,
        cancel,
        join,
    }
}
