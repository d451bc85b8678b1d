//! Async operation scheduler
//!
//! Real hardware takes time to reboot, change channel or flash firmware. The
//! emulator models that by flipping a node (or the whole network) into a
//! transient status right away and scheduling the completion here.
//!
//! # Architecture
//!
//! [`Scheduler`] is a cheap cloneable handle that queues jobs to a single
//! worker task ([`run_scheduler`]). The worker starts one timer per job; when
//! the timer fires, the job's effect runs once under the state lock. Effects
//! only hold a weak reference to the state, so a completion that outlives the
//! coordinator is silently dropped.
//!
//! On shutdown every pending job is abandoned.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::OperationError;
use crate::state::{CoordinatorState, SharedState, WeakState};

/// Deferred mutation of the coordinator state
pub type Effect = Box<dyn FnOnce(&mut CoordinatorState) + Send + 'static>;

/// One queued completion
struct Job {
    label: String,
    delay: Duration,
    effect: Effect,
}

/// Handle used to queue deferred completions
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &!self.tx.is_closed())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler handle and the receiving end for its worker
    pub fn channel() -> (Self, SchedulerWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, SchedulerWorker { rx })
    }

    /// Run `effect` once, after `delay`, under the state lock
    ///
    /// Fails only if the worker has stopped; in that case nothing will run
    /// and the caller must not leave the state waiting on this job.
    pub fn schedule(
        &self,
        label: impl Into<String>,
        delay: Duration,
        effect: impl FnOnce(&mut CoordinatorState) + Send + 'static,
    ) -> Result<(), OperationError> {
        let job = Job {
            label: label.into(),
            delay,
            effect: Box::new(effect),
        };
        self.tx
            .send(job)
            .map_err(|_| OperationError::SchedulerStopped)
    }

    /// True while the worker accepts jobs
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving end of a [`Scheduler`], consumed by [`run_scheduler`]
pub struct SchedulerWorker {
    rx: mpsc::UnboundedReceiver<Job>,
}

/// Run the scheduler worker until shutdown
///
/// Returns when `shutdown` turns true (pending jobs are abandoned) or when
/// every [`Scheduler`] handle is dropped (pending jobs are allowed to finish).
pub async fn run_scheduler(
    worker: SchedulerWorker,
    state: WeakState,
    mut shutdown: watch::Receiver<bool>,
) {
    let SchedulerWorker { mut rx } = worker;
    let mut pending: JoinSet<()> = JoinSet::new();

    debug!("Scheduler worker started");

    loop {
        tokio::select! {
            job = rx.recv() => {
                match job {
                    Some(job) => {
                        debug!("Scheduled {} in {:?}", job.label, job.delay);
                        pending.spawn(fire(job, state.clone()));
                    }
                    None => {
                        debug!("All scheduler handles dropped, draining {} jobs", pending.len());
                        while pending.join_next().await.is_some() {}
                        break;
                    }
                }
            }

            Some(result) = pending.join_next(), if !pending.is_empty() => {
                if let Err(e) = result {
                    warn!("Scheduled job failed: {}", e);
                }
            }

            // The watch guard must not outlive this branch; the drain above awaits
            _ = async { let _ = shutdown.wait_for(|&stop| stop).await; } => {
                if !pending.is_empty() {
                    info!("Abandoning {} scheduled operations", pending.len());
                }
                pending.abort_all();
                break;
            }
        }
    }

    rx.close();
    debug!("Scheduler worker stopped");
}

async fn fire(job: Job, state: WeakState) {
    tokio::time::sleep(job.delay).await;

    match state.upgrade() {
        Some(shared) => {
            (job.effect)(&mut shared.lock());
            debug!("Completed {}", job.label);
        }
        None => debug!("Dropped {}: coordinator is gone", job.label),
    }
}

/// Create a scheduler and spawn its worker on the current runtime
pub fn spawn_scheduler(
    state: &SharedState,
    shutdown: watch::Receiver<bool>,
) -> (Scheduler, tokio::task::JoinHandle<()>) {
    let (scheduler, worker) = Scheduler::channel();
    let handle = tokio::spawn(run_scheduler(worker, state.downgrade(), shutdown));
    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ExtendedPanId, NetworkConfig};

    fn shared() -> SharedState {
        let network = NetworkConfig::new(0x1234, 11, ExtendedPanId([0; 8]), true).unwrap();
        SharedState::new(CoordinatorState::new(network))
    }

    #[tokio::test]
    async fn test_effect_runs_after_delay() {
        let state = shared();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (scheduler, _worker) = spawn_scheduler(&state, stop_rx);

        scheduler
            .schedule("permit", Duration::from_millis(50), |s| {
                s.network.set_permit_joining(false)
            })
            .unwrap();

        assert!(state.lock().network.permit_joining());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!state.lock().network.permit_joining());
    }

    #[test]
    fn test_worker_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let state = shared();
        let (_scheduler, worker) = Scheduler::channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let future = run_scheduler(worker, state.downgrade(), stop_rx);
        assert_send(&future);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending() {
        let state = shared();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (scheduler, worker) = spawn_scheduler(&state, stop_rx);

        scheduler
            .schedule("late", Duration::from_millis(200), |s| {
                s.network.set_permit_joining(false)
            })
            .unwrap();

        stop_tx.send(true).unwrap();
        worker.await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(state.lock().network.permit_joining());
        assert!(!scheduler.is_running());
        assert_eq!(
            scheduler.schedule("after", Duration::ZERO, |_| {}),
            Err(OperationError::SchedulerStopped)
        );
    }

    #[tokio::test]
    async fn test_effect_after_teardown_is_noop() {
        let state = shared();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (scheduler, worker) = spawn_scheduler(&state, stop_rx);

        scheduler
            .schedule("orphan", Duration::from_millis(20), |s| s.registry.clear())
            .unwrap();
        drop(state);
        drop(scheduler);

        // Worker drains the job, finds no state and exits cleanly
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
