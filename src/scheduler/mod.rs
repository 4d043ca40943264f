//! Periodic refresh scheduling.

mod activation;

pub use activation::*;

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as RunLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// One unit of periodic work: an async fetch followed by a synchronous apply.
#[async_trait]
pub trait RefreshTask: Send + Sync + 'static {
    type Output: Send;
    type Error: fmt::Display + Send;

    async fn run(&self) -> Result<Self::Output, Self::Error>;

    /// Publish a finished run. Called with the scheduler lock held, so it
    /// must not call back into the scheduler.
    fn apply(&self, output: Self::Output);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Running,
    Cancelled,
}

struct Inner {
    state: SchedulerState,
    generation: u64,
    stop_tx: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Runs a [`RefreshTask`] every interval, never overlapping with itself.
///
/// Every run, scheduled or manual and across restarts, holds the run lock
/// from `run` through `apply`, so results are applied in the order runs start.
pub struct RefreshScheduler<T: RefreshTask> {
    task: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    run_lock: Arc<RunLock<()>>,
}

impl<T: RefreshTask> RefreshScheduler<T> {
    pub fn new(task: Arc<T>) -> Self {
        Self {
            task,
            inner: Arc::new(Mutex::new(Inner {
                state: SchedulerState::Idle,
                generation: 0,
                stop_tx: None,
                handles: Vec::new(),
            })),
            run_lock: Arc::new(RunLock::new(())),
        }
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.inner).state
    }

    /// Begin refreshing every `interval`. The first run happens one interval
    /// from now. A no-op while already scheduled or running.
    pub fn start(&self, interval: Duration) {
        let mut inner = lock(&self.inner);
        match inner.state {
            SchedulerState::Scheduled | SchedulerState::Running => {
                tracing::info!("Scheduler: already running, ignoring start");
                return;
            }
            SchedulerState::Idle | SchedulerState::Cancelled => {}
        }

        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };

        inner.generation += 1;
        inner.state = SchedulerState::Scheduled;
        inner.handles.retain(|h| !h.is_finished());

        let (stop_tx, stop_rx) = broadcast::channel(1);
        inner.stop_tx = Some(stop_tx);

        tracing::info!(interval_secs = interval.as_secs_f64(), "Scheduler: started");

        let handle = tokio::spawn(run_refresh_loop(
            self.task.clone(),
            self.inner.clone(),
            self.run_lock.clone(),
            inner.generation,
            interval,
            stop_rx,
        ));
        inner.handles.push(handle);
    }

    /// Cancel the schedule. Once this returns no refresh starts and no
    /// in-flight result is applied.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == SchedulerState::Running {
            tracing::info!("Scheduler: stopping, discarding in-flight refresh");
        }
        inner.state = SchedulerState::Cancelled;
        if let Some(stop_tx) = inner.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    /// Run the task once now and apply its result, waiting for any run in
    /// flight first. Independent of the schedule state.
    pub async fn refresh_now(&self) -> Result<(), T::Error> {
        let _run = self.run_lock.lock().await;
        let output = self.task.run().await?;
        let _inner = lock(&self.inner);
        self.task.apply(output);
        Ok(())
    }

    /// Stop and wait for every spawned loop to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handles: Vec<JoinHandle<()>> = lock(&self.inner).handles.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler: refresh loop panicked: {}", e);
            }
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_current(inner: &Inner, generation: u64) -> bool {
    inner.generation == generation && inner.state != SchedulerState::Cancelled
}

async fn run_refresh_loop<T: RefreshTask>(
    task: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    run_lock: Arc<RunLock<()>>,
    generation: u64,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                let _run = run_lock.lock().await;
                {
                    let mut guard = lock(&inner);
                    if !is_current(&guard, generation) {
                        break;
                    }
                    guard.state = SchedulerState::Running;
                }

                let result = task.run().await;

                let mut guard = lock(&inner);
                if !is_current(&guard, generation) {
                    tracing::debug!("Scheduler: discarding refresh finished after stop");
                    break;
                }
                match result {
                    Ok(output) => task.apply(output),
                    Err(e) => tracing::warn!("Scheduler: refresh failed, keeping previous state: {}", e),
                }
                guard.state = SchedulerState::Scheduled;
            }
        }
    }

    tracing::debug!(generation, "Scheduler: refresh loop exited");
}
