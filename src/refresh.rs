// Periodic re-sampling until an external cancellation signal.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Sampling,
    Rendering,
    Waiting,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub cycles: u64,
    pub failed_cycles: u64,
}

pub struct RefreshLoop {
    interval: Duration,
    stop_on_error: bool,
}

impl RefreshLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop_on_error: false,
        }
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Sample, render, wait; repeat until `cancel` fires.
    ///
    /// The first cycle runs immediately. `cancel` is only observed while waiting: a signal
    /// raised during a cycle stays latched in the channel and ends the loop at the next wait
    /// without sleeping. A dropped sender means no cancellation will ever arrive.
    ///
    /// A failed `sample` is a failed cycle and only ends the loop with `stop_on_error`. A failed
    /// `render` always ends it: the sink is gone (closed pipe, full disk) and later cycles would
    /// have nowhere to go.
    pub async fn run<T, S, Fut, R>(
        &self,
        mut sample: S,
        mut render: R,
        mut cancel: oneshot::Receiver<()>,
    ) -> anyhow::Result<LoopReport>
    where
        S: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        R: FnMut(&T) -> anyhow::Result<()>,
    {
        let mut report = LoopReport::default();
        let mut state = LoopState::Idle;
        let mut batch: Option<T> = None;
        let mut cancel_open = true;

        loop {
            tracing::trace!(?state, cycles = report.cycles, "refresh loop");
            state = match state {
                LoopState::Idle => LoopState::Sampling,
                LoopState::Sampling => {
                    report.cycles += 1;
                    match sample().await {
                        Ok(b) => {
                            batch = Some(b);
                            LoopState::Rendering
                        }
                        Err(e) => {
                            report.failed_cycles += 1;
                            if self.stop_on_error {
                                return Err(e.context(format!("cycle {} failed", report.cycles)));
                            }
                            tracing::error!(cycle = report.cycles, error = %format!("{e:#}"), "cycle failed");
                            LoopState::Waiting
                        }
                    }
                }
                LoopState::Rendering => {
                    if let Some(b) = batch.take() {
                        render(&b).map_err(|e| {
                            e.context(format!("rendering cycle {} failed", report.cycles))
                        })?;
                    }
                    LoopState::Waiting
                }
                LoopState::Waiting => {
                    tokio::select! {
                        biased;
                        signal = &mut cancel, if cancel_open => match signal {
                            Ok(()) => LoopState::Cancelled,
                            Err(_) => {
                                cancel_open = false;
                                LoopState::Waiting
                            }
                        },
                        _ = tokio::time::sleep(self.interval) => LoopState::Sampling,
                    }
                }
                LoopState::Cancelled => {
                    tracing::debug!(
                        cycles = report.cycles,
                        failed = report.failed_cycles,
                        "refresh loop cancelled"
                    );
                    return Ok(report);
                }
            };
        }
    }
}
