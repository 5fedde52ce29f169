//! Progress animation shown while a batch is processed.
//!
//! The animation is decoupled from the real request: it advances on a fixed
//! tick, speeds up once the outcome is known, and signals completion after a
//! short settle delay at 100%.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::batch::BatchId;
use crate::config::ProgressConfig;
use crate::processing::ProcessingRegistry;

const COMPLETE: f64 = 100.0;

/// How the animation reached 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The processing outcome was known when the bar filled up.
    Settled,
    /// The bar filled up on its own before any outcome arrived.
    Animated,
}

/// Tick-driven progress state machine.
///
/// Holds no clock; callers pass the elapsed time since the animation started.
#[derive(Debug, Clone)]
pub struct ProgressAnimation {
    progress: f64,
    increment: f64,
    fast_response: Duration,
    catch_up_ticks: f64,
    high_water_mark: f64,
    outcome_seen: bool,
    completion: Option<Completion>,
}

impl ProgressAnimation {
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            progress: 0.0,
            increment: config.base_increment(),
            fast_response: config.fast_response(),
            catch_up_ticks: config.catch_up_ticks(),
            high_water_mark: config.high_water_mark,
            outcome_seen: false,
            completion: None,
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_some()
    }

    /// Advances one tick and returns the new progress.
    ///
    /// The first tick that sees `outcome_ready` adjusts the pace: a fast
    /// outcome spreads the remainder over the catch-up window, a slow one
    /// doubles the pace past the high-water mark or jumps to it. The
    /// adjusted pace holds for the rest of the animation.
    pub fn tick(&mut self, elapsed: Duration, outcome_ready: bool) -> f64 {
        if self.is_finished() {
            return self.progress;
        }

        if outcome_ready && !self.outcome_seen {
            self.outcome_seen = true;
            if elapsed < self.fast_response {
                self.increment = (COMPLETE - self.progress) / self.catch_up_ticks;
            } else if self.progress >= self.high_water_mark {
                self.increment *= 2.0;
            } else {
                self.progress = self.high_water_mark;
                return self.progress;
            }
        }

        let next = self.progress + self.increment;
        if next >= COMPLETE {
            self.progress = COMPLETE;
            self.completion = Some(if self.outcome_seen {
                Completion::Settled
            } else {
                Completion::Animated
            });
        } else {
            self.progress = next.max(self.progress);
        }
        self.progress
    }
}

/// Runs a [`ProgressAnimation`] for one batch on a tokio task.
#[derive(Debug, Clone)]
pub struct ProgressPresenter {
    config: ProgressConfig,
}

impl ProgressPresenter {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config }
    }

    /// Starts animating `batch_id`, polling `registry` each tick for a
    /// terminal outcome.
    pub fn start(&self, batch_id: BatchId, registry: Arc<ProcessingRegistry>) -> ProgressHandle {
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let (completion_tx, completion_rx) = watch::channel(None);
        let config = self.config.clone();
        let span = tracing::info_span!("progress", batch_id = %batch_id);

        let task = tokio::spawn(
            async move {
                let mut animation = ProgressAnimation::new(&config);
                let started = Instant::now();
                let mut interval = tokio::time::interval_at(started + config.tick(), config.tick());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                while !animation.is_finished() {
                    interval.tick().await;
                    let ready = registry
                        .outcome(&batch_id)
                        .is_some_and(|outcome| outcome.is_terminal());
                    let value = animation.tick(started.elapsed(), ready);
                    progress_tx.send_replace(value);
                }

                tokio::time::sleep(config.settle_delay()).await;
                debug!("Progress for batch {} complete after {:?}", batch_id, started.elapsed());
                completion_tx.send_replace(animation.completion());
            }
            .instrument(span),
        );

        ProgressHandle {
            progress: progress_rx,
            completion: completion_rx,
            task,
        }
    }
}

/// Handle to a running animation. Dropping it stops the animation.
pub struct ProgressHandle {
    progress: watch::Receiver<f64>,
    completion: watch::Receiver<Option<Completion>>,
    task: JoinHandle<()>,
}

impl ProgressHandle {
    /// Latest progress value in `[0, 100]`.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.completion.borrow().is_some()
    }

    /// Waits for the completion signal. Returns `None` if the animation
    /// stopped without completing.
    pub async fn wait_complete(&mut self) -> Option<Completion> {
        match self.completion.wait_for(|completion| completion.is_some()).await {
            Ok(completion) => *completion,
            Err(_) => None,
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
