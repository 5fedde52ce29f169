//! Process-wide store of processing state, keyed by batch id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::ProcessingOutcome;
use crate::batch::BatchId;

/// Failure recorded for an attempt that ended without an outcome.
pub(crate) const INTERRUPTED: &str = "Processing was interrupted before it completed";

type SettledSender = watch::Sender<Option<ProcessingOutcome>>;
type SettledReceiver = watch::Receiver<Option<ProcessingOutcome>>;

enum Entry {
    InFlight { attempt: u64, settled: SettledSender },
    Settled(ProcessingOutcome),
}

/// Result of trying to start an attempt for a batch.
pub enum Claim {
    /// The batch already has a terminal outcome.
    Settled(ProcessingOutcome),
    /// Another attempt is running; observe it instead of starting one.
    InFlight,
    /// The caller owns the new attempt and must settle it.
    Acquired {
        ticket: AttemptTicket,
        settled: SettledReceiver,
    },
}

/// Registry of batch processing state.
///
/// Uses a `std::sync::Mutex` that is never held across an await, so
/// claiming an attempt and recording its outcome are each a single atomic
/// step for a given batch id. Entries are only removed by [`reset`].
///
/// [`reset`]: ProcessingRegistry::reset
pub struct ProcessingRegistry {
    entries: Mutex<HashMap<BatchId, Entry>>,
    next_attempt: AtomicU64,
}

impl ProcessingRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<BatchId, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Processing registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Returns the cached outcome, reports an attempt in flight, or marks
    /// the batch in flight and hands the new attempt to the caller.
    pub fn claim(self: &Arc<Self>, batch_id: &BatchId) -> Claim {
        let mut entries = self.entries();
        match entries.get(batch_id) {
            Some(Entry::Settled(outcome)) => Claim::Settled(outcome.clone()),
            Some(Entry::InFlight { .. }) => Claim::InFlight,
            None => {
                let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = watch::channel(None);
                entries.insert(
                    batch_id.clone(),
                    Entry::InFlight {
                        attempt,
                        settled: sender,
                    },
                );
                Claim::Acquired {
                    ticket: AttemptTicket {
                        registry: Arc::clone(self),
                        batch_id: batch_id.clone(),
                        attempt,
                        settled: false,
                    },
                    settled: receiver,
                }
            }
        }
    }

    /// Records the terminal outcome of `attempt` and releases its in-flight
    /// marker. Returns false when the batch was reset after the attempt
    /// started; the outcome is then discarded.
    fn settle_attempt(&self, batch_id: &BatchId, attempt: u64, outcome: ProcessingOutcome) -> bool {
        let mut entries = self.entries();
        let current = match entries.get(batch_id) {
            Some(Entry::InFlight {
                attempt: current, ..
            }) => *current,
            _ => {
                log::debug!(
                    "Discarding outcome of attempt {} for batch {}: batch was reset",
                    attempt,
                    batch_id
                );
                return false;
            }
        };
        if current != attempt {
            log::debug!(
                "Discarding outcome of attempt {} for batch {}: attempt {} is current",
                attempt,
                batch_id,
                current
            );
            return false;
        }

        if let Some(Entry::InFlight { settled, .. }) =
            entries.insert(batch_id.clone(), Entry::Settled(outcome.clone()))
        {
            settled.send_replace(Some(outcome));
        }
        true
    }

    /// Snapshot of a batch: `None` if never attempted (or reset),
    /// `Pending` while in flight.
    pub fn outcome(&self, batch_id: &BatchId) -> Option<ProcessingOutcome> {
        match self.entries().get(batch_id) {
            Some(Entry::Settled(outcome)) => Some(outcome.clone()),
            Some(Entry::InFlight { .. }) => Some(ProcessingOutcome::Pending),
            None => None,
        }
    }

    pub fn is_in_flight(&self, batch_id: &BatchId) -> bool {
        matches!(self.entries().get(batch_id), Some(Entry::InFlight { .. }))
    }

    /// Waits until the batch settles. Returns `None` if the batch is absent
    /// or is reset before it settles.
    pub async fn wait_for_outcome(&self, batch_id: &BatchId) -> Option<ProcessingOutcome> {
        let receiver = match self.entries().get(batch_id) {
            Some(Entry::Settled(outcome)) => return Some(outcome.clone()),
            Some(Entry::InFlight { settled, .. }) => settled.subscribe(),
            None => return None,
        };
        wait_settled(receiver).await
    }

    /// Removes every trace of a batch. Returns true if anything was removed.
    ///
    /// Observers waiting on an in-flight attempt are released with `None`.
    pub fn reset(&self, batch_id: &BatchId) -> bool {
        self.entries().remove(batch_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits on a settlement channel until it carries an outcome.
pub(crate) async fn wait_settled(mut receiver: SettledReceiver) -> Option<ProcessingOutcome> {
    match receiver.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    }
}

/// Ownership of one in-flight attempt.
///
/// Dropping a ticket without settling it (for example when the task running
/// the attempt panics) records a failure, so a batch can never stay in
/// flight because its attempt went away.
pub struct AttemptTicket {
    registry: Arc<ProcessingRegistry>,
    batch_id: BatchId,
    attempt: u64,
    settled: bool,
}

impl AttemptTicket {
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Records the outcome. Returns false if the batch was reset meanwhile.
    pub fn settle(mut self, outcome: ProcessingOutcome) -> bool {
        self.settled = true;
        self.registry
            .settle_attempt(&self.batch_id, self.attempt, outcome)
    }
}

impl Drop for AttemptTicket {
    fn drop(&mut self) {
        if !self.settled {
            log::error!(
                "Processing attempt {} for batch {} ended without an outcome",
                self.attempt,
                self.batch_id
            );
            self.registry.settle_attempt(
                &self.batch_id,
                self.attempt,
                ProcessingOutcome::Failure(INTERRUPTED.to_string()),
            );
        }
    }
}
