//! Issues at most one processing request per batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Instrument;

use super::registry::{wait_settled, AttemptTicket, Claim, ProcessingRegistry, INTERRUPTED};
use super::ProcessingOutcome;
use crate::api::ProcessingEndpoint;
use crate::batch::BatchId;
use crate::notify::{Notice, NotificationSink};

/// What a call to [`ProcessingCoordinator::process`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessAttempt {
    /// The batch had already settled; no request was made.
    Cached(ProcessingOutcome),
    /// This call issued the request and observed its outcome.
    Completed(ProcessingOutcome),
    /// Another caller's request is running; no request was made.
    AlreadyInFlight,
    /// This call issued the request but the batch was reset before it settled.
    Reset,
}

impl ProcessAttempt {
    pub fn outcome(&self) -> Option<&ProcessingOutcome> {
        match self {
            ProcessAttempt::Cached(outcome) | ProcessAttempt::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn into_outcome(self) -> Option<ProcessingOutcome> {
        match self {
            ProcessAttempt::Cached(outcome) | ProcessAttempt::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Lifecycle stage reported by a [`ProcessingEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Started,
    Succeeded,
    Failed,
    Reset,
}

/// Change in a batch's processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingEvent {
    pub batch_id: String,
    pub status: ProcessingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingEvent {
    fn new(batch_id: &BatchId, status: ProcessingStatus) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            status,
            timestamp: Utc::now(),
            carbon_percentage: None,
            error: None,
        }
    }

    pub fn started(batch_id: &BatchId) -> Self {
        Self::new(batch_id, ProcessingStatus::Started)
    }

    pub fn reset(batch_id: &BatchId) -> Self {
        Self::new(batch_id, ProcessingStatus::Reset)
    }

    pub fn settled(batch_id: &BatchId, outcome: &ProcessingOutcome) -> Self {
        match outcome {
            ProcessingOutcome::Success(result) => Self {
                carbon_percentage: Some(result.carbon_percentage),
                ..Self::new(batch_id, ProcessingStatus::Succeeded)
            },
            ProcessingOutcome::Failure(message) => Self {
                error: Some(message.clone()),
                ..Self::new(batch_id, ProcessingStatus::Failed)
            },
            ProcessingOutcome::Pending => Self::started(batch_id),
        }
    }
}

/// Deduplicates processing requests per batch and caches their outcomes.
///
/// The request for an attempt runs in its own task. Dropping the future
/// returned by [`process`](Self::process) does not cancel it; the outcome is
/// still recorded in the registry.
#[derive(Clone)]
pub struct ProcessingCoordinator {
    registry: Arc<ProcessingRegistry>,
    endpoint: Arc<dyn ProcessingEndpoint>,
    notifier: Arc<dyn NotificationSink>,
    events: Arc<broadcast::Sender<ProcessingEvent>>,
    timeout: Option<Duration>,
}

impl ProcessingCoordinator {
    pub fn new(
        registry: Arc<ProcessingRegistry>,
        endpoint: Arc<dyn ProcessingEndpoint>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            endpoint,
            notifier,
            events: Arc::new(events),
            timeout: None,
        }
    }

    /// Bounds each request. `None` waits for the endpoint indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ProcessingRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.events.subscribe()
    }

    /// Processes a batch unless it has settled or is already in flight.
    ///
    /// Only the caller that issues the request waits for it, and only that
    /// caller raises a "Processing failed" notice on failure.
    pub async fn process(&self, batch_id: &BatchId) -> ProcessAttempt {
        let (ticket, settled) = match self.registry.claim(batch_id) {
            Claim::Settled(outcome) => {
                debug!("Batch {} already processed, using cached outcome", batch_id);
                return ProcessAttempt::Cached(outcome);
            }
            Claim::InFlight => {
                debug!("Batch {} is already being processed", batch_id);
                return ProcessAttempt::AlreadyInFlight;
            }
            Claim::Acquired { ticket, settled } => (ticket, settled),
        };

        info!("Processing batch {} (attempt {})", batch_id, ticket.attempt());
        self.emit(ProcessingEvent::started(batch_id));
        self.spawn_attempt(ticket);

        match wait_settled(settled).await {
            Some(outcome) => {
                if let ProcessingOutcome::Failure(message) = &outcome {
                    self.notifier.notify(Notice::processing_failed(message));
                }
                ProcessAttempt::Completed(outcome)
            }
            None => {
                info!("Batch {} was reset before processing finished", batch_id);
                ProcessAttempt::Reset
            }
        }
    }

    /// Like [`process`](Self::process), but an in-flight attempt is joined
    /// instead of reported. Returns `None` if the batch is reset first.
    pub async fn process_or_join(&self, batch_id: &BatchId) -> Option<ProcessingOutcome> {
        match self.process(batch_id).await {
            ProcessAttempt::Cached(outcome) | ProcessAttempt::Completed(outcome) => Some(outcome),
            ProcessAttempt::AlreadyInFlight => self.registry.wait_for_outcome(batch_id).await,
            ProcessAttempt::Reset => None,
        }
    }

    /// Current state of a batch; `None` if it was never processed.
    pub fn outcome(&self, batch_id: &BatchId) -> Option<ProcessingOutcome> {
        self.registry.outcome(batch_id)
    }

    pub fn is_processing(&self, batch_id: &BatchId) -> bool {
        self.registry.is_in_flight(batch_id)
    }

    pub async fn wait_for_outcome(&self, batch_id: &BatchId) -> Option<ProcessingOutcome> {
        self.registry.wait_for_outcome(batch_id).await
    }

    /// Forgets a batch so the next [`process`](Self::process) issues a new
    /// request. An attempt still running for it is left to finish, and its
    /// outcome is discarded.
    pub fn reset(&self, batch_id: &BatchId) -> bool {
        let removed = self.registry.reset(batch_id);
        if removed {
            info!("Reset processing state for batch {}", batch_id);
            self.emit(ProcessingEvent::reset(batch_id));
        }
        removed
    }

    fn emit(&self, event: ProcessingEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.events.send(event);
    }

    fn spawn_attempt(&self, ticket: AttemptTicket) {
        let endpoint = Arc::clone(&self.endpoint);
        let events = Arc::clone(&self.events);
        let timeout = self.timeout;
        let span = tracing::info_span!(
            "processing.attempt",
            batch_id = %ticket.batch_id(),
            attempt = ticket.attempt()
        );

        tokio::spawn(
            async move {
                let batch_id = ticket.batch_id().clone();
                let request_batch = batch_id.clone();
                let request = tokio::spawn(
                    async move { request_outcome(endpoint.as_ref(), &request_batch, timeout).await }
                        .in_current_span(),
                );
                let outcome = match request.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Processing request for batch {} panicked: {}", batch_id, e);
                        ProcessingOutcome::Failure(INTERRUPTED.to_string())
                    }
                };
                match &outcome {
                    ProcessingOutcome::Success(result) => info!(
                        "Batch {} processed: {:.2}% carbon",
                        batch_id, result.carbon_percentage
                    ),
                    ProcessingOutcome::Failure(message) => {
                        warn!("Processing batch {} failed: {}", batch_id, message)
                    }
                    ProcessingOutcome::Pending => {}
                }
                if ticket.settle(outcome.clone()) {
                    let _ = events.send(ProcessingEvent::settled(&batch_id, &outcome));
                }
            }
            .instrument(span),
        );
    }
}

async fn request_outcome(
    endpoint: &dyn ProcessingEndpoint,
    batch_id: &BatchId,
    timeout: Option<Duration>,
) -> ProcessingOutcome {
    let request = endpoint.process(batch_id);
    let response = match timeout {
        Some(limit) => match tokio::time::timeout(limit, request).await {
            Ok(response) => response,
            Err(_) => {
                return ProcessingOutcome::Failure(format!(
                    "Processing timed out after {:?}",
                    limit
                ))
            }
        },
        None => request.await,
    };

    match response {
        Ok(result) => ProcessingOutcome::Success(result),
        Err(e) => ProcessingOutcome::Failure(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::notify::BroadcastNotifier;
    use crate::processing::ProcessingResult;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with the 1-based call number as the carbon percentage.
    struct CountingEndpoint {
        calls: AtomicUsize,
        delay: Duration,
        fail_with: Option<ClientError>,
        panic: bool,
    }

    impl CountingEndpoint {
        fn new(delay_ms: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
                fail_with: None,
                panic: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessingEndpoint for CountingEndpoint {
        async fn process(&self, _batch_id: &BatchId) -> Result<ProcessingResult, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.panic {
                panic!("endpoint exploded");
            }
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(ProcessingResult::new(call as f64)),
            }
        }
    }

    fn coordinator(endpoint: Arc<CountingEndpoint>, notifier: BroadcastNotifier) -> ProcessingCoordinator {
        ProcessingCoordinator::new(Arc::new(ProcessingRegistry::new()), endpoint, Arc::new(notifier))
    }

    fn carbon(outcome: &ProcessingOutcome) -> f64 {
        outcome.result().map(|r| r.carbon_percentage).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_issue_one_request() {
        let endpoint = Arc::new(CountingEndpoint::new(200));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let attempts = join_all((0..8).map(|_| coordinator.process(&batch))).await;

        assert_eq!(endpoint.calls(), 1);
        let completed = attempts
            .iter()
            .filter(|a| matches!(a, ProcessAttempt::Completed(_)))
            .count();
        let in_flight = attempts
            .iter()
            .filter(|a| matches!(a, ProcessAttempt::AlreadyInFlight))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(in_flight, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_caller_during_flight() {
        let endpoint = Arc::new(CountingEndpoint::new(200));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let first = {
            let coordinator = coordinator.clone();
            let batch = batch.clone();
            tokio::spawn(async move { coordinator.process(&batch).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(coordinator.process(&batch).await, ProcessAttempt::AlreadyInFlight);
        assert_eq!(coordinator.outcome(&batch), Some(ProcessingOutcome::Pending));

        let first = first.await.unwrap();
        assert_eq!(carbon(first.outcome().unwrap()), 1.0);
        assert_eq!(endpoint.calls(), 1);
        assert!(!coordinator.is_processing(&batch));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_batch_is_served_from_cache() {
        let endpoint = Arc::new(CountingEndpoint::new(10));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let first = coordinator.process(&batch).await;
        let second = coordinator.process(&batch).await;

        assert!(matches!(first, ProcessAttempt::Completed(_)));
        assert_eq!(second, ProcessAttempt::Cached(first.into_outcome().unwrap()));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_cached_and_notified_once() {
        let endpoint = Arc::new(CountingEndpoint {
            fail_with: Some(ClientError::Remote {
                status: 500,
                message: "model unavailable".to_string(),
            }),
            ..CountingEndpoint::new(10)
        });
        let notifier = BroadcastNotifier::default();
        let mut notices = notifier.subscribe();
        let coordinator = coordinator(endpoint.clone(), notifier);
        let batch = BatchId::from("b2");

        let attempt = coordinator.process(&batch).await;
        assert_eq!(
            attempt,
            ProcessAttempt::Completed(ProcessingOutcome::Failure("model unavailable".to_string()))
        );
        assert_eq!(
            coordinator.process(&batch).await,
            ProcessAttempt::Cached(ProcessingOutcome::Failure("model unavailable".to_string()))
        );
        assert_eq!(endpoint.calls(), 1);

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.title, "Processing failed");
        assert_eq!(notice.description, "model unavailable");
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_then_process_issues_new_request() {
        let endpoint = Arc::new(CountingEndpoint::new(10));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        coordinator.process(&batch).await;
        assert!(coordinator.reset(&batch));
        assert_eq!(coordinator.outcome(&batch), None);

        let attempt = coordinator.process(&batch).await;
        assert_eq!(carbon(attempt.outcome().unwrap()), 2.0);
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_flight_discards_late_outcome() {
        let endpoint = Arc::new(CountingEndpoint::new(200));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let first = {
            let coordinator = coordinator.clone();
            let batch = batch.clone();
            tokio::spawn(async move { coordinator.process(&batch).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.reset(&batch);
        assert_eq!(first.await.unwrap(), ProcessAttempt::Reset);

        let second = {
            let coordinator = coordinator.clone();
            let batch = batch.clone();
            tokio::spawn(async move { coordinator.process(&batch).await })
        };

        // The first attempt finishes at 200ms and must not overwrite the second.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(coordinator.outcome(&batch), Some(ProcessingOutcome::Pending));

        let second = second.await.unwrap();
        assert_eq!(carbon(second.outcome().unwrap()), 2.0);
        assert_eq!(carbon(&coordinator.outcome(&batch).unwrap()), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_still_records_outcome() {
        let endpoint = Arc::new(CountingEndpoint::new(200));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let caller = {
            let coordinator = coordinator.clone();
            let batch = batch.clone();
            tokio::spawn(async move { coordinator.process(&batch).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(carbon(&coordinator.outcome(&batch).unwrap()), 1.0);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_endpoint_records_failure() {
        let endpoint = Arc::new(CountingEndpoint {
            panic: true,
            ..CountingEndpoint::new(10)
        });
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let attempt = coordinator.process(&batch).await;

        let outcome = attempt.into_outcome().unwrap();
        assert!(outcome.error().unwrap().contains("interrupted"));
        assert!(!coordinator.is_processing(&batch));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_endpoint_emits_failed_event() {
        let endpoint = Arc::new(CountingEndpoint {
            panic: true,
            ..CountingEndpoint::new(10)
        });
        let coordinator = coordinator(endpoint, BroadcastNotifier::default());
        let mut events = coordinator.subscribe();
        let batch = BatchId::from("b1");

        coordinator.process(&batch).await;

        let started = events.try_recv().unwrap();
        assert_eq!(started.status, ProcessingStatus::Started);
        let failed = events.try_recv().unwrap();
        assert_eq!(failed.status, ProcessingStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some(INTERRUPTED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_failure() {
        let endpoint = Arc::new(CountingEndpoint::new(10_000));
        let coordinator = coordinator(endpoint, BroadcastNotifier::default())
            .with_timeout(Some(Duration::from_secs(5)));
        let batch = BatchId::from("b1");

        let outcome = coordinator.process(&batch).await.into_outcome().unwrap();
        assert_eq!(
            outcome,
            ProcessingOutcome::Failure("Processing timed out after 5s".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_or_join_waits_for_running_attempt() {
        let endpoint = Arc::new(CountingEndpoint::new(200));
        let coordinator = coordinator(endpoint.clone(), BroadcastNotifier::default());
        let batch = BatchId::from("b1");

        let (a, b) = tokio::join!(
            coordinator.process_or_join(&batch),
            coordinator.process_or_join(&batch)
        );

        assert_eq!(a, b);
        assert_eq!(carbon(&a.unwrap()), 1.0);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_lifecycle() {
        let endpoint = Arc::new(CountingEndpoint::new(10));
        let coordinator = coordinator(endpoint, BroadcastNotifier::default());
        let mut events = coordinator.subscribe();
        let batch = BatchId::from("b1");

        coordinator.process(&batch).await;
        coordinator.reset(&batch);

        let statuses: Vec<ProcessingStatus> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                ProcessingStatus::Started,
                ProcessingStatus::Succeeded,
                ProcessingStatus::Reset
            ]
        );
    }
}
