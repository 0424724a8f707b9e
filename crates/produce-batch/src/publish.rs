//! Bounded-retry batch publishing.
//!
//! ## Flow
//!
//! ```text
//! Batch ──into_records──▶ pending
//!                            │
//!        ┌───────────────────┤  attempt 1..=max_attempts
//!        ▼                   │
//!  send_messages(pending)    │
//!        │                   │
//!        ├─ Ok ──────────────┼──▶ ProduceSummary
//!        │                   │
//!        └─ Err(errors) ─────┤
//!             ├─ retryable ──┘  (next pending, after backoff)
//!             └─ permanent ─────▶ failed
//!
//! attempts exhausted: pending ──▶ failed ──▶ ProduceBatchError
//! ```
//!
//! Delivery is at-least-once: a record whose acknowledgement was lost is
//! re-sent on the next attempt and may be stored twice.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::config::BatchProducerConfig;
use crate::error::{ClientError, ProduceBatchError, Result};
use crate::producer::{ProducerErrors, RecordError, SyncProducer};
use crate::record::ProducerRecord;
use crate::retry::RetryPolicy;

/// Outcome of a fully delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceSummary {
    /// Records delivered. Equal to the batch size.
    pub delivered: usize,
    /// Send attempts made. Zero for an empty batch.
    pub attempts: usize,
}

/// Publish `records`, retrying the failed part of the batch per `policy`.
///
/// # Returns
///
/// - `Ok(ProduceSummary)` when every record was delivered
/// - `Err(ProduceBatchError)` listing every undelivered record with the error
///   of its last attempt
///
/// An empty `records` list returns immediately without calling the producer.
pub async fn produce_records<P>(
    producer: &P,
    records: Vec<ProducerRecord>,
    policy: &RetryPolicy,
) -> std::result::Result<ProduceSummary, ProduceBatchError>
where
    P: SyncProducer + ?Sized,
{
    let total = records.len();
    if total == 0 {
        return Ok(ProduceSummary {
            delivered: 0,
            attempts: 0,
        });
    }

    let max_attempts = policy.max_attempts();
    let mut pending = records;
    let mut failed: Vec<RecordError> = Vec::new();
    let mut attempts = 0;

    while !pending.is_empty() {
        attempts += 1;
        let offered = pending.len();
        debug!(attempt = attempts, max_attempts, records = offered, "Sending batch");

        let errors = match producer.send_messages(pending.clone()).await {
            Ok(()) => break,
            Err(errors) if errors.is_empty() => {
                warn!(
                    attempt = attempts,
                    records = offered,
                    "Send failed without record errors, treating every record as failed"
                );
                ProducerErrors::whole_batch(
                    std::mem::take(&mut pending),
                    ClientError::Broker {
                        message: "send failed without per-record errors".to_string(),
                        retryable: true,
                    },
                )
            }
            Err(mut errors) => {
                if errors.len() > offered {
                    warn!(
                        attempt = attempts,
                        records = offered,
                        reported = errors.len(),
                        "Producer reported more failures than records sent, truncating"
                    );
                    errors.0.truncate(offered);
                }
                pending.clear();
                errors
            }
        };

        let (retryable, permanent): (Vec<_>, Vec<_>) =
            errors.into_iter().partition(RecordError::is_retryable);

        if let Some(last) = permanent.last() {
            warn!(
                attempt = attempts,
                count = permanent.len(),
                error = %last.error,
                "Non-retryable errors, giving up on records"
            );
        }
        failed.extend(permanent);

        let Some(last) = retryable.last() else {
            break;
        };

        if attempts >= max_attempts {
            warn!(
                attempt = attempts,
                max_attempts,
                failed = retryable.len(),
                error = %last.error,
                "Max attempts exhausted, giving up"
            );
            failed.extend(retryable);
            break;
        }

        let backoff = policy.delay(attempts - 1);
        warn!(
            attempt = attempts,
            max_attempts,
            failed = retryable.len(),
            offered,
            backoff_ms = backoff.as_millis(),
            error = %last.error,
            "Retryable errors, backing off"
        );
        pending = retryable.into_iter().map(|e| e.record).collect();
        if !backoff.is_zero() {
            sleep(backoff).await;
        }
    }

    if failed.is_empty() {
        if attempts > 1 {
            info!(attempts, delivered = total, "Batch delivered after retry");
        }
        Ok(ProduceSummary {
            delivered: total,
            attempts,
        })
    } else {
        Err(ProduceBatchError::new(failed, total, attempts))
    }
}

/// Normalize `batch` and publish it with bounded retry.
///
/// `topic` is required for payload and consumed-record batches and ignored
/// for producer-record batches. A batch that cannot be normalized is rejected
/// before anything is sent (see [`ProduceBatchError::rejection`]).
pub async fn produce_batch<P>(
    producer: &P,
    batch: impl Into<Batch>,
    topic: Option<&str>,
    policy: &RetryPolicy,
) -> std::result::Result<ProduceSummary, ProduceBatchError>
where
    P: SyncProducer + ?Sized,
{
    let records = batch
        .into()
        .into_records(topic)
        .map_err(ProduceBatchError::rejected)?;
    produce_records(producer, records, policy).await
}

/// A producer bundled with its retry policy and an optional default topic.
///
/// ## Example
///
/// ```ignore
/// use produce_batch::{BatchProducer, MemoryProducer};
///
/// let publisher = BatchProducer::builder()
///     .producer(Arc::new(MemoryProducer::new()))
///     .default_topic("events")
///     .build()?;
///
/// publisher.produce_batch(vec![b"hello".to_vec()]).await?;
/// ```
#[derive(Clone)]
pub struct BatchProducer {
    producer: Arc<dyn SyncProducer>,
    policy: RetryPolicy,
    default_topic: Option<String>,
}

impl BatchProducer {
    pub fn builder() -> BatchProducerBuilder {
        BatchProducerBuilder::new()
    }

    /// Publish to the default topic (if any).
    pub async fn produce_batch(
        &self,
        batch: impl Into<Batch>,
    ) -> std::result::Result<ProduceSummary, ProduceBatchError> {
        produce_batch(
            self.producer.as_ref(),
            batch,
            self.default_topic.as_deref(),
            &self.policy,
        )
        .await
    }

    /// Publish to `topic`, overriding the default topic.
    pub async fn produce_batch_to(
        &self,
        batch: impl Into<Batch>,
        topic: &str,
    ) -> std::result::Result<ProduceSummary, ProduceBatchError> {
        produce_batch(self.producer.as_ref(), batch, Some(topic), &self.policy).await
    }

    pub async fn produce_records(
        &self,
        records: Vec<ProducerRecord>,
    ) -> std::result::Result<ProduceSummary, ProduceBatchError> {
        produce_records(self.producer.as_ref(), records, &self.policy).await
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn default_topic(&self) -> Option<&str> {
        self.default_topic.as_deref()
    }

    pub fn producer(&self) -> &Arc<dyn SyncProducer> {
        &self.producer
    }
}

/// Builder for [`BatchProducer`].
#[derive(Default)]
pub struct BatchProducerBuilder {
    /// Broker client (required).
    producer: Option<Arc<dyn SyncProducer>>,

    /// Retry policy (default: `RetryPolicy::default()`).
    policy: RetryPolicy,

    default_topic: Option<String>,
}

impl BatchProducerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(mut self, producer: Arc<dyn SyncProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = Some(topic.into());
        self
    }

    /// Take the retry policy and default topic from `config`.
    pub fn config(mut self, config: &BatchProducerConfig) -> Self {
        self.policy = config.retry_policy();
        if let Some(topic) = &config.default_topic {
            self.default_topic = Some(topic.clone());
        }
        self
    }

    pub fn build(self) -> Result<BatchProducer> {
        let producer = self
            .producer
            .ok_or_else(|| ClientError::ConfigError("producer is required".to_string()))?;

        if matches!(self.default_topic.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ClientError::ConfigError(
                "default topic must not be empty".to_string(),
            ));
        }

        debug!(
            max_attempts = self.policy.max_attempts(),
            default_topic = ?self.default_topic,
            "Batch producer initialized"
        );

        Ok(BatchProducer {
            producer,
            policy: self.policy,
            default_topic: self.default_topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProducer;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn records(n: usize) -> Vec<ProducerRecord> {
        (0..n)
            .map(|i| ProducerRecord::new("events", format!("v{}", i)))
            .collect()
    }

    /// Fails every record of every call with the same error.
    struct AlwaysFailing {
        error: ClientError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncProducer for AlwaysFailing {
        async fn send_messages(
            &self,
            records: Vec<ProducerRecord>,
        ) -> std::result::Result<(), ProducerErrors> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProducerErrors::whole_batch(records, self.error.clone()))
        }
    }

    // ========================================================================
    // produce_records
    // ========================================================================

    #[tokio::test]
    async fn test_immediate_success() {
        let producer = MemoryProducer::new();
        let summary = produce_records(&producer, records(3), &RetryPolicy::no_backoff(2))
            .await
            .unwrap();

        assert_eq!(
            summary,
            ProduceSummary {
                delivered: 3,
                attempts: 1
            }
        );
        assert_eq!(producer.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_producer() {
        let producer = MemoryProducer::new();
        let summary = produce_records(&producer, Vec::new(), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.attempts, 0);
        assert_eq!(producer.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_only_failed_records_are_resent() {
        let producer = MemoryProducer::new();
        producer.fail_next(2, ClientError::QueueFull);

        let summary = produce_records(&producer, records(5), &RetryPolicy::no_backoff(2))
            .await
            .unwrap();

        assert_eq!(summary.delivered, 5);
        assert_eq!(summary.attempts, 2);
        // 3 delivered first, then the 2 that failed.
        let values: Vec<_> = producer.delivered().into_iter().map(|r| r.value).collect();
        assert_eq!(
            values,
            vec!["v2", "v3", "v4", "v0", "v1"]
                .into_iter()
                .map(Bytes::from)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failed_records() {
        let producer = AlwaysFailing {
            error: ClientError::BrokerUnavailable("down".into()),
            calls: AtomicUsize::new(0),
        };

        let err = produce_records(&producer, records(4), &RetryPolicy::no_backoff(2))
            .await
            .unwrap_err();

        // 1 initial + 2 retries.
        assert_eq!(producer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.total(), 4);
        assert_eq!(err.failed().len(), 4);
        assert_eq!(err.delivered(), 0);
        assert_eq!(
            err.last_error(),
            Some(&ClientError::BrokerUnavailable("down".into()))
        );
        assert!(err
            .to_string()
            .starts_with("failed to deliver 4 of 4 records after 3 attempts"));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let producer = AlwaysFailing {
            error: ClientError::QueueFull,
            calls: AtomicUsize::new(0),
        };

        let err = produce_records(&producer, records(1), &RetryPolicy::no_backoff(0))
            .await
            .unwrap_err();
        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let producer = AlwaysFailing {
            error: ClientError::MessageTooLarge { size: 10_000_000 },
            calls: AtomicUsize::new(0),
        };

        let err = produce_records(&producer, records(2), &RetryPolicy::no_backoff(5))
            .await
            .unwrap_err();

        assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.failed().len(), 2);
    }

    #[tokio::test]
    async fn test_mixed_errors_retry_only_transient() {
        let producer = MemoryProducer::new();
        producer.fail_topic("audit", ClientError::Authorization("denied".into()));
        producer.fail_next(1, ClientError::QueueFull);

        let batch = vec![
            ProducerRecord::new("events", "a"),
            ProducerRecord::new("audit", "b"),
            ProducerRecord::new("events", "c"),
        ];
        let err = produce_records(&producer, batch, &RetryPolicy::no_backoff(3))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert_eq!(err.delivered(), 2);
        assert_eq!(err.failed().len(), 1);
        assert_eq!(err.failed()[0].record.topic, "audit");
        assert_eq!(producer.delivered_to("events").len(), 2);
        // Second attempt only re-sent the transient failure.
        assert_eq!(producer.send_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_records_keep_last_attempt_error() {
        let producer = MemoryProducer::new();
        producer.fail_next(1, ClientError::QueueFull);
        producer.fail_next(1, ClientError::Timeout(Duration::from_secs(1)));

        let err = produce_records(&producer, records(1), &RetryPolicy::no_backoff(1))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert_eq!(
            err.failed()[0].error,
            ClientError::Timeout(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn test_delivered_plus_failed_equals_total() {
        let producer = MemoryProducer::new();
        producer.fail_next(7, ClientError::QueueFull);

        let err = produce_records(&producer, records(5), &RetryPolicy::no_backoff(1))
            .await
            .unwrap_err();

        // Attempt 1: all 5 fail. Attempt 2: 2 fail, 3 delivered.
        assert_eq!(err.delivered() + err.failed().len(), err.total());
        assert_eq!(err.failed().len(), 2);
        assert_eq!(producer.delivered().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let producer = MemoryProducer::new();
        producer.fail_next(1, ClientError::QueueFull);
        let policy = RetryPolicy::new(
            1,
            Duration::from_millis(500),
            Duration::from_secs(5),
            2.0,
        )
        .with_jitter(false);

        let start = tokio::time::Instant::now();
        produce_records(&producer, records(1), &policy).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    /// Reports every record it is given twice.
    struct DoubleReporting;

    #[async_trait]
    impl SyncProducer for DoubleReporting {
        async fn send_messages(
            &self,
            records: Vec<ProducerRecord>,
        ) -> std::result::Result<(), ProducerErrors> {
            let twice = records.iter().chain(records.iter()).cloned().collect();
            Err(ProducerErrors::whole_batch(
                twice,
                ClientError::InvalidRecord("bad".into()),
            ))
        }
    }

    /// Fails the first call without naming any record, then delivers.
    struct SilentFailure {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncProducer for SilentFailure {
        async fn send_messages(
            &self,
            _records: Vec<ProducerRecord>,
        ) -> std::result::Result<(), ProducerErrors> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProducerErrors::default())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_over_reported_failures_are_capped() {
        let err = produce_records(&DoubleReporting, records(1), &RetryPolicy::no_backoff(0))
            .await
            .unwrap_err();

        assert_eq!(err.total(), 1);
        assert_eq!(err.failed().len(), 1);
        assert_eq!(err.delivered(), 0);
        assert_eq!(err.delivered() + err.failed().len(), err.total());
    }

    #[tokio::test]
    async fn test_error_without_records_fails_whole_attempt() {
        let producer = SilentFailure {
            calls: AtomicUsize::new(0),
        };
        let summary = produce_records(&producer, records(3), &RetryPolicy::no_backoff(1))
            .await
            .unwrap();

        // The empty error is not mistaken for delivery: all 3 are re-sent.
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.delivered, 3);
        assert_eq!(producer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_without_records_reports_pending_when_exhausted() {
        let producer = SilentFailure {
            calls: AtomicUsize::new(0),
        };
        let err = produce_records(&producer, records(2), &RetryPolicy::no_backoff(0))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert_eq!(err.failed().len(), 2);
        assert_eq!(err.delivered(), 0);
    }

    // ========================================================================
    // produce_batch
    // ========================================================================

    #[tokio::test]
    async fn test_produce_batch_payloads() {
        let producer = MemoryProducer::new();
        let summary = produce_batch(
            &producer,
            vec![b"a".to_vec(), b"b".to_vec()],
            Some("raw"),
            &RetryPolicy::no_backoff(2),
        )
        .await
        .unwrap();

        assert_eq!(summary.delivered, 2);
        assert_eq!(producer.delivered_to("raw").len(), 2);
    }

    #[tokio::test]
    async fn test_produce_batch_without_topic_is_rejected() {
        let producer = MemoryProducer::new();
        let err = produce_batch(
            &producer,
            vec![Bytes::from("a")],
            None,
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts(), 0);
        assert!(err.failed().is_empty());
        assert_eq!(
            err.rejection(),
            Some(&ClientError::MissingTopic("raw payloads"))
        );
        assert_eq!(producer.send_calls(), 0);
    }

    // ========================================================================
    // BatchProducer
    // ========================================================================

    #[test]
    fn test_builder_requires_producer() {
        let err = BatchProducer::builder().build().err().unwrap();
        assert!(matches!(err, ClientError::ConfigError(_)));
    }

    #[test]
    fn test_builder_rejects_empty_default_topic() {
        let err = BatchProducer::builder()
            .producer(Arc::new(MemoryProducer::new()))
            .default_topic("")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::ConfigError(_)));

        let err = BatchProducer::builder()
            .producer(Arc::new(MemoryProducer::new()))
            .default_topic("  ")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_produce_batch_blank_topic_is_rejected() {
        let producer = MemoryProducer::new();
        let err = produce_batch(
            &producer,
            vec![b"a".to_vec()],
            Some("   "),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.rejection(),
            Some(&ClientError::MissingTopic("raw payloads"))
        );
        assert!(producer.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_batch_producer_default_and_override_topic() {
        let memory = Arc::new(MemoryProducer::new());
        let publisher = BatchProducer::builder()
            .producer(memory.clone())
            .retry_policy(RetryPolicy::no_backoff(1))
            .default_topic("events")
            .build()
            .unwrap();

        assert_eq!(publisher.default_topic(), Some("events"));
        assert_eq!(publisher.policy().max_attempts(), 2);

        publisher.produce_batch(vec![b"x".to_vec()]).await.unwrap();
        publisher
            .produce_batch_to(vec![b"y".to_vec()], "other")
            .await
            .unwrap();
        publisher
            .produce_records(vec![ProducerRecord::new("third", "z")])
            .await
            .unwrap();

        assert_eq!(memory.delivered_to("events").len(), 1);
        assert_eq!(memory.delivered_to("other").len(), 1);
        assert_eq!(memory.delivered_to("third").len(), 1);
    }

    #[tokio::test]
    async fn test_batch_producer_without_default_topic_rejects_payloads() {
        let publisher = BatchProducer::builder()
            .producer(Arc::new(MemoryProducer::new()))
            .build()
            .unwrap();

        let err = publisher
            .produce_batch(vec![b"x".to_vec()])
            .await
            .unwrap_err();
        assert!(err.rejection().is_some());
    }
}
