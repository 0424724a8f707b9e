//! In-memory producer.
//!
//! [`MemoryProducer`] implements [`SyncProducer`] without a broker. Delivered
//! records are kept in delivery order, and failures can be scripted so
//! retry behavior is reproducible in tests:
//!
//! ```ignore
//! let producer = MemoryProducer::new();
//! producer.fail_next(2, ClientError::QueueFull);          // transient
//! producer.fail_topic("audit", ClientError::Authorization("denied".into()));
//!
//! let summary = produce_batch(&producer, batch, Some("events"), &policy).await?;
//! assert_eq!(producer.delivered_to("events").len(), summary.delivered);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::trace;

use crate::error::ClientError;
use crate::producer::{ProducerErrors, RecordError, SyncProducer};
use crate::record::ProducerRecord;

#[derive(Default)]
struct State {
    delivered: Vec<ProducerRecord>,
    /// Transient failures still to hand out, oldest first.
    scripted: Vec<(usize, ClientError)>,
    failing_topics: HashMap<String, ClientError>,
}

/// A [`SyncProducer`] that stores delivered records in memory.
#[derive(Default)]
pub struct MemoryProducer {
    state: Mutex<State>,
    send_calls: AtomicUsize,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` records offered, across calls, with `error`.
    ///
    /// Scripts queue up: a second call takes effect once the first is used up.
    pub fn fail_next(&self, count: usize, error: ClientError) {
        if count > 0 {
            self.lock().scripted.push((count, error));
        }
    }

    /// Fail every record sent to `topic` with `error`, on every attempt.
    pub fn fail_topic(&self, topic: impl Into<String>, error: ClientError) {
        self.lock().failing_topics.insert(topic.into(), error);
    }

    /// Stop failing records for `topic`.
    pub fn heal_topic(&self, topic: &str) {
        self.lock().failing_topics.remove(topic);
    }

    /// All delivered records, in delivery order.
    pub fn delivered(&self) -> Vec<ProducerRecord> {
        self.lock().delivered.clone()
    }

    /// Delivered records for one topic, in delivery order.
    pub fn delivered_to(&self, topic: &str) -> Vec<ProducerRecord> {
        self.lock()
            .delivered
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of `send_messages` calls made so far.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave `State` half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn take_scripted(&mut self) -> Option<ClientError> {
        let (remaining, error) = self.scripted.first_mut()?;
        let error = error.clone();
        *remaining -= 1;
        if *remaining == 0 {
            self.scripted.remove(0);
        }
        Some(error)
    }
}

#[async_trait]
impl SyncProducer for MemoryProducer {
    async fn send_messages(&self, records: Vec<ProducerRecord>) -> Result<(), ProducerErrors> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.lock();
        let mut failed = Vec::new();
        for record in records {
            let topic_error = state.failing_topics.get(&record.topic).cloned();
            let error = match topic_error {
                Some(error) => Some(error),
                None => state.take_scripted(),
            };
            match error {
                Some(error) => failed.push(RecordError::new(record, error)),
                None => state.delivered.push(record),
            }
        }

        trace!(
            delivered = state.delivered.len(),
            failed = failed.len(),
            "memory producer send"
        );

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ProducerErrors(failed))
        }
    }
}
