//! Broker client seam.
//!
//! [`SyncProducer`] is the only thing this crate needs from a broker client:
//! send a list of records and wait until each one is either acknowledged or
//! has failed. Batching on the wire, partitioning and transport are the
//! implementation's concern.
//!
//! ## Contract
//!
//! `send_messages` resolves with `Ok(())` only when every record was
//! delivered. On `Err`, the returned [`ProducerErrors`] contains every record
//! that was *not* delivered, each with its own error. Records that were
//! delivered must not appear in it. The retry loop relies on this to re-send
//! only the failed part of a batch.
//!
//! ```ignore
//! #[async_trait]
//! impl SyncProducer for MyClient {
//!     async fn send_messages(&self, records: Vec<ProducerRecord>) -> Result<(), ProducerErrors> {
//!         match self.inner.send_all(&records).await {
//!             Ok(()) => Ok(()),
//!             Err(e) => Err(ProducerErrors::whole_batch(records, e.into())),
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::record::ProducerRecord;

/// A record that could not be delivered, together with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordError {
    pub record: ProducerRecord,
    pub error: ClientError,
}

impl RecordError {
    pub fn new(record: ProducerRecord, error: ClientError) -> Self {
        Self { record, error }
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

/// The records a single `send_messages` call failed to deliver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerErrors(pub Vec<RecordError>);

impl ProducerErrors {
    /// Attribute one batch-level error to every record of the attempt.
    pub fn whole_batch(records: Vec<ProducerRecord>, error: ClientError) -> Self {
        Self(
            records
                .into_iter()
                .map(|record| RecordError::new(record, error.clone()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordError> {
        self.0.iter()
    }

    /// The failed records, without their errors.
    pub fn into_records(self) -> Vec<ProducerRecord> {
        self.0.into_iter().map(|e| e.record).collect()
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.0.last().map(|e| &e.error)
    }
}

impl std::fmt::Display for ProducerErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} records failed", self.0.len())?;
        if let Some(last) = self.last_error() {
            write!(f, ", last error: {}", last)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProducerErrors {}

impl IntoIterator for ProducerErrors {
    type Item = RecordError;
    type IntoIter = std::vec::IntoIter<RecordError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<RecordError> for ProducerErrors {
    fn from_iter<I: IntoIterator<Item = RecordError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A broker client that publishes a list of records and waits for the outcome.
#[async_trait]
pub trait SyncProducer: Send + Sync {
    /// Publish `records` and wait until each is acknowledged or has failed.
    async fn send_messages(&self, records: Vec<ProducerRecord>) -> Result<(), ProducerErrors>;
}

#[async_trait]
impl<P: SyncProducer + ?Sized> SyncProducer for Arc<P> {
    async fn send_messages(&self, records: Vec<ProducerRecord>) -> Result<(), ProducerErrors> {
        (**self).send_messages(records).await
    }
}

#[async_trait]
impl<'a, P: SyncProducer + ?Sized> SyncProducer for &'a P {
    async fn send_messages(&self, records: Vec<ProducerRecord>) -> Result<(), ProducerErrors> {
        (**self).send_messages(records).await
    }
}
