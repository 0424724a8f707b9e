//! Error types for batch publishing.
//!
//! Two levels of error live here:
//!
//! - [`ClientError`] describes why a single record (or a single operation such
//!   as building a producer) failed. Broker client adapters translate their
//!   native errors into these variants so the retry loop can tell transient
//!   failures from permanent ones.
//! - [`ProduceBatchError`] is the outcome of a whole publish: which records
//!   were never delivered, how many attempts were made, and the last error.
//!
//! ## Error Handling Strategy
//!
//! - **Retryable**: `BrokerUnavailable`, `Timeout`, `QueueFull`, `LeaderNotAvailable`
//! - **Permanent**: `MessageTooLarge`, `TopicNotFound`, `Authorization`, `InvalidRecord`
//! - **Caller errors**: `MissingTopic`, `ConfigError`
//!
//! ## Examples
//!
//! ```ignore
//! use produce_batch::{produce_batch, Batch, RetryPolicy};
//!
//! match produce_batch(&producer, batch, Some("orders"), &RetryPolicy::default()).await {
//!     Ok(summary) => println!("delivered {}", summary.delivered),
//!     Err(err) => {
//!         eprintln!("{}", err);
//!         for failed in err.failed() {
//!             eprintln!("  {} -> {}", failed.record.topic, failed.error);
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::producer::RecordError;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Reason a record or an operation failed.
///
/// Variants are `Clone` so a single batch-level failure can be attributed to
/// every record of the attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The broker (or every broker) could not be reached.
    ///
    /// Usually transient: broker restart, network blip, rolling upgrade.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Delivery was not acknowledged in time.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The broker client's local send queue is full.
    #[error("Producer queue is full")]
    QueueFull,

    /// No leader is currently available for the target partition.
    #[error("Leader not available for topic '{0}'")]
    LeaderNotAvailable(String),

    /// Record exceeds the broker's maximum message size.
    #[error("Record of {size} bytes exceeds the maximum message size")]
    MessageTooLarge { size: usize },

    /// Target topic does not exist and will not be auto-created.
    #[error("Topic '{0}' does not exist")]
    TopicNotFound(String),

    /// Credentials were rejected or the principal may not write the topic.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// The broker client rejected the record itself (bad partition, bad header).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A payload or consumed-record batch was given without a target topic.
    #[error("A target topic is required for {0}")]
    MissingTopic(&'static str),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Any other error reported by the broker client.
    ///
    /// The `retryable` flag carries the broker client's own classification.
    #[error("Broker error: {message}")]
    Broker { message: String, retryable: bool },
}

impl ClientError {
    /// Whether re-sending the same record may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::BrokerUnavailable(_)
            | ClientError::Timeout(_)
            | ClientError::QueueFull
            | ClientError::LeaderNotAvailable(_) => true,

            ClientError::Broker { retryable, .. } => *retryable,

            ClientError::MessageTooLarge { .. }
            | ClientError::TopicNotFound(_)
            | ClientError::Authorization(_)
            | ClientError::InvalidRecord(_)
            | ClientError::MissingTopic(_)
            | ClientError::ConfigError(_) => false,
        }
    }
}

/// A publish that did not deliver every record.
///
/// Produced either because the input was rejected before sending
/// (`attempts == 0`, `failed` empty, `rejection` set) or because some records
/// were still undelivered once the retry budget ran out.
#[derive(Debug, Error)]
#[error("{}", self.describe())]
pub struct ProduceBatchError {
    failed: Vec<RecordError>,
    total: usize,
    attempts: usize,
    #[source]
    rejection: Option<ClientError>,
}

impl ProduceBatchError {
    pub(crate) fn new(failed: Vec<RecordError>, total: usize, attempts: usize) -> Self {
        Self {
            failed,
            total,
            attempts,
            rejection: None,
        }
    }

    /// The batch was refused before any record was sent.
    pub(crate) fn rejected(error: ClientError) -> Self {
        Self {
            failed: Vec::new(),
            total: 0,
            attempts: 0,
            rejection: Some(error),
        }
    }

    /// Records that were never delivered, each with the error of its last attempt.
    pub fn failed(&self) -> &[RecordError] {
        &self.failed
    }

    /// Consume the error, returning the undelivered records and their errors.
    pub fn into_failed(self) -> Vec<RecordError> {
        self.failed
    }

    /// Number of records in the batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of records that were delivered despite the failure.
    pub fn delivered(&self) -> usize {
        self.total.saturating_sub(self.failed.len())
    }

    /// Number of send attempts made.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Set when the input itself was rejected.
    pub fn rejection(&self) -> Option<&ClientError> {
        self.rejection.as_ref()
    }

    /// The error that ended the publish.
    pub fn last_error(&self) -> Option<&ClientError> {
        self.rejection
            .as_ref()
            .or_else(|| self.failed.last().map(|f| &f.error))
    }

    fn describe(&self) -> String {
        if let Some(rejection) = &self.rejection {
            return format!("batch rejected: {}", rejection);
        }
        let mut msg = format!(
            "failed to deliver {} of {} records after {} attempts",
            self.failed.len(),
            self.total,
            self.attempts
        );
        if let Some(last) = self.last_error() {
            msg.push_str(&format!(", last error: {}", last));
        }
        msg
    }
}
