//! Record Data Structures
//!
//! This module defines the record shapes this crate moves around:
//!
//! - [`ProducerRecord`]: the single message unit handed to the broker client
//! - [`ConsumedRecord`]: a record previously received by a consumer, which can
//!   be re-published (mirroring, replay, dead-letter redrive)
//! - [`RecordHeader`]: a key/value header attached to either
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` so retries re-send the same buffers without copying
//! - Partition is optional on producer records; when unset the broker client
//!   picks one
//! - Re-targeting a consumed record drops its source partition and offset

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub key: String,
    /// Kafka allows null header values.
    pub value: Option<Bytes>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn null(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    fn size(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }
}

/// A record to be sent through the broker client.
///
/// ## Examples
///
/// ```ignore
/// use produce_batch::ProducerRecord;
///
/// let record = ProducerRecord::new("orders", r#"{"id": 1}"#)
///     .with_key("user123")
///     .with_header("source", "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// Topic name to send the record to.
    pub topic: String,

    /// Optional key, used by the broker client's partitioner.
    pub key: Option<Bytes>,

    /// Record value (payload).
    pub value: Bytes,

    /// Headers, in insertion order. Duplicate keys are allowed.
    #[serde(default)]
    pub headers: Vec<RecordHeader>,

    /// Optional explicit partition. Overrides key-based partitioning.
    pub partition: Option<u32>,

    /// Optional timestamp in milliseconds since Unix epoch.
    ///
    /// If `None`, the broker client assigns one.
    pub timestamp: Option<i64>,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: value.into(),
            headers: Vec::new(),
            partition: None,
            timestamp: None,
        }
    }

    /// Build a record from a raw payload: topic and value only.
    pub fn from_payload(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(topic, payload)
    }

    /// Re-target a consumed record to `topic`.
    ///
    /// Key, value, headers and timestamp are carried over. The source
    /// partition and offset are dropped.
    pub fn from_consumed(topic: impl Into<String>, consumed: ConsumedRecord) -> Self {
        Self {
            topic: topic.into(),
            key: consumed.key,
            value: consumed.value,
            headers: consumed.headers,
            partition: None,
            timestamp: i64::try_from(consumed.timestamp).ok(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push(RecordHeader::new(key, value));
        self
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Estimate the size of this record in bytes (key + value + headers).
    pub fn estimated_size(&self) -> usize {
        self.key.as_ref().map_or(0, |k| k.len())
            + self.value.len()
            + self.headers.iter().map(RecordHeader::size).sum::<usize>()
    }
}

/// A record received by a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Timestamp in milliseconds since epoch.
    pub timestamp: u64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    #[serde(default)]
    pub headers: Vec<RecordHeader>,
}
