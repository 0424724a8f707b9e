//! Batch Normalization
//!
//! A publish accepts one of three input shapes and turns it into a single
//! list of [`ProducerRecord`]s before anything is sent:
//!
//! ```text
//! ┌──────────────────────┐
//! │ Payloads(Vec<Bytes>) │──┐   topic required
//! └──────────────────────┘  │
//! ┌──────────────────────┐  │   ┌──────────────────────┐
//! │ Consumed(Vec<..>)    │──┼──▶│ Vec<ProducerRecord>  │──▶ broker client
//! └──────────────────────┘  │   └──────────────────────┘
//! ┌──────────────────────┐  │
//! │ Records(Vec<..>)     │──┘   each record keeps its own topic
//! └──────────────────────┘
//! ```
//!
//! Input order is preserved.

use bytes::Bytes;

use crate::error::{ClientError, Result};
use crate::record::{ConsumedRecord, ProducerRecord};

/// The input shapes accepted by a batch publish.
#[derive(Debug, Clone)]
pub enum Batch {
    /// Raw payloads. Each becomes a record with no key on the target topic.
    Payloads(Vec<Bytes>),
    /// Records received from a consumer, re-published to the target topic.
    Consumed(Vec<ConsumedRecord>),
    /// Fully built records. The target topic argument is ignored.
    Records(Vec<ProducerRecord>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Payloads(p) => p.len(),
            Batch::Consumed(c) => c.len(),
            Batch::Records(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this shape needs a target topic to be normalized.
    pub fn requires_topic(&self) -> bool {
        !matches!(self, Batch::Records(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Batch::Payloads(_) => "raw payloads",
            Batch::Consumed(_) => "consumed records",
            Batch::Records(_) => "producer records",
        }
    }

    /// Convert the batch into producer records.
    ///
    /// # Errors
    ///
    /// `ClientError::MissingTopic` when a payload or consumed batch is given
    /// no (or a blank) topic, or when a prebuilt record has a blank topic.
    pub fn into_records(self, topic: Option<&str>) -> Result<Vec<ProducerRecord>> {
        let kind = self.kind();
        let target = || {
            topic
                .filter(|t| !t.trim().is_empty())
                .ok_or(ClientError::MissingTopic(kind))
        };

        match self {
            Batch::Payloads(payloads) => {
                let topic = target()?;
                Ok(payloads
                    .into_iter()
                    .map(|payload| ProducerRecord::from_payload(topic, payload))
                    .collect())
            }
            Batch::Consumed(consumed) => {
                let topic = target()?;
                Ok(consumed
                    .into_iter()
                    .map(|record| ProducerRecord::from_consumed(topic, record))
                    .collect())
            }
            Batch::Records(records) => {
                if records.iter().any(|r| r.topic.trim().is_empty()) {
                    return Err(ClientError::MissingTopic(kind));
                }
                Ok(records)
            }
        }
    }
}

impl From<Vec<Bytes>> for Batch {
    fn from(payloads: Vec<Bytes>) -> Self {
        Batch::Payloads(payloads)
    }
}

impl From<Vec<Vec<u8>>> for Batch {
    fn from(payloads: Vec<Vec<u8>>) -> Self {
        Batch::Payloads(payloads.into_iter().map(Bytes::from).collect())
    }
}

impl From<Vec<ConsumedRecord>> for Batch {
    fn from(records: Vec<ConsumedRecord>) -> Self {
        Batch::Consumed(records)
    }
}

impl From<Vec<ProducerRecord>> for Batch {
    fn from(records: Vec<ProducerRecord>) -> Self {
        Batch::Records(records)
    }
}
