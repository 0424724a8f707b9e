//! Produce Batch - bounded-retry batch publishing over a broker producer client
//!
//! This crate normalizes three input shapes into producer records, publishes
//! them through a [`SyncProducer`] (the broker client seam), re-sends only the
//! records that failed with a transient error, and reports the records that
//! were never delivered.
//!
//! # Examples
//!
//! ## One-off publish
//!
//! ```ignore
//! use produce_batch::{produce_batch, RetryPolicy};
//!
//! let payloads: Vec<Vec<u8>> = vec![b"a".to_vec(), b"b".to_vec()];
//! match produce_batch(&producer, payloads, Some("events"), &RetryPolicy::default()).await {
//!     Ok(summary) => println!("delivered {} in {} attempts", summary.delivered, summary.attempts),
//!     Err(err) => {
//!         for failed in err.failed() {
//!             eprintln!("undelivered: {:?} ({})", failed.record.key, failed.error);
//!         }
//!     }
//! }
//! ```
//!
//! ## Reusable publisher
//!
//! ```ignore
//! use produce_batch::{BatchProducer, BatchProducerConfig, KafkaSyncProducer};
//!
//! let config = BatchProducerConfig::from_config_map(&settings)?;
//! let publisher = BatchProducer::builder()
//!     .producer(Arc::new(KafkaSyncProducer::from_config(&config)?))
//!     .config(&config)
//!     .build()?;
//!
//! publisher.produce_batch(consumed_records).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `rdkafka` - Enables [`KafkaSyncProducer`], backed by librdkafka.

pub mod batch;
pub mod config;
pub mod error;
#[cfg(feature = "rdkafka")]
pub mod kafka;
pub mod memory;
pub mod producer;
pub mod publish;
pub mod record;
pub mod retry;

pub use batch::Batch;
pub use config::BatchProducerConfig;
pub use error::{ClientError, ProduceBatchError, Result};
pub use memory::MemoryProducer;
pub use producer::{ProducerErrors, RecordError, SyncProducer};
pub use publish::{
    produce_batch, produce_records, BatchProducer, BatchProducerBuilder, ProduceSummary,
};
pub use record::{ConsumedRecord, ProducerRecord, RecordHeader};
pub use retry::RetryPolicy;

#[cfg(feature = "rdkafka")]
pub use kafka::KafkaSyncProducer;
