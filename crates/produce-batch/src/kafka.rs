//! `rdkafka` adapter (feature `rdkafka`).
//!
//! [`KafkaSyncProducer`] wraps an `rdkafka` `FutureProducer`. A call to
//! `send_messages` enqueues every record, then waits for all delivery reports
//! concurrently; librdkafka batches them on the wire. Records whose report is
//! an error come back in [`ProducerErrors`] with the rdkafka error translated
//! to a [`ClientError`], so the retry loop can tell transient failures apart.
//!
//! ```ignore
//! let config = BatchProducerConfig::new("localhost:9092");
//! let kafka = Arc::new(KafkaSyncProducer::from_config(&config)?);
//!
//! let publisher = BatchProducer::builder()
//!     .producer(kafka)
//!     .config(&config)
//!     .build()?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use crate::config::BatchProducerConfig;
use crate::error::{ClientError, Result};
use crate::producer::{ProducerErrors, RecordError, SyncProducer};
use crate::record::ProducerRecord;

/// How long `send` waits for room in librdkafka's local queue by default.
const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// A [`SyncProducer`] backed by `rdkafka::producer::FutureProducer`.
pub struct KafkaSyncProducer {
    producer: FutureProducer,
    message_timeout: Duration,
    queue_timeout: Duration,
}

impl KafkaSyncProducer {
    /// Build the underlying `FutureProducer` from `config`.
    ///
    /// `client_overrides` are applied last and may replace any derived setting.
    pub fn from_config(config: &BatchProducerConfig) -> Result<Self> {
        config.validate()?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("acks", &config.acks)
            .set("message.timeout.ms", config.message_timeout_ms.to_string());
        if let Some(client_id) = &config.client_id {
            client_config.set("client.id", client_id);
        }
        for (key, value) in &config.client_overrides {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| ClientError::ConfigError(format!("failed to create producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            acks = %config.acks,
            message_timeout_ms = config.message_timeout_ms,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            message_timeout: config.message_timeout(),
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
        })
    }

    /// Wrap an existing `FutureProducer`.
    pub fn new(producer: FutureProducer, message_timeout: Duration) -> Self {
        Self {
            producer,
            message_timeout,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
        }
    }

    /// How long to wait for queue space before failing a record with `QueueFull`.
    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    pub fn inner(&self) -> &FutureProducer {
        &self.producer
    }

    /// Wait for all in-flight messages to be delivered.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| map_kafka_error(&e, "", 0, timeout))
    }

    async fn deliver(&self, record: &ProducerRecord) -> std::result::Result<(), ClientError> {
        let mut future_record =
            FutureRecord::<[u8], [u8]>::to(&record.topic).payload(&record.value[..]);

        if let Some(key) = &record.key {
            future_record = future_record.key(&key[..]);
        }
        if let Some(partition) = record.partition {
            let partition = i32::try_from(partition).map_err(|_| {
                ClientError::InvalidRecord(format!("partition {} out of range", partition))
            })?;
            future_record = future_record.partition(partition);
        }
        if let Some(timestamp) = record.timestamp {
            future_record = future_record.timestamp(timestamp);
        }
        if !record.headers.is_empty() {
            let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
            for header in &record.headers {
                headers = headers.insert(Header {
                    key: header.key.as_str(),
                    value: header.value.as_deref(),
                });
            }
            future_record = future_record.headers(headers);
        }

        match self
            .producer
            .send(future_record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok(_) => Ok(()),
            Err((err, _)) => Err(map_kafka_error(
                &err,
                &record.topic,
                record.estimated_size(),
                self.message_timeout,
            )),
        }
    }
}

#[async_trait]
impl SyncProducer for KafkaSyncProducer {
    async fn send_messages(
        &self,
        records: Vec<ProducerRecord>,
    ) -> std::result::Result<(), ProducerErrors> {
        let outcomes = join_all(records.iter().map(|record| self.deliver(record))).await;

        let failed: ProducerErrors = records
            .into_iter()
            .zip(outcomes)
            .filter_map(|(record, outcome)| outcome.err().map(|e| RecordError::new(record, e)))
            .collect();

        debug!(failed = failed.len(), "Kafka delivery reports received");

        if failed.is_empty() {
            Ok(())
        } else {
            Err(failed)
        }
    }
}

/// Translate an rdkafka error into a [`ClientError`].
///
/// `size` is the record's estimated size, reported for oversized messages.
fn map_kafka_error(
    err: &KafkaError,
    topic: &str,
    size: usize,
    message_timeout: Duration,
) -> ClientError {
    match err.rdkafka_error_code() {
        Some(code) => map_error_code(code, topic, size, message_timeout),
        None => match err {
            KafkaError::Canceled => ClientError::Broker {
                message: err.to_string(),
                retryable: true,
            },
            KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
                ClientError::ConfigError(err.to_string())
            }
            _ => ClientError::Broker {
                message: err.to_string(),
                retryable: false,
            },
        },
    }
}

fn map_error_code(
    code: RDKafkaErrorCode,
    topic: &str,
    size: usize,
    message_timeout: Duration,
) -> ClientError {
    match code {
        RDKafkaErrorCode::QueueFull => ClientError::QueueFull,

        RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut => {
            ClientError::Timeout(message_timeout)
        }

        RDKafkaErrorCode::LeaderNotAvailable | RDKafkaErrorCode::NotLeaderForPartition => {
            ClientError::LeaderNotAvailable(topic.to_string())
        }

        RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::BrokerNotAvailable
        | RDKafkaErrorCode::NetworkException => ClientError::BrokerUnavailable(code.to_string()),

        RDKafkaErrorCode::MessageSizeTooLarge | RDKafkaErrorCode::InvalidMessageSize => {
            ClientError::MessageTooLarge { size }
        }

        RDKafkaErrorCode::UnknownTopic | RDKafkaErrorCode::UnknownTopicOrPartition => {
            ClientError::TopicNotFound(topic.to_string())
        }

        RDKafkaErrorCode::TopicAuthorizationFailed
        | RDKafkaErrorCode::ClusterAuthorizationFailed
        | RDKafkaErrorCode::SaslAuthenticationFailed
        | RDKafkaErrorCode::Authentication => ClientError::Authorization(code.to_string()),

        RDKafkaErrorCode::UnknownPartition | RDKafkaErrorCode::InvalidRecord => {
            ClientError::InvalidRecord(code.to_string())
        }

        RDKafkaErrorCode::NotEnoughReplicas | RDKafkaErrorCode::NotEnoughReplicasAfterAppend => {
            ClientError::Broker {
                message: code.to_string(),
                retryable: true,
            }
        }

        _ => ClientError::Broker {
            message: code.to_string(),
            retryable: false,
        },
    }
}
