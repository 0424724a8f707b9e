//! Publish stdin lines to a Kafka topic
//!
//! Reads stdin, groups lines into batches and publishes each batch with
//! bounded retry. Undelivered lines are printed to stderr.
//!
//! Run with:
//! ```bash
//! printf 'a\nb\nc\n' | cargo run -p produce-batch --features rdkafka \
//!     --example publish_lines -- localhost:9092 lines
//! ```
//!
//! Set `RUST_LOG=produce_batch=debug` to see each attempt.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use produce_batch::{BatchProducer, BatchProducerConfig, KafkaSyncProducer};
use tracing_subscriber::EnvFilter;

const BATCH_SIZE: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let bootstrap_servers = args.next().unwrap_or_else(|| "localhost:9092".to_string());
    let topic = args.next().unwrap_or_else(|| "lines".to_string());

    let settings: HashMap<String, String> = [
        ("bootstrap.servers", bootstrap_servers.as_str()),
        ("client.id", "publish-lines"),
        ("default.topic", topic.as_str()),
        ("linger.ms", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = BatchProducerConfig::from_config_map(&settings)?;
    let kafka = Arc::new(KafkaSyncProducer::from_config(&config)?);
    let publisher = BatchProducer::builder()
        .producer(kafka.clone())
        .config(&config)
        .build()?;

    let mut delivered = 0;
    let mut undelivered = 0;
    let mut batch: Vec<Vec<u8>> = Vec::with_capacity(BATCH_SIZE);
    let mut lines = std::io::stdin().lock().lines();

    loop {
        let line = lines.next().transpose().context("reading stdin")?;
        let done = line.is_none();
        if let Some(line) = line {
            batch.push(line.into_bytes());
        }
        if batch.len() >= BATCH_SIZE || (done && !batch.is_empty()) {
            match publisher.produce_batch(std::mem::take(&mut batch)).await {
                Ok(summary) => delivered += summary.delivered,
                Err(err) => {
                    eprintln!("{}", err);
                    delivered += err.delivered();
                    undelivered += err.failed().len();
                    for failed in err.failed() {
                        eprintln!(
                            "  undelivered: {} ({})",
                            String::from_utf8_lossy(&failed.record.value),
                            failed.error
                        );
                    }
                }
            }
        }
        if done {
            break;
        }
    }

    kafka.flush(Duration::from_secs(10))?;
    println!(
        "topic '{}': {} delivered, {} undelivered",
        topic, delivered, undelivered
    );
    Ok(())
}
