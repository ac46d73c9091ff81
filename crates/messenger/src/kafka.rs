//! Kafka byte backend.
//!
//! Every partition of every source topic gets its own reader that starts at
//! the latest offset, so records produced before the agent came up are
//! skipped. Reads round-robin across all readers. Writes are buffered per sink
//! topic until `flush`; each flush sends a topic's buffered records to one
//! partition and rotates to the next partition on the following flush.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use h2pc_core::config::MessengerConfig;
use rskafka::client::partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::{Record, RecordAndOffset};
use tracing::{debug, info, warn};

use crate::binary::ByteBackend;
use crate::transport::MessengerError;

const DEFAULT_PARTITION: i32 = 0;
const FETCH_MAX_BYTES: i32 = 1_048_576;
const FETCH_MAX_WAIT_MS: i32 = 500;

type PartitionMap = HashMap<String, Vec<i32>>;

struct TopicReader {
    topic: String,
    partition: i32,
    client: PartitionClient,
    offset: i64,
}

pub struct KafkaBackend {
    client: Option<Client>,
    readers: Vec<TopicReader>,
    next_reader: usize,
    pending_reads: VecDeque<Vec<u8>>,
    sink_topics: Vec<String>,
    sink_partitions: PartitionMap,
    next_write: HashMap<String, usize>,
    writers: HashMap<(String, i32), PartitionClient>,
    pending_writes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl KafkaBackend {
    pub async fn connect(config: &MessengerConfig) -> Result<Self, MessengerError> {
        let mut backend = Self {
            client: None,
            readers: Vec::new(),
            next_reader: 0,
            pending_reads: VecDeque::new(),
            sink_topics: config.topic_sink.clone(),
            sink_partitions: PartitionMap::new(),
            next_write: HashMap::new(),
            writers: HashMap::new(),
            pending_writes: BTreeMap::new(),
        };
        if config.topic_src.is_empty() && config.topic_sink.is_empty() {
            info!(
                event_name = "system.messenger.kafka.idle",
                "no kafka topics configured; skipping broker connection"
            );
            return Ok(backend);
        }

        let mut builder = ClientBuilder::new(config.bootstrap_servers.clone());
        if let Some(client_id) = &config.client_id {
            builder = builder.client_id(client_id.clone());
        }
        let client = builder.build().await.map_err(connect_error)?;

        let partitions: PartitionMap = client
            .list_topics()
            .await
            .map_err(connect_error)?
            .into_iter()
            .map(|topic| (topic.name, topic.partitions.into_iter().collect()))
            .collect();

        for (topic, partition) in reader_targets(&config.topic_src, &partitions)? {
            let partition_client = client
                .partition_client(topic.clone(), partition, UnknownTopicHandling::Error)
                .await
                .map_err(connect_error)?;
            let offset =
                partition_client.get_offset(OffsetAt::Latest).await.map_err(connect_error)?;
            debug!(
                event_name = "system.messenger.kafka.reader_ready",
                topic = %topic,
                partition,
                offset,
                "kafka reader positioned at latest offset"
            );
            backend.readers.push(TopicReader {
                topic,
                partition,
                client: partition_client,
                offset,
            });
        }
        for topic in &config.topic_sink {
            if let Some(known) = partitions.get(topic) {
                backend.sink_partitions.insert(topic.clone(), known.clone());
            }
        }
        if config.group_id.is_some() {
            debug!(
                event_name = "system.messenger.kafka.group_ignored",
                "kafka group offsets are not committed; readers always start at the latest offset"
            );
        }

        info!(
            event_name = "system.messenger.kafka.connected",
            servers = ?config.bootstrap_servers,
            readers = backend.readers.len(),
            "kafka client connected"
        );
        backend.client = Some(client);
        Ok(backend)
    }

    /// Rotates through the sink topic's partitions; unknown topics use partition 0.
    fn next_partition(&mut self, topic: &str) -> i32 {
        let partitions = match self.sink_partitions.get(topic) {
            Some(partitions) if !partitions.is_empty() => partitions.as_slice(),
            _ => return DEFAULT_PARTITION,
        };
        let counter = self.next_write.entry(topic.to_string()).or_default();
        let partition = partitions[*counter % partitions.len()];
        *counter = counter.wrapping_add(1);
        partition
    }

    async fn writer(
        &mut self,
        topic: &str,
        partition: i32,
    ) -> Result<&PartitionClient, MessengerError> {
        let key = (topic.to_string(), partition);
        if !self.writers.contains_key(&key) {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| MessengerError::Flush("kafka client is not connected".to_string()))?;
            let partition_client = client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
                .await
                .map_err(|error| MessengerError::Flush(format!("topic `{topic}`: {error}")))?;
            self.writers.insert(key.clone(), partition_client);
        }
        self.writers
            .get(&key)
            .ok_or_else(|| MessengerError::Flush(format!("no kafka writer for topic `{topic}`")))
    }

    fn release(&mut self) {
        self.readers.clear();
        self.pending_reads.clear();
        self.writers.clear();
        if self.client.take().is_some() {
            info!(event_name = "system.messenger.kafka.closed", "kafka client closed");
        }
    }
}

/// One reader per (topic, partition), in configured topic order.
fn reader_targets(
    topics: &[String],
    partitions: &PartitionMap,
) -> Result<Vec<(String, i32)>, MessengerError> {
    let mut targets = Vec::new();
    for topic in topics {
        let known = partitions
            .get(topic)
            .filter(|known| !known.is_empty())
            .ok_or_else(|| MessengerError::Connect(format!("unknown source topic `{topic}`")))?;
        let mut known = known.clone();
        known.sort_unstable();
        targets.extend(known.into_iter().map(|partition| (topic.clone(), partition)));
    }
    Ok(targets)
}

#[async_trait]
impl ByteBackend for KafkaBackend {
    async fn consume_bytes(&mut self) -> Result<Option<Vec<u8>>, MessengerError> {
        if self.readers.is_empty() {
            return Ok(None);
        }
        loop {
            if let Some(payload) = self.pending_reads.pop_front() {
                return Ok(Some(payload));
            }

            let index = self.next_reader % self.readers.len();
            self.next_reader = index + 1;
            let reader = &mut self.readers[index];
            let (records, _high_watermark) = reader
                .client
                .fetch_records(reader.offset, 1..FETCH_MAX_BYTES, FETCH_MAX_WAIT_MS)
                .await
                .map_err(|error| {
                    MessengerError::Receive(format!(
                        "topic `{}` partition {}: {error}",
                        reader.topic, reader.partition
                    ))
                })?;

            for RecordAndOffset { record, offset } in records {
                // compressed batches may replay records below the requested offset
                if offset < reader.offset {
                    continue;
                }
                reader.offset = offset + 1;
                match record.value {
                    Some(value) => self.pending_reads.push_back(value),
                    None => debug!(
                        event_name = "system.messenger.kafka.tombstone",
                        topic = %reader.topic,
                        partition = reader.partition,
                        offset,
                        "skipping record without value"
                    ),
                }
            }
        }
    }

    async fn produce_bytes(&mut self, payload: &[u8]) -> Result<(), MessengerError> {
        for topic in &self.sink_topics {
            self.pending_writes.entry(topic.clone()).or_default().push(payload.to_vec());
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), MessengerError> {
        let pending = std::mem::take(&mut self.pending_writes);
        for (topic, payloads) in pending {
            let records = payloads
                .into_iter()
                .map(|value| Record {
                    key: None,
                    value: Some(value),
                    headers: BTreeMap::new(),
                    timestamp: Utc::now(),
                })
                .collect::<Vec<_>>();
            let count = records.len();
            let partition = self.next_partition(&topic);
            let writer = self.writer(&topic, partition).await?;
            writer
                .produce(records, Compression::default())
                .await
                .map_err(|error| MessengerError::Flush(format!("topic `{topic}`: {error}")))?;
            debug!(
                event_name = "system.messenger.kafka.flushed",
                topic = %topic,
                partition,
                records = count,
                "kafka records delivered"
            );
        }
        Ok(())
    }

    /// Delivers buffered records before closing; a failed delivery is returned
    /// after the client has been released.
    async fn terminate(&mut self) -> Result<(), MessengerError> {
        let delivered = match self.pending_writes.is_empty() {
            true => Ok(()),
            false => self.flush().await,
        };
        self.pending_writes.clear();
        self.release();
        if let Err(error) = &delivered {
            warn!(
                event_name = "system.messenger.kafka.unflushed",
                error = %error,
                "buffered kafka records were not delivered before close"
            );
        }
        delivered
    }
}

fn connect_error(error: rskafka::client::error::Error) -> MessengerError {
    MessengerError::Connect(error.to_string())
}
