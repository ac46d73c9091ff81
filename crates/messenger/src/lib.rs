//! Messenger - batched transport between the agent and a message broker
//!
//! This crate provides the transport side of the H2PC agent:
//! - **Contract** (`transport`) - the [`Messenger`] trait with batched consume and
//!   produce/flush/terminate lifecycle
//! - **Byte shape** (`binary`) - [`BinaryMessenger`] over a [`ByteBackend`]; JSON
//!   (de)serialization and disabled-topic handling live here once
//! - **Kafka** (`kafka`, feature `kafka`) - byte backend over `rskafka`
//! - **NATS** (`nats`, feature `nats`) - custom messenger over JetStream with lazy
//!   connection, stream provisioning and durable pull consumers
//!
//! # Architecture
//!
//! ```text
//! MESSENGER_KIND → connect() → Box<dyn Messenger<I, O>>
//!                                 ├─ BinaryMessenger<KafkaBackend>
//!                                 └─ NatsMessenger
//! ```

pub mod binary;
#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "nats")]
pub mod nats;
pub mod transport;

use h2pc_core::config::{MessengerConfig, MessengerKind};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

pub use binary::{BinaryMessenger, ByteBackend};
pub use transport::{BoxMessenger, Messenger, MessengerError, Topics};

/// Builds the messenger selected by `config.kind`.
pub async fn connect<I, O>(config: &MessengerConfig) -> Result<BoxMessenger<I, O>, MessengerError>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Sync + 'static,
{
    let kind = config.kind()?;
    let topics = Topics::from(config);
    info!(
        event_name = "system.messenger.connect",
        messenger_kind = %kind,
        topic_src = ?topics.src,
        topic_sink = ?topics.sink,
        src_count_min = config.src_count_min,
        "building messenger"
    );

    match kind {
        #[cfg(feature = "kafka")]
        MessengerKind::Kafka => {
            let backend = kafka::KafkaBackend::connect(config).await?;
            Ok(Box::new(BinaryMessenger::new(backend, topics, config.src_count_min)))
        }
        #[cfg(feature = "nats")]
        MessengerKind::Nats => Ok(Box::new(nats::NatsMessenger::new(config))),
        #[allow(unreachable_patterns)]
        other => Err(MessengerError::Unsupported(other)),
    }
}
