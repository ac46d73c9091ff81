//! NATS JetStream messenger.
//!
//! Connection is opened on first use. When sink subjects are configured a
//! stream named after the group id is provisioned over them; the first
//! `consume` binds a durable pull consumer (durable name = group id) to the
//! stream that already carries the first source subject.

use std::marker::PhantomData;

use async_nats::jetstream::{self, consumer::pull, consumer::PullConsumer, stream};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use h2pc_core::config::MessengerConfig;
use h2pc_core::domain::message::{decode, encode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::transport::{Messenger, MessengerError, Topics};

type Deliveries = BoxStream<'static, Result<jetstream::Message, String>>;

/// Owned connection inputs; opening a connection never borrows the messenger.
struct ConnectSettings {
    servers: String,
    client_name: Option<String>,
    stream: Option<(String, Vec<String>)>,
}

struct NatsConnection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

pub struct NatsMessenger<I, O> {
    servers: Vec<String>,
    client_name: Option<String>,
    group_id: Option<String>,
    topics: Topics,
    src_count_min: usize,
    connection: Option<NatsConnection>,
    deliveries: Option<Deliveries>,
    _marker: PhantomData<fn(O) -> I>,
}

impl<I, O> NatsMessenger<I, O> {
    pub fn new(config: &MessengerConfig) -> Self {
        Self {
            servers: config.bootstrap_servers.clone(),
            client_name: config.client_id.clone(),
            group_id: config.group_id.clone(),
            topics: Topics::from(config),
            src_count_min: config.src_count_min,
            connection: None,
            deliveries: None,
            _marker: PhantomData,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn group_id(&self) -> Result<String, MessengerError> {
        self.group_id
            .clone()
            .filter(|group_id| !group_id.trim().is_empty())
            .ok_or_else(|| MessengerError::Connect("nats requires messenger.group_id".to_string()))
    }

    fn settings(&self) -> Result<ConnectSettings, MessengerError> {
        let stream = match self.topics.has_sink() {
            true => Some((self.group_id()?, self.topics.sink.clone())),
            false => None,
        };
        Ok(ConnectSettings {
            servers: self.servers.join(","),
            client_name: self.client_name.clone(),
            stream,
        })
    }

    async fn jetstream(&mut self) -> Result<&jetstream::Context, MessengerError> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => Self::open(self.settings()?).await?,
        };
        let connection = self.connection.insert(connection);
        Ok(&connection.jetstream)
    }

    async fn open(settings: ConnectSettings) -> Result<NatsConnection, MessengerError> {
        let ConnectSettings { servers, client_name, stream } = settings;
        let mut options = ConnectOptions::new();
        if let Some(name) = client_name {
            options = options.name(name);
        }
        let client = options
            .connect(servers.as_str())
            .await
            .map_err(|error| MessengerError::Connect(error.to_string()))?;
        let jetstream = jetstream::new(client.clone());

        if let Some((name, subjects)) = stream {
            jetstream
                .get_or_create_stream(stream::Config {
                    name: name.clone(),
                    subjects: subjects.clone(),
                    ..Default::default()
                })
                .await
                .map_err(|error| MessengerError::Connect(format!("stream `{name}`: {error}")))?;
            debug!(
                event_name = "system.messenger.nats.stream_ready",
                stream = %name,
                subjects = ?subjects,
                "jetstream stream provisioned"
            );
        }

        info!(
            event_name = "system.messenger.nats.connected",
            servers = %servers,
            "nats client connected"
        );
        Ok(NatsConnection { client, jetstream })
    }

    async fn subscribe(&mut self) -> Result<Deliveries, MessengerError> {
        let Some(subject) = self.topics.src.first().cloned() else {
            return Err(MessengerError::Connect("nats has no source subject".to_string()));
        };
        if self.topics.src.len() > 1 {
            warn!(
                event_name = "system.messenger.nats.extra_subjects",
                subject = %subject,
                ignored = ?&self.topics.src[1..],
                "nats consumes only the first source subject"
            );
        }
        let durable = self.group_id()?;
        let jetstream = self.jetstream().await?;

        let stream_name = jetstream
            .stream_by_subject(subject.clone())
            .await
            .map_err(|error| MessengerError::Connect(format!("subject `{subject}`: {error}")))?;
        let stream = jetstream
            .get_stream(stream_name.clone())
            .await
            .map_err(|error| MessengerError::Connect(format!("stream `{stream_name}`: {error}")))?;
        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: subject.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|error| MessengerError::Connect(format!("consumer `{durable}`: {error}")))?;
        let messages = consumer
            .messages()
            .await
            .map_err(|error| MessengerError::Connect(format!("consumer `{durable}`: {error}")))?;

        info!(
            event_name = "system.messenger.nats.subscribed",
            subject = %subject,
            stream = %stream_name,
            durable = %durable,
            "nats pull consumer bound"
        );
        Ok(messages.map(|delivery| delivery.map_err(|error| error.to_string())).boxed())
    }
}

#[async_trait]
impl<I, O> Messenger<I, O> for NatsMessenger<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Sync + 'static,
{
    fn src_count_min(&self) -> usize {
        self.src_count_min
    }

    async fn consume(&mut self) -> Result<Option<I>, MessengerError> {
        if !self.topics.has_src() {
            return Ok(None);
        }
        if self.deliveries.is_none() {
            let deliveries = self.subscribe().await?;
            self.deliveries = Some(deliveries);
        }
        let Some(deliveries) = self.deliveries.as_mut() else {
            return Ok(None);
        };
        let Some(delivery) = deliveries.next().await else {
            return Ok(None);
        };

        let message = delivery.map_err(MessengerError::Receive)?;
        message.ack().await.map_err(|error| MessengerError::Receive(error.to_string()))?;
        Ok(Some(decode(&message.payload)?))
    }

    async fn produce(&mut self, data: &O) -> Result<(), MessengerError> {
        if !self.topics.has_sink() {
            return Ok(());
        }
        let payload = encode(data)?;
        let subjects = self.topics.sink.clone();
        let jetstream = self.jetstream().await?;

        for subject in subjects {
            let ack = jetstream
                .publish(subject.clone(), payload.clone().into())
                .await
                .map_err(|error| MessengerError::Send(format!("subject `{subject}`: {error}")))?;
            ack.await
                .map_err(|error| MessengerError::Send(format!("subject `{subject}`: {error}")))?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), MessengerError> {
        match self.connection.as_mut() {
            Some(connection) => connection
                .client
                .flush()
                .await
                .map_err(|error| MessengerError::Flush(error.to_string())),
            None => Ok(()),
        }
    }

    async fn terminate(&mut self) -> Result<(), MessengerError> {
        if self.deliveries.take().is_some() {
            debug!(event_name = "system.messenger.nats.unsubscribed", "nats subscription dropped");
        }
        if self.connection.take().is_some() {
            info!(event_name = "system.messenger.nats.closed", "nats connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use h2pc_core::config::{AppConfig, MessengerConfig};
    use h2pc_core::domain::message::Message;

    use super::NatsMessenger;
    use crate::transport::{BoxMessenger, Messenger};

    fn config(src: &[&str], sink: &[&str]) -> MessengerConfig {
        let mut config = AppConfig::default().messenger;
        config.bootstrap_servers = vec!["nats://127.0.0.1:4222".to_string()];
        config.group_id = Some("agents".to_string());
        config.topic_src = src.iter().map(|subject| subject.to_string()).collect();
        config.topic_sink = sink.iter().map(|subject| subject.to_string()).collect();
        config
    }

    #[tokio::test]
    async fn construction_does_not_connect() {
        let messenger: NatsMessenger<Message, Message> =
            NatsMessenger::new(&config(&["questions"], &["answers"]));

        assert!(!messenger.is_connected());
    }

    #[tokio::test]
    async fn disabled_topics_never_open_a_connection() {
        let mut messenger: NatsMessenger<Message, Message> = NatsMessenger::new(&config(&[], &[]));

        assert_eq!(messenger.consume_batch().await.expect("batch"), Vec::<Message>::new());
        messenger.produce(&Message::assistant("dropped")).await.expect("produce");
        messenger.flush().await.expect("flush");

        assert!(!messenger.is_connected());
    }

    #[tokio::test]
    async fn terminate_before_first_use_is_idempotent() {
        let mut messenger: NatsMessenger<Message, Message> =
            NatsMessenger::new(&config(&["questions"], &["answers"]));

        messenger.terminate().await.expect("first terminate");
        messenger.terminate().await.expect("second terminate");
        assert!(!messenger.is_connected());
    }

    #[tokio::test]
    async fn boxed_messenger_futures_run_on_spawned_tasks() {
        let mut messenger: BoxMessenger<Message, Message> =
            Box::new(NatsMessenger::new(&config(&[], &["answers"])));

        // spawn requires every trait future to be Send
        let handle = tokio::spawn(async move {
            messenger.flush().await?;
            messenger.terminate().await?;
            messenger.consume().await
        });

        let consumed = handle.await.expect("task").expect("consume");
        assert_eq!(consumed, None);
    }

    #[test]
    fn missing_group_id_blocks_stream_provisioning() {
        let mut sink_only = config(&[], &["answers"]);
        sink_only.group_id = None;
        let messenger: NatsMessenger<Message, Message> = NatsMessenger::new(&sink_only);
        assert!(messenger.settings().is_err());

        let source_only: NatsMessenger<Message, Message> =
            NatsMessenger::new(&config(&["questions"], &[]));
        let settings = source_only.settings().expect("settings");
        assert_eq!(settings.servers, "nats://127.0.0.1:4222");
        assert!(settings.stream.is_none());
    }
}
