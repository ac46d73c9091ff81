use async_trait::async_trait;
use h2pc_core::config::{ConfigError, MessengerConfig, MessengerKind};
use h2pc_core::errors::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("messenger failed to connect: {0}")]
    Connect(String),
    #[error("messenger read failed: {0}")]
    Receive(String),
    #[error("messenger write failed: {0}")]
    Send(String),
    #[error("messenger flush failed: {0}")]
    Flush(String),
    #[error("messenger shutdown failed: {0}")]
    Disconnect(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("messenger kind `{0}` is not compiled into this build")]
    Unsupported(MessengerKind),
}

/// Source and sink topics (or subjects). An empty side is disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topics {
    pub src: Vec<String>,
    pub sink: Vec<String>,
}

impl Topics {
    pub fn new(src: Vec<String>, sink: Vec<String>) -> Self {
        Self { src, sink }
    }

    pub fn has_src(&self) -> bool {
        !self.src.is_empty()
    }

    pub fn has_sink(&self) -> bool {
        !self.sink.is_empty()
    }
}

impl From<&MessengerConfig> for Topics {
    fn from(config: &MessengerConfig) -> Self {
        Self { src: config.topic_src.clone(), sink: config.topic_sink.clone() }
    }
}

/// Batched consumer/producer over a broker.
///
/// `consume` returns `None` only when the backend signals that no more data is
/// currently available (or the source side is disabled); it is an end-of-batch
/// signal, not end-of-stream.
#[async_trait]
pub trait Messenger<I, O>: Send
where
    I: Send + 'static,
    O: Sync + 'static,
{
    /// Lower bound of a batch collected by [`Messenger::consume_batch`].
    fn src_count_min(&self) -> usize;

    async fn consume(&mut self) -> Result<Option<I>, MessengerError>;

    /// Reads until `src_count_min` items arrived or `consume` yields `None`.
    /// A short batch is legal.
    async fn consume_batch(&mut self) -> Result<Vec<I>, MessengerError> {
        let src_count_min = self.src_count_min();
        let mut inputs = Vec::with_capacity(src_count_min);
        while inputs.len() < src_count_min {
            match self.consume().await? {
                Some(input) => inputs.push(input),
                None => break,
            }
        }
        Ok(inputs)
    }

    /// Writes `data` to every sink topic; no-op when none are configured.
    async fn produce(&mut self, data: &O) -> Result<(), MessengerError>;

    async fn flush(&mut self) -> Result<(), MessengerError>;

    /// Releases every backend resource. Idempotent.
    async fn terminate(&mut self) -> Result<(), MessengerError>;
}

pub type BoxMessenger<I, O> = Box<dyn Messenger<I, O>>;

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::{Messenger, MessengerError, Topics};

    struct QueueMessenger {
        queue: VecDeque<Option<u32>>,
        src_count_min: usize,
        reads: usize,
    }

    impl QueueMessenger {
        fn new(src_count_min: usize, queue: Vec<Option<u32>>) -> Self {
            Self { queue: queue.into(), src_count_min, reads: 0 }
        }
    }

    #[async_trait]
    impl Messenger<u32, u32> for QueueMessenger {
        fn src_count_min(&self) -> usize {
            self.src_count_min
        }

        async fn consume(&mut self) -> Result<Option<u32>, MessengerError> {
            self.reads += 1;
            Ok(self.queue.pop_front().flatten())
        }

        async fn produce(&mut self, _data: &u32) -> Result<(), MessengerError> {
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), MessengerError> {
            Ok(())
        }

        async fn terminate(&mut self) -> Result<(), MessengerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn batch_stops_at_src_count_min_in_arrival_order() {
        let mut messenger = QueueMessenger::new(2, vec![Some(1), Some(2), Some(3)]);

        let batch = messenger.consume_batch().await.expect("batch");

        assert_eq!(batch, vec![1, 2]);
        assert_eq!(messenger.reads, 2, "must not read past the lower bound");
    }

    #[tokio::test]
    async fn batch_is_short_when_end_of_batch_arrives_first() {
        let mut messenger = QueueMessenger::new(5, vec![Some(7), None, Some(8)]);

        let batch = messenger.consume_batch().await.expect("batch");

        assert_eq!(batch, vec![7]);
        assert_eq!(messenger.reads, 2);
    }

    #[tokio::test]
    async fn zero_lower_bound_never_reads() {
        let mut messenger = QueueMessenger::new(0, vec![Some(1)]);

        let batch = messenger.consume_batch().await.expect("batch");

        assert!(batch.is_empty());
        assert_eq!(messenger.reads, 0);
    }

    #[test]
    fn empty_topic_lists_disable_each_side() {
        let topics = Topics::new(vec!["questions".to_string()], Vec::new());
        assert!(topics.has_src());
        assert!(!topics.has_sink());
    }
}
