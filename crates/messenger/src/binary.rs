use std::marker::PhantomData;

use async_trait::async_trait;
use h2pc_core::domain::message::{decode, encode};
use serde::{de::DeserializeOwned, Serialize};

use crate::transport::{Messenger, MessengerError, Topics};

/// Raw-byte half of a broker integration.
///
/// The backend owns its topic bindings; [`BinaryMessenger`] only calls
/// `consume_bytes` when a source topic exists and `produce_bytes` when a sink
/// topic exists.
#[async_trait]
pub trait ByteBackend: Send {
    /// `None` signals that no more data is currently available.
    async fn consume_bytes(&mut self) -> Result<Option<Vec<u8>>, MessengerError>;
    async fn produce_bytes(&mut self, payload: &[u8]) -> Result<(), MessengerError>;
    async fn flush(&mut self) -> Result<(), MessengerError>;
    async fn terminate(&mut self) -> Result<(), MessengerError>;
}

/// JSON messenger over any [`ByteBackend`].
pub struct BinaryMessenger<B, I, O> {
    backend: B,
    topics: Topics,
    src_count_min: usize,
    _marker: PhantomData<fn(O) -> I>,
}

impl<B, I, O> BinaryMessenger<B, I, O> {
    pub fn new(backend: B, topics: Topics, src_count_min: usize) -> Self {
        Self { backend, topics, src_count_min, _marker: PhantomData }
    }
}

#[async_trait]
impl<B, I, O> Messenger<I, O> for BinaryMessenger<B, I, O>
where
    B: ByteBackend,
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
        let Some(payload) = self.backend.consume_bytes().await? else {
            return Ok(None);
        };
        Ok(Some(decode(&payload)?))
    }

    async fn produce(&mut self, data: &O) -> Result<(), MessengerError> {
        if !self.topics.has_sink() {
            return Ok(());
        }
        let payload = encode(data)?;
        self.backend.produce_bytes(&payload).await
    }

    async fn flush(&mut self) -> Result<(), MessengerError> {
        self.backend.flush().await
    }

    async fn terminate(&mut self) -> Result<(), MessengerError> {
        self.backend.terminate().await
    }
}
