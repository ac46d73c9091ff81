//! Completion backends.
//!
//! A backend turns the rendered prompt inputs into at most one assistant
//! message. `Ok(None)` means the backend answered without usable content; every
//! transport, auth or decode failure is an error and is never retried here.

mod ollama;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use h2pc_core::config::LlmBackend;
use h2pc_core::domain::message::{Message, Role};
use serde::Serialize;
use thiserror::Error;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("could not build http client: {0}")]
    Client(String),
    #[error("{backend} request failed: {message}")]
    Transport { backend: &'static str, message: String },
    #[error("{backend} rejected the credentials (HTTP {status})")]
    Authentication { backend: &'static str, status: u16 },
    #[error("{backend} returned HTTP {status}: {body}")]
    Status { backend: &'static str, status: u16, body: String },
    #[error("{backend} response could not be decoded: {message}")]
    Decode { backend: &'static str, message: String },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn completions(&self, inputs: &[Message]) -> Result<Option<Message>, LlmError>;
}

/// Builds the client for the backend selected by configuration.
pub fn build_llm(backend: &LlmBackend, timeout: Duration) -> Result<Arc<dyn LlmClient>, LlmError> {
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| LlmError::Client(error.to_string()))?;

    let client: Arc<dyn LlmClient> = match backend {
        LlmBackend::Ollama { base_url, model_name } => {
            Arc::new(OllamaClient::new(http, base_url, model_name))
        }
        LlmBackend::OpenAi { api_key, base_url, model_name } => {
            Arc::new(OpenAiClient::new(http, api_key.clone(), base_url, model_name))
        }
    };
    Ok(client)
}

/// Chat message as both HTTP APIs accept it.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    content: &'a str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self { role: message.role, name: message.name.as_deref(), content: &message.content }
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn check_status(
    backend: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => LlmError::Authentication { backend, status: status.as_u16() },
        code => LlmError::Status { backend, status: code, body },
    })
}
