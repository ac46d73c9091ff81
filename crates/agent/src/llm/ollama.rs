use async_trait::async_trait;
use h2pc_core::domain::message::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, endpoint, ChatMessage, LlmClient, LlmError};

const BACKEND: &str = "ollama";

/// Local Ollama server, `/api/chat` without streaming.
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self { http, url: endpoint(base_url, "api/chat"), model: model.to_string() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_message(self) -> Option<Message> {
        self.message.and_then(|message| message.content).map(Message::assistant)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn completions(&self, inputs: &[Message]) -> Result<Option<Message>, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: inputs.iter().map(ChatMessage::from).collect(),
            stream: false,
        };
        debug!(
            event_name = "agent.llm.request",
            backend = BACKEND,
            model = %self.model,
            messages = inputs.len(),
            "sending chat request"
        );

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|error| LlmError::Transport { backend: BACKEND, message: error.to_string() })?;
        let response = check_status(BACKEND, response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Decode { backend: BACKEND, message: error.to_string() })?;

        Ok(body.into_message())
    }
}

#[cfg(test)]
mod tests {
    use h2pc_core::domain::message::{Message, Role};

    use super::ChatResponse;

    #[test]
    fn reads_assistant_content() {
        let body = r#"{"model":"llama3","message":{"role":"assistant","content":"42"},"done":true}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("response");

        let message = response.into_message().expect("content");
        assert_eq!(message, Message::assistant("42"));
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn missing_message_is_no_content() {
        let response: ChatResponse = serde_json::from_str(r#"{"done":true}"#).expect("response");
        assert_eq!(response.into_message(), None);
    }

    #[test]
    fn empty_content_is_still_a_message() {
        let body = r#"{"message":{"role":"assistant","content":""}}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("response");
        assert_eq!(response.into_message(), Some(Message::assistant("")));
    }
}
