use async_trait::async_trait;
use h2pc_core::domain::message::Message;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, endpoint, ChatMessage, LlmClient, LlmError};

const BACKEND: &str = "openai";

/// OpenAI-compatible `/chat/completions` endpoint.
///
/// The API key only leaves its [`SecretString`] when the bearer header is built.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: SecretString, base_url: &str, model: &str) -> Self {
        Self { http, api_key, url: endpoint(base_url, "chat/completions"), model: model.to_string() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_message(self) -> Option<Message> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(Message::assistant)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn completions(&self, inputs: &[Message]) -> Result<Option<Message>, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: inputs.iter().map(ChatMessage::from).collect(),
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
            .bearer_auth(self.api_key.expose_secret())
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
    use h2pc_core::domain::message::Message;

    use super::ChatResponse;

    #[test]
    fn first_choice_wins() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 1, "message": {"role": "assistant", "content": "second"}}
            ]
        }"#;
        let response: ChatResponse = serde_json::from_str(body).expect("response");

        assert_eq!(response.into_message(), Some(Message::assistant("first")));
    }

    #[test]
    fn null_content_is_no_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).expect("response");

        assert_eq!(response.into_message(), None);
    }

    #[test]
    fn empty_choices_is_no_content() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).expect("response");
        assert_eq!(response.into_message(), None);

        let response: ChatResponse = serde_json::from_str("{}").expect("response");
        assert_eq!(response.into_message(), None);
    }
}
