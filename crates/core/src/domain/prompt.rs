use serde::{Deserialize, Serialize};

use crate::domain::message::Message;

/// How the agent interprets a completion produced from a [`PromptTemplate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Select one message of the consumed batch by its 1-based position.
    Index,
    /// Synthesize a new assistant message from the completion text.
    #[default]
    Message,
}

/// A rendered prompt: the messages sent to the completion backend and the
/// operator used to interpret the answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub operator: Operator,
    pub inputs: Vec<Message>,
}
