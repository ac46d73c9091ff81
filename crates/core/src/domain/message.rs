use serde::{Deserialize, Serialize};

use crate::errors::WireError;

/// The role of a message's author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged content unit. One message travels per transport record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Optional name of the participant.
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, name: None, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Encodes a value as a UTF-8 JSON wire payload.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, WireError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).map_err(WireError::Encode)
}

/// Decodes a UTF-8 JSON wire payload.
pub fn decode<T>(payload: &[u8]) -> Result<T, WireError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(payload).map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, Message, Role};
    use crate::errors::WireError;

    #[test]
    fn wire_round_trip_preserves_role_name_and_content() {
        let original = Message::user("what is the plan?").with_name("alice");

        let payload = encode(&original).expect("encode");
        let decoded: Message = decode(&payload).expect("decode");

        assert_eq!(decoded.role, Role::User);
        assert_eq!(decoded.name.as_deref(), Some("alice"));
        assert_eq!(decoded.content, "what is the plan?");
    }

    #[test]
    fn name_is_optional_on_the_wire() {
        let decoded: Message =
            decode(br#"{"role":"system","content":"be brief"}"#).expect("decode without name");

        assert_eq!(decoded, Message::system("be brief"));
    }

    #[test]
    fn encodes_lowercase_roles() {
        let payload = encode(&Message::assistant("ok")).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "ok");
        assert!(value["name"].is_null());
    }

    #[test]
    fn unknown_role_is_a_decode_error() {
        let error = decode::<Message>(br#"{"role":"tool","content":"x"}"#)
            .expect_err("tool role is not part of the wire format");
        assert!(matches!(error, WireError::Decode(_)));
    }

    #[test]
    fn missing_content_is_a_decode_error() {
        let error = decode::<Message>(br#"{"role":"user"}"#).expect_err("content is required");
        assert!(matches!(error, WireError::Decode(_)));
    }
}
