use thiserror::Error;

/// Failure while converting a value to or from its JSON wire payload.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed wire payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("could not encode wire payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl WireError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::message::{decode, Message};

    #[test]
    fn truncated_payload_reports_malformed_wire_payload() {
        let error = decode::<Message>(br#"{"role":"user","content":"#).expect_err("truncated");

        assert!(error.is_decode());
        assert!(error.to_string().starts_with("malformed wire payload"));
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        let error = decode::<Message>(&[0xff, 0xfe, 0x00]).expect_err("invalid utf-8");
        assert!(error.is_decode());
    }
}
