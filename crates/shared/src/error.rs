use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Network,
    Api,
    Blocked,
    InvalidResponse,
    Configuration,
    Unknown,
}

/// Failure reported by a generative model capability, either while opening
/// the stream or in the middle of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{0}")]
    Network(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("response blocked: {reason}")]
    Blocked { reason: String },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Unknown(String),
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::Network(_) => ErrorCode::Network,
            ModelError::Api { .. } => ErrorCode::Api,
            ModelError::Blocked { .. } => ErrorCode::Blocked,
            ModelError::InvalidResponse(_) => ErrorCode::InvalidResponse,
            ModelError::Configuration(_) => ErrorCode::Configuration,
            ModelError::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Text shown to the user in the error turn.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_shows_server_message_only() {
        let err = ModelError::Api {
            status: 429,
            message: "quota exceeded".into(),
        };
        assert_eq!(err.user_message(), "quota exceeded");
        assert_eq!(err.code(), ErrorCode::Api);
    }

    #[test]
    fn empty_message_falls_back_to_unknown_error() {
        assert_eq!(
            ModelError::Unknown(String::new()).user_message(),
            "Unknown Error"
        );
        assert_eq!(
            ModelError::Network("   ".into()).user_message(),
            "Unknown Error"
        );
    }

    #[test]
    fn blocked_error_mentions_reason() {
        let err = ModelError::Blocked {
            reason: "SAFETY".into(),
        };
        assert_eq!(err.user_message(), "response blocked: SAFETY");
    }
}
