use hubmail_shared::protocol::ErrorResponse;
use hubmail_shared::{CodecError, CryptoError, MessageId, TokenError};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The service could not be reached or the connection broke.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Rejected before reaching the store (bad key, unknown status).
    #[error("Failed precondition: {0}")]
    Validation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Mailbox already exists")]
    MailboxExists,

    /// The recipient received message `id` but the sender's copy was not
    /// stored. Sending again would deliver a duplicate.
    #[error("Message {id} delivered, sentbox copy missing: {message}")]
    PartialSend { id: MessageId, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ClientError {
    /// Map a non-success HTTP status and its `{"error": ...}` message.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::InvalidArgument(message),
            StatusCode::UNAUTHORIZED => Self::Unauthenticated(message),
            StatusCode::FORBIDDEN => Self::Forbidden(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::CONFLICT => Self::MailboxExists,
            StatusCode::PRECONDITION_FAILED => Self::Validation(message),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Self::Connection(format!("{status}: {message}"))
            }
            _ => Self::Server {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Map a non-success HTTP status and its decoded error body.
    pub fn from_response(status: StatusCode, body: ErrorResponse) -> Self {
        match body.id.as_deref().map(MessageId::parse) {
            Some(Ok(id)) if status.is_server_error() => Self::PartialSend {
                id,
                message: body.error,
            },
            _ => Self::from_status(status, body.error),
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::InvalidArgument(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let e = ClientError::from_status(StatusCode::NOT_FOUND, "Message not found".into());
        assert!(matches!(e, ClientError::NotFound(_)));
        assert!(!e.is_connection_error());

        assert!(matches!(
            ClientError::from_status(StatusCode::CONFLICT, String::new()),
            ClientError::MailboxExists
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::PRECONDITION_FAILED, String::new()),
            ClientError::Validation(_)
        ));
        assert!(ClientError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new())
            .is_connection_error());
        assert!(matches!(
            ClientError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            ClientError::Server { status: 500, .. }
        ));
    }

    #[test]
    fn test_partial_send_is_distinct() {
        let id = MessageId::new();
        let e = ClientError::from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse {
                error: "Message delivered but sentbox write failed".into(),
                id: Some(id.to_string()),
            },
        );
        assert!(matches!(&e, ClientError::PartialSend { id: got, .. } if *got == id));
        assert!(!e.is_connection_error());

        // Without an id a 500 stays a plain server error.
        assert!(matches!(
            ClientError::from_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Internal server error".into(),
                    id: None,
                },
            ),
            ClientError::Server { status: 500, .. }
        ));
    }
}
