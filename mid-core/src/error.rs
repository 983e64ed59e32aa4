use crate::reading::SensorId;
use thiserror::Error;

/// Main error type for MID hub operations
#[derive(Error, Debug)]
pub enum MidError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Empty reply from hub")]
    EmptyReply,

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Unknown reply kind: {0}")]
    UnknownReplyKind(u8),

    #[error("Reply is not a readings packet (kind {0})")]
    NotReadingsReply(u8),

    #[error("Reply is not an error list packet (kind {0})")]
    NotErrorReply(u8),

    #[error("Reply command mismatch: sent {sent}, received {received}")]
    ReplyCommandMismatch { sent: u8, received: u8 },

    #[error("Reply address count mismatch: sent {sent}, received {received}")]
    ReplyAddressCountMismatch { sent: usize, received: usize },

    #[error("Reply size mismatch: expected {expected}, declared {declared}")]
    ReplySize { expected: usize, declared: usize },

    #[error("Reply parse error: {0}")]
    ReplyParse(String),

    #[error("Unparsable reply: {0}")]
    UnparsableReply(String),

    #[error("Formula evaluation error in '{formula}': {cause}")]
    FormulaEvaluation { formula: String, cause: String },

    #[error("Engineering conversion failed for sensor {sensor_id}: {cause}")]
    EngineeringConversion { sensor_id: SensorId, cause: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MidError {
    /// Errors raised while moving bytes: the hub never produced a usable reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MidError::Connection(_) | MidError::Timeout | MidError::EmptyReply
        )
    }

    /// Errors raised while matching a reply packet against the command that was sent.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            MidError::UnknownReplyKind(_)
                | MidError::ReplyCommandMismatch { .. }
                | MidError::ReplyAddressCountMismatch { .. }
                | MidError::ReplySize { .. }
                | MidError::ReplyParse(_)
                | MidError::UnparsableReply(_)
        )
    }
}

/// Result type alias for MID operations
pub type MidResult<T> = Result<T, MidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MidError::Timeout.is_transport());
        assert!(MidError::EmptyReply.is_transport());
        assert!(!MidError::Timeout.is_framing());

        let mismatch = MidError::ReplyCommandMismatch { sent: 1, received: 2 };
        assert!(mismatch.is_framing());
        assert!(!mismatch.is_transport());

        let formula = MidError::FormulaEvaluation {
            formula: "log(x)".to_string(),
            cause: "domain".to_string(),
        };
        assert!(!formula.is_framing());
        assert!(!formula.is_transport());
    }
}
