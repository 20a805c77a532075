use thiserror::Error;

/// Failure classification at the chain-client boundary. Nonce problems
/// are first-class variants so callers never have to scrape message text
/// to recognize them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The chain already consumed this nonce.
    #[error("nonce too low")]
    NonceTooLow,

    /// The nonce is ahead of the account's pending count.
    #[error("nonce too high")]
    NonceTooHigh,

    /// The transaction was included but the call reverted.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// Gave up waiting for inclusion.
    #[error("timed out waiting for confirmation")]
    Timeout,

    /// Transport or node-side failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("{0}")]
    Other(String),
}

impl ChainError {
    /// True for failures that invalidate the locally tracked nonce.
    pub fn is_nonce_error(&self) -> bool {
        matches!(self, ChainError::NonceTooLow | ChainError::NonceTooHigh)
    }
}

/// Errors for parsing domain identifiers out of external input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("unknown swap direction: {0}")]
    UnknownDirection(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_classification() {
        assert!(ChainError::NonceTooLow.is_nonce_error());
        assert!(ChainError::NonceTooHigh.is_nonce_error());
        assert!(!ChainError::Timeout.is_nonce_error());
        assert!(!ChainError::Reverted("STF".to_string()).is_nonce_error());
        assert!(!ChainError::Rpc("connection refused".to_string()).is_nonce_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ChainError::NonceTooLow), "nonce too low");
        assert_eq!(
            format!("{}", ChainError::Reverted("STF".to_string())),
            "transaction reverted: STF"
        );
        assert_eq!(
            format!("{}", CommonError::UnknownDirection("sideways".to_string())),
            "unknown swap direction: sideways"
        );
    }
}
