//! Error types for the license gateway.
//!
//! Every fallible operation in the crate returns [`GatewayResult`]. The
//! orchestrator turns most of these into a failed [`CheckVerdict`] rather
//! than propagating them, and the HTTP layer maps the rest to status codes.
//!
//! [`CheckVerdict`]: crate::orchestrator::CheckVerdict

use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote license API could not be reached or timed out.
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a body that is not the expected JSON.
    #[error("invalid response: {0}")]
    ResponseFormat(String),

    /// The remote explicitly refused the operation.
    #[error("{0}")]
    RemoteBusiness(String),

    /// The stored instance record exists but cannot be decrypted.
    #[error("local state error: {0}")]
    LocalState(String),

    /// A license record is already present on this machine.
    #[error("license already activated on this machine")]
    AlreadyActivated,

    #[error("no stored instance to deactivate")]
    NoStoredInstance,

    #[error("no stored license found")]
    NotFound,

    /// A stored record exists but cannot be parsed.
    #[error("stored record is malformed: {0}")]
    Format(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<CryptoError> for GatewayError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidFormat(msg) => GatewayError::LocalState(msg),
            CryptoError::Encryption(msg) => GatewayError::Encryption(msg),
        }
    }
}

impl GatewayError {
    /// Wrap a transport failure with the operation it interrupted.
    pub fn transport(context: &'static str, source: reqwest::Error) -> Self {
        GatewayError::Transport { context, source }
    }

    /// Errors caused by the remote service or the network, as opposed to
    /// local state on this machine.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. }
                | GatewayError::ResponseFormat(_)
                | GatewayError::RemoteBusiness(_)
        )
    }
}
