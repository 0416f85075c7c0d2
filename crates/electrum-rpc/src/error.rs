use thiserror::Error;

/// Electrum client errors.
#[derive(Debug, Error)]
pub enum ElectrumError {
    /// Error object reported by the server for a request.
    #[error("electrum protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// The socket died while the request was in flight. The next call
    /// reconnects automatically, up to the configured retry budget.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connect deadline elapsed before the handshake completed.
    #[error("connect timed out")]
    Timeout,

    /// The client was closed; a fresh instance is required.
    #[error("client is closed")]
    Closed,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for ElectrumError {
    fn from(e: serde_json::Error) -> Self {
        ElectrumError::InvalidResponse(e.to_string())
    }
}
