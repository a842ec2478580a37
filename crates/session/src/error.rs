use {courier_common::SessionStatus, thiserror::Error};

/// Why an outbound send was not accepted.
///
/// Transport and timeout errors are retryable and do not, by themselves,
/// change the session state; the supervisor only transitions when the
/// provider signals connection loss.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("recipient must not be empty")]
    InvalidRecipient,

    #[error("message body must not be empty")]
    EmptyBody,

    #[error("session is {status}, not connected")]
    NotConnected { status: SessionStatus },

    #[error("send timed out")]
    Timeout,

    #[error("transport error: {reason}")]
    Transport { reason: String },
}

impl SendError {
    /// Validation errors must never be retried; everything else may be.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRecipient | Self::EmptyBody)
    }
}
