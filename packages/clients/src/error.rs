use thiserror::Error;

/// Error type shared by every upstream client in this crate.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream api error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected upstream response: {0}")]
    UnexpectedResponse(String),

    #[error("download exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("client configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {seconds}s")]
    DeadlineExceeded { operation: String, seconds: u64 },
}

impl ClientError {
    /// Whether another attempt at the same call could plausibly succeed.
    ///
    /// Transport hiccups, throttling and server-side errors are worth
    /// retrying. Bad input, bad configuration and oversized downloads are
    /// not, and neither is an application-level rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(err) => !err.is_builder(),
            ClientError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ClientError::Decode(_) | ClientError::UnexpectedResponse(_) => true,
            ClientError::Api { .. }
            | ClientError::TooLarge { .. }
            | ClientError::InvalidInput(_)
            | ClientError::Config(_)
            | ClientError::DeadlineExceeded { .. } => false,
        }
    }
}

const MAX_ERROR_BODY: usize = 2048;

/// Turns a non-2xx response into [`ClientError::Status`], keeping a bounded
/// slice of the body for diagnostics.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
