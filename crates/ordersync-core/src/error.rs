use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every failure the sync pipeline can surface. It uses
/// `thiserror` for ergonomic conversion from underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use ordersync_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all SQLx errors: connection failures, query errors and
    /// constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed before a channel response was received.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The channel API answered with a non-success status.
    ///
    /// `payload` is the raw response body as returned by the channel, kept
    /// verbatim so operators can see the channel's own error description.
    #[error("Channel error (HTTP {status}): {payload}")]
    ChannelError { status: u16, payload: String },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The requested sync window is malformed or inverted.
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// No inventory snapshot exists yet for a SKU.
    #[error("Inventory record not found: {0}")]
    InventoryNotFound(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI and HTTP output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The channel API may be slow or unreachable.".to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to channel API: {}\n   Check your internet connection.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::ChannelError { status, payload } => match status {
                401 => format!(
                    "Channel rejected the access token.\n   Refresh CAFE24_ACCESS_TOKEN. ({})",
                    payload
                ),
                403 => format!(
                    "Access token lacks the order read scope. ({})",
                    payload
                ),
                _ => format!("Channel API error (HTTP {}): {}", status, payload),
            },
            AppError::InvalidDateRange(msg) => {
                format!("Invalid date range: {}\n   Use YYYY-MM-DD.", msg)
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The channel may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordersync_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::InventoryNotFound("SH-001".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::ChannelError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
