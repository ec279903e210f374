use thiserror::Error;

/// Result type for Yeelight operations
pub type Result<T> = std::result::Result<T, YeelightError>;

/// Errors that can occur when talking to Yeelight devices
#[derive(Error, Debug)]
pub enum YeelightError {
    /// Announcement or discovery reply could not be turned into a descriptor
    #[error("Invalid device announcement: {0}")]
    InvalidAnnouncement(String),

    /// TCP connection to the device could not be established
    #[error("Failed to connect to device {device}: {source}")]
    Connect {
        /// Device label (`name (id) at host:port`)
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection was closed before a reply arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Too many requests are already waiting for a reply
    #[error("Request queue is full for device {device} ({limit} pending)")]
    QueueFull {
        device: String,
        limit: usize,
    },

    /// Command parameter out of its accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device answered the request with an error object
    #[error("Device error {code}: {message}")]
    Device {
        code: i64,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
