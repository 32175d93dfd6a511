use thiserror::Error;

/// Result alias that carries [`TapeError`].
pub type Result<T> = std::result::Result<T, TapeError>;

#[derive(Debug, Error)]
pub enum TapeError {
    /// Track or channel index outside the current track list
    #[error("Track index {index} out of range (have {len} tracks)")]
    InvalidIndex { index: usize, len: usize },

    /// Lazily growing the track list would pass the configured limit
    #[error("Track index {index} exceeds the track limit of {max}")]
    TrackLimit { index: usize, max: usize },

    /// A time range that cannot be honoured (negative, inverted, non-finite)
    #[error("Malformed range: {0}")]
    MalformedRange(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A command queue into the real-time context was full
    #[error("{0} queue is full")]
    QueueFull(&'static str),

    /// Audio device or stream failure
    #[error("Audio device error: {0}")]
    Audio(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),
}

impl TapeError {
    pub fn range<T: Into<String>>(msg: T) -> Self {
        Self::MalformedRange(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_index_message_names_both_values() {
        let err = TapeError::InvalidIndex { index: 7, len: 2 };
        assert_eq!(err.to_string(), "Track index 7 out of range (have 2 tracks)");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TapeError = io.into();
        assert!(matches!(err, TapeError::Io(_)));
    }
}
