use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("line {line}: malformed frame record: {source}")]
    MalformedFrame {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {reason}")]
    InvalidFrame { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
