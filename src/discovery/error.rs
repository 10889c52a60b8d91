//! Error handling for device discovery.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to run '{command}': {source}")]
    CommandFailed {
        command: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
