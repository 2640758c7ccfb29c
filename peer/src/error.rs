use crate::config::ConfigError;
use shared::GridError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Map error: {0}")]
    Map(#[from] GridError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type PeerResult<T> = Result<T, PeerError>;
