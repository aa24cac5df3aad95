use thiserror::Error;

use crate::cluster::FetchError;
use crate::config::ConfigError;
use crate::diagnostics::{DiagnoseError, WatchError};

/// Top-level error for the binary and its command handlers.
#[derive(Error, Debug)]
pub enum KubeDiagError {
    #[error("Cluster access error: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Diagnose(#[from] DiagnoseError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("Output error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeDiagError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, KubeDiagError>;
