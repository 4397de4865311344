use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the mirror subsystem
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source repository unreachable: {}", .0.display())]
    SourceUnreachable(PathBuf),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Sync was aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, MirrorError>;
