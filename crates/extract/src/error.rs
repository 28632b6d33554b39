use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] crate::archive::ArchiveError),

    #[error("Exclusion rules error: {0}")]
    ExclusionError(#[from] crate::exclusions::ExclusionError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Another run holds the corpus lock {}", .0.display())]
    Locked(std::path::PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}
