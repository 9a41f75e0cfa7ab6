use thiserror::Error;

#[derive(Error, Debug)]
pub enum WiremapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Composition root not found: {0}")]
    RootNotFound(String),

    #[error("Graph contains a cycle")]
    CycleDetected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

pub type Result<T> = std::result::Result<T, WiremapError>;
