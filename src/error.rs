use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize/deserialize data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid multiplier range: {lo}..={hi}")]
    InvalidRange { lo: u32, hi: u32 },

    #[error("Invalid fact: {0}")]
    InvalidFact(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown learning level: {0}")]
    UnknownLevel(u32),

    #[error("Planet for table {0} is locked")]
    PlanetLocked(u32),

    #[error("Elapsed time must be finite, got {0}")]
    InvalidElapsed(f64),

    #[error("No question is waiting for an answer")]
    NoActiveQuestion,

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, QuestError>;
