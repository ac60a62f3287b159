use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Table creation error: {0}")]
    TableCreation(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Query rejected: {0}")]
    Rejected(String),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
