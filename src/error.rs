use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key for {entity}: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Update references unknown signal: {signal_id}")]
    OrphanUpdate { signal_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Error::DuplicateKey {
            entity,
            key: key.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Maps a write error, turning unique/primary key violations into `DuplicateKey`.
    pub fn from_write(e: DbErr, entity: &'static str, key: impl Into<String>) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Error::duplicate(entity, key),
            _ => Error::Database(format!("Failed to write {}: {}", entity, e)),
        }
    }
}
