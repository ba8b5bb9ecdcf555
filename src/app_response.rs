use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Outcome envelope shared by the storage layer and the FFI surface.
///
/// Storage operations use it as their error type; FFI functions serialize it
/// to JSON and hand it back to the host, with `Ok` carrying the JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum AppResponse {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Ok: {0}")]
    Ok(String),
}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key not found".to_string()),
            LmdbError::Corrupted => {
                AppResponse::DatabaseError("Database is corrupted".to_string())
            }
            LmdbError::MapFull => AppResponse::DatabaseError(
                "Database map is full; raise mapSizeMb".to_string(),
            ),
            _ => AppResponse::DatabaseError(format!("LMDB error: {err}")),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {err}"))
    }
}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::DatabaseError(format!("IO error: {err}"))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
