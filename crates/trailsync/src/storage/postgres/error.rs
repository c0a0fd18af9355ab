//! Postgres error mapping.
//!
//! Maps `sqlx::Error` to `RepositoryError` from `trailsync_core::storage`.

use trailsync_core::storage::RepositoryError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps a sqlx error to a RepositoryError.
///
/// # Error Mapping
///
/// - unique violation → `RepositoryError::AlreadyExists`
/// - foreign key violation → `RepositoryError::InvalidData`
/// - pool and I/O errors → `RepositoryError::ConnectionFailed`
/// - decode errors → `RepositoryError::Serialization`
/// - All other errors → `RepositoryError::QueryFailed`
pub fn map_sqlx_error(err: sqlx::Error, entity_type: &'static str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            RepositoryError::AlreadyExists {
                entity_type,
                id: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            RepositoryError::InvalidData(format!(
                "Foreign key constraint violation for {entity_type}"
            ))
        }
        sqlx::Error::RowNotFound => RepositoryError::NotFound {
            entity_type,
            id: "unknown".to_string(),
        },
        sqlx::Error::PoolTimedOut => RepositoryError::Timeout(0),
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            RepositoryError::ConnectionFailed(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Serialization(err.to_string())
        }
        _ => RepositoryError::QueryFailed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound, "Activity"),
            RepositoryError::NotFound {
                entity_type: "Activity",
                ..
            }
        ));
    }

    #[test]
    fn pool_closed_is_a_connection_failure() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed, "User"),
            RepositoryError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn protocol_errors_are_query_failures() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::Protocol("oops".to_string()), "User"),
            RepositoryError::QueryFailed(_)
        ));
    }
}
