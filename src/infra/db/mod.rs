//! Document store backends.

mod memory;
mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

use crate::application::StoreError;

/// Translate driver errors into store errors. Postgres reports the
/// interesting failures through message text, so match on that the
/// same way psql users read them.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            StoreError::UniqueViolation {
                field: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates foreign key constraint")
                || db.message().contains("invalid input syntax") =>
        {
            StoreError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            StoreError::Timeout
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::from_persistence(other),
    }
}
