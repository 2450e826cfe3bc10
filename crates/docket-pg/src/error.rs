//! sqlx → StoreError.

use docket_core::domain::StoreError;

/// SQLSTATEs a retry can get past.
const RETRYABLE_STATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "23505", // unique_violation: lost a check-or-insert race
];

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db
            .code()
            .is_some_and(|code| RETRYABLE_STATES.contains(&&*code))
        {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}
