// sqlx::Error -> AppError

use tasklane_core::error::AppError;

/// Map a sqlx error into the core taxonomy.
///
/// Contention, I/O and pool exhaustion are `StoreUnavailable` (transient).
/// Constraint violations and decode failures indicate a bug or corrupt data
/// and are `Internal`.
pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            match db_err.code().as_deref() {
                // SQLite error codes: https://www.sqlite.org/rescode.html
                Some(code @ ("2067" | "1555" | "787" | "275" | "1299")) => AppError::Internal(
                    format!("Constraint violation [{}]: {}", code, message),
                ),
                Some("5" | "517" | "261") => {
                    AppError::StoreUnavailable(format!("Database busy: {}", message))
                }
                Some("6" | "262") => {
                    AppError::StoreUnavailable(format!("Database locked: {}", message))
                }
                Some("13") => AppError::StoreUnavailable(format!("Database full: {}", message)),
                Some(code) => {
                    AppError::StoreUnavailable(format!("Database error [{}]: {}", code, message))
                }
                None => AppError::StoreUnavailable(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::PoolTimedOut => {
            AppError::StoreUnavailable("Timed out waiting for a store connection".to_string())
        }
        sqlx::Error::PoolClosed => AppError::StoreUnavailable("Store pool closed".to_string()),
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => AppError::Internal(format!("Row decode failed: {}", err)),
        _ => AppError::StoreUnavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            AppError::StoreUnavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            AppError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_missing_column_is_internal() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::ColumnNotFound("state".into())),
            AppError::Internal(_)
        ));
    }
}
