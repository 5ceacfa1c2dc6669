// sqlx::Error -> AppError
// Busy/locked databases, pool exhaustion and I/O are transient (`Unavailable`);
// everything else is a hard `Database` error.

use courier_core::error::AppError;

// SQLite result codes: https://www.sqlite.org/rescode.html
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_RECOVERY: &str = "261";
const SQLITE_LOCKED_SHAREDCACHE: &str = "262";
const SQLITE_BUSY_SNAPSHOT: &str = "517";
const SQLITE_FULL: &str = "13";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

pub fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(
                code @ (SQLITE_BUSY
                | SQLITE_LOCKED
                | SQLITE_BUSY_RECOVERY
                | SQLITE_LOCKED_SHAREDCACHE
                | SQLITE_BUSY_SNAPSHOT),
            ) => AppError::Unavailable(format!(
                "database locked [{}]: {}",
                code,
                db_err.message()
            )),
            Some(code @ (SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE)) => {
                AppError::Database(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                ))
            }
            Some(SQLITE_FULL) => AppError::Database(format!("Database full: {}", db_err.message())),
            Some(code) => {
                AppError::Database(format!("Database error [{}]: {}", code, db_err.message()))
            }
            None => AppError::Database(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::PoolTimedOut => AppError::Unavailable("connection pool timed out".to_string()),
        sqlx::Error::PoolClosed => AppError::Unavailable("connection pool closed".to_string()),
        sqlx::Error::Io(e) => AppError::Unavailable(format!("I/O error: {}", e)),
        sqlx::Error::WorkerCrashed => {
            AppError::Unavailable("database worker thread crashed".to_string())
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        _ => AppError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(map_sqlx_error(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(err, AppError::Database(_)));
    }
}
