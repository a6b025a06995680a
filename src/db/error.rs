use sqlx::error::ErrorKind;
use thiserror::Error;

/// sqlx failures sorted into the cases the store adapter cares about.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("Check constraint violated: {constraint}")]
    CheckViolation { constraint: String },

    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),
}

impl DatabaseError {
    /// Name of the violated constraint, when the failure was a constraint violation.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            DatabaseError::UniqueViolation { constraint }
            | DatabaseError::ForeignKeyViolation { constraint }
            | DatabaseError::CheckViolation { constraint } => Some(constraint),
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, DatabaseError::ConnectionError(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => DatabaseError::UniqueViolation { constraint },
                    ErrorKind::ForeignKeyViolation => DatabaseError::ForeignKeyViolation { constraint },
                    ErrorKind::CheckViolation => DatabaseError::CheckViolation { constraint },
                    _ => DatabaseError::Sqlx(err),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DatabaseError::ConnectionError(err.to_string()),
            _ => DatabaseError::Sqlx(err),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationError(err.to_string())
    }
}
