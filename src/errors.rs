use sqlx::migrate::MigrateError;
use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] SqlxError),

    #[error("Migration error: {0}")]
    Migrate(#[from] MigrateError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No {0} available to seed from")]
    EmptyPool(&'static str),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Booking with ID {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Database connection error: {0}")]
    Connection(SqlxError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// SQLITE_PERM, SQLITE_READONLY, SQLITE_AUTH
const ACCESS_DENIED_CODES: [i32; 3] = [3, 8, 23];

impl From<SqlxError> for BootstrapError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                BootstrapError::AccessDenied(io.to_string())
            }
            SqlxError::Database(db)
                if db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| ACCESS_DENIED_CODES.contains(&(code & 0xff))) =>
            {
                BootstrapError::AccessDenied(db.message().to_owned())
            }
            _ => BootstrapError::Connection(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("Worker pool stopped unexpectedly: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_maps_to_access_denied() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only dir");
        let err = BootstrapError::from(SqlxError::Io(io));
        assert!(matches!(err, BootstrapError::AccessDenied(_)));
    }

    #[test]
    fn other_errors_map_to_connection() {
        let err = BootstrapError::from(SqlxError::PoolTimedOut);
        assert!(matches!(err, BootstrapError::Connection(_)));
    }

    #[test]
    fn not_found_message_names_the_reference() {
        let err = NotifyError::NotFound("42".into());
        assert_eq!(err.to_string(), "Booking with ID 42 not found");
    }
}
