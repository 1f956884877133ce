//! Error types for the sigflow-db crate.

use thiserror::Error;

/// Database operation errors.
///
/// Model methods return `sqlx::Error` directly; this type covers pool setup
/// and migrations, where the caller needs to know which phase failed.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}
