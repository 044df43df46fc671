use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    db::Store,
    errors::{BootstrapError, StoreError},
};

/// Creates the database if it is missing. Returns whether it was created.
pub async fn ensure_database(database_url: &str) -> Result<bool, BootstrapError> {
    if Sqlite::database_exists(database_url).await? {
        log::info!("Database '{}' already exists.", database_url);
        return Ok(false);
    }

    log::info!("Creating database '{}'...", database_url);
    Sqlite::create_database(database_url).await?;
    log::info!("Database '{}' created successfully!", database_url);
    Ok(true)
}

/// Ensure the database exists, connect, and bring the schema up to date.
pub async fn prepare(database_url: &str) -> Result<Store, BootstrapError> {
    ensure_database(database_url).await?;
    Store::connect(database_url).await.map_err(|e| match e {
        StoreError::Sqlx(sqlx_err) => BootstrapError::from(sqlx_err),
        other => BootstrapError::Store(other),
    })
}

/// Operator-facing wording for a bootstrap failure.
pub fn describe(err: &BootstrapError) -> String {
    match err {
        BootstrapError::AccessDenied(_) => {
            format!("{} (check file permissions for the database path)", err)
        }
        BootstrapError::Connection(e) => format!("Database error: {}", e),
        BootstrapError::Store(e) => format!("Unexpected error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_the_database_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("travel.db").display());

        assert!(ensure_database(&url).await.unwrap());
        assert!(!ensure_database(&url).await.unwrap());
    }

    #[tokio::test]
    async fn prepare_leaves_a_migrated_store() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("travel.db").display());

        let store = prepare(&url).await.unwrap();
        assert_eq!(store.count_users().await.unwrap(), 0);
        assert_eq!(store.count_bookings().await.unwrap(), 0);
        store.close().await;
    }

    #[test]
    fn access_denied_gets_an_operator_hint() {
        let err = BootstrapError::AccessDenied("attempt to write a readonly database".into());
        assert!(describe(&err).contains("check file permissions"));
    }
}
