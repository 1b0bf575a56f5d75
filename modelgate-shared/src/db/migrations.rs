//! Schema migrations.
//!
//! SQL files live in `migrations/` at the workspace root as
//! `{timestamp}_{name}.up.sql` / `{timestamp}_{name}.down.sql` pairs and are
//! embedded into the binary at compile time.

use sqlx::{migrate::Migrator, postgres::PgPool};
use tracing::{info, warn};

/// Embedded migration set, shared by the server binary and the test harness.
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Applies every pending migration.
///
/// # Errors
///
/// Returns the migrator's error if a migration fails or the applied history
/// no longer matches the embedded files.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!(
        available = MIGRATOR.iter().count(),
        "Running database migrations"
    );

    MIGRATOR.run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        e
    })?;

    info!("Database schema is up to date");
    Ok(())
}
