//! SQLite pool bootstrap and schema migrations.
//!
//! Every connection handed out by the pool has `foreign_keys` enabled and a
//! busy timeout set, and the pool is only returned once migrations succeed.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// Database connection pool type
pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Builds the connection pool and applies pending migrations.
pub fn init_pool(database_url: &str, max_size: u32, busy_timeout: Duration) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionPragmas { busy_timeout }))
        .build(manager)
        .with_context(|| format!("failed to create connection pool for `{database_url}`"))?;
    info!("connection pool ready (database={database_url}, max_size={max_size})");

    run_migrations(&pool)?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut pooled = pool.get().context("failed to check out connection for migrations")?;
    let conn: &mut SqliteConnection = &mut pooled;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow!("failed to apply migrations: {err}"))?;
    for version in &applied {
        info!("applied migration {version}");
    }
    Ok(())
}
