//! Durable RDBMS mirror. Hot state is authoritative while a batch is being
//! processed; these tables lag it by up to the postgres syncer's interval
//! and are what survives a hot-store flush or a full redeploy.
//!
//! Design:
//!
//! Functions that execute multiple statements take `&mut PgTransaction` to
//! indicate this and to make the whole function succeed or fail together.
//! Functions that execute a single statement take any `impl PgExecutor`.
//! This lets callers decide whether to fold a call into a bigger
//! transaction or run it standalone. `PgTransaction` derefs to
//! `PgConnection`; callers must call `commit` themselves.
//!
//! A useful pattern for tests is to start a transaction at the beginning,
//! use it for every query, and never commit it — it rolls back when
//! dropped, which lets postgres tests run in parallel without a shared
//! `TRUNCATE` step.

pub mod batches;
pub mod dispatch_events;
pub mod recipients;
pub mod send_configs;

pub use sqlx;

use sqlx::{Executor, PgPool};

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// The names of all tables this crate owns.
pub const ALL_TABLES: &[&str] = &["batches", "recipients", "send_configs", "dispatch_events"];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in ALL_TABLES {
        ex.execute(format!("TRUNCATE {table} CASCADE;").as_str())
            .await?;
    }
    Ok(())
}

/// Like above but more ergonomic for tests that hold a pool instead of an
/// open transaction.
#[allow(non_snake_case)]
pub async fn clear_DANGER(pool: &PgPool) -> sqlx::Result<()> {
    let mut transaction = pool.begin().await?;
    clear_DANGER_(&mut transaction).await?;
    transaction.commit().await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_clear() {
        let mut con = PgConnection::connect("postgresql://").await.unwrap();
        let mut con = con.begin().await.unwrap();
        clear_DANGER_(&mut con).await.unwrap();
    }
}
