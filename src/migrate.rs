use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::accounts;
use crate::config::Config;

/// Creates the accounts schema and seeds the privileged account.
///
/// Idempotent: an existing seed row is left untouched, so changing the seed
/// password later has no effect on an initialized database.
pub async fn run_migrations(pool: &SqlitePool, config: &Config) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let seed = &config.admin.seed_username;
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(seed)
        .fetch_one(pool)
        .await?;

    if existing == 0 {
        let Some(password) = config.admin.seed_password() else {
            bail!(
                "no seed password: set SALESDESK_ADMIN_PASSWORD or admin.seed_password to create '{}'",
                seed
            );
        };
        let hash = accounts::hash_password(&password)?;
        sqlx::query("INSERT OR IGNORE INTO users (username, password) VALUES (?, ?)")
            .bind(seed)
            .bind(hash)
            .execute(pool)
            .await?;
        tracing::info!(username = %seed, "seeded privileged account");
    }

    Ok(())
}
