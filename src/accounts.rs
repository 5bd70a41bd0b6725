//! Admin-panel accounts backed by the SQLite `users` table.
//!
//! Passwords are stored as Argon2 PHC strings (salt embedded). The seed
//! account created by [`crate::migrate`] is the only privileged user: it alone
//! may list and delete accounts, upload catalogs and run analytics, and it can
//! never be deleted.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// Row id of the seed account on a freshly initialized database.
pub const SEED_ACCOUNT_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username and password are required")]
    MissingFields,
    #[error("user already exists: {0}")]
    DuplicateUsername(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("access denied: {0}")]
    Forbidden(&'static str),
    #[error("user not found: {0}")]
    NotFound(i64),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub username: String,
    pub is_admin: bool,
}

pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AccountError::Hash(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AccountError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Constant-time check of `password` against a stored PHC string. A malformed
/// stored hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Clone)]
pub struct Accounts {
    pool: SqlitePool,
    seed_username: String,
}

impl Accounts {
    pub fn new(pool: SqlitePool, seed_username: impl Into<String>) -> Self {
        Self {
            pool,
            seed_username: seed_username.into(),
        }
    }

    pub fn seed_username(&self) -> &str {
        &self.seed_username
    }

    /// True only for the seed account.
    pub fn is_privileged(&self, username: &str) -> bool {
        username == self.seed_username
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AccountError> {
        let row = sqlx::query("SELECT username, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(AccountError::InvalidCredentials);
        };

        let stored: String = row.get("password");
        if !verify_password(password, &stored) {
            return Err(AccountError::InvalidCredentials);
        }

        let username: String = row.get("username");
        Ok(LoginOutcome {
            is_admin: self.is_privileged(&username),
            username,
        })
    }

    /// Creates an account and returns its id.
    pub async fn register(&self, username: &str, password: &str) -> Result<i64, AccountError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingFields);
        }

        let hash = hash_password(password)?;
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(hash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AccountError::DuplicateUsername(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self, actor: &str) -> Result<Vec<UserSummary>, AccountError> {
        if !self.is_privileged(actor) {
            return Err(AccountError::Forbidden("only the admin can list users"));
        }
        self.all().await
    }

    pub async fn all(&self) -> Result<Vec<UserSummary>, AccountError> {
        let rows = sqlx::query("SELECT id, username FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| UserSummary {
                id: r.get("id"),
                username: r.get("username"),
            })
            .collect())
    }

    /// Deletes account `id` on behalf of `actor`. The seed account and the
    /// actor's own account are never deletable.
    pub async fn delete(&self, actor: &str, id: i64) -> Result<(), AccountError> {
        if !self.is_privileged(actor) {
            return Err(AccountError::Forbidden("only the admin can delete users"));
        }
        if id == SEED_ACCOUNT_ID {
            return Err(AccountError::Forbidden("the admin account cannot be deleted"));
        }

        let target: Option<String> = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match target {
            None => Err(AccountError::NotFound(id)),
            Some(name) if name == actor || self.is_privileged(&name) => {
                Err(AccountError::Forbidden("you cannot delete your own account"))
            }
            Some(_) => {
                sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }
    }
}
