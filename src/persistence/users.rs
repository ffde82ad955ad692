//! Credential storage.
//!
//! Passwords are stored as Argon2 PHC strings; hashing and verification run on
//! the blocking pool.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::sqlite::SqlitePool;

use crate::error::{AuthError, GatewayError, Result};

/// Stores a new user with a hashed password.
pub async fn save_credentials(pool: &SqlitePool, login: &str, password: &str) -> Result<()> {
    let password_hash = hash_password(password.to_string()).await?;

    let result = sqlx::query("INSERT INTO users (login, password_hash) VALUES (?, ?)")
        .bind(login)
        .bind(&password_hash)
        .execute(pool)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
            Err(AuthError::AlreadyExists(login.to_string()).into())
        }
        Err(e) => Err(GatewayError::persistence(format!(
            "Failed to save credentials: {e}"
        ))),
    }
}

/// Verifies a login/password pair.
///
/// Unknown users and wrong passwords produce the same error.
pub async fn check_credentials(pool: &SqlitePool, login: &str, password: &str) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT password_hash FROM users WHERE login = ?")
        .bind(login)
        .fetch_optional(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to load credentials: {e}")))?;

    let Some((stored_hash,)) = row else {
        return Err(AuthError::InvalidCredentials.into());
    };

    if verify_password(password.to_string(), stored_hash).await? {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials.into())
    }
}

async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| GatewayError::internal(format!("Failed to hash password: {e}")))
    })
    .await
    .map_err(|e| GatewayError::internal(format!("Password hashing task failed: {e}")))?
}

async fn verify_password(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash).map_err(|e| {
            GatewayError::persistence(format!("Stored password hash is invalid: {e}"))
        })?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| GatewayError::internal(format!("Password verification task failed: {e}")))?
}
