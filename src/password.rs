//! Password hashing. bcrypt is deliberately slow, so both directions run on the
//! blocking thread pool instead of an I/O worker.

use crate::error::{AppError, AppResult};

/// Work factor used when no explicit cost is configured.
pub const DEFAULT_COST: u32 = 10;

/// Hashes `password` with bcrypt at `cost`.
pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("hash task join error: {e}")))?
        .map_err(|e| AppError::internal(format!("bcrypt hash failed: {e}")))
}

/// Checks `password` against a stored hash. A missing hash (OAuth-only account) or an
/// unparseable one never matches.
pub async fn verify_password(password: &str, hash: Option<&str>) -> AppResult<bool> {
    let Some(hash) = hash else {
        return Ok(false);
    };
    let password = password.to_string();
    let hash = hash.to_string();

    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("verify task join error: {e}")))?;

    match verified {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash could not be parsed");
            Ok(false)
        }
    }
}
