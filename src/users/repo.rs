//! User persistence (SQLite `users` table).
//!
//! Synchronous rusqlite calls; HTTP handlers run them under
//! `tokio::task::spawn_blocking`.

use chrono::Utc;
use thiserror::Error;

use crate::db::models::{NewUser, User};
use crate::db::DbPool;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("DB lock error")]
    LockPoisoned,
}

/// Insert a user and return the stored row, including its generated id.
pub fn create_user(db: &DbPool, new_user: &NewUser) -> Result<User, RepoError> {
    let conn = db.lock().map_err(|_| RepoError::LockPoisoned)?;
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![new_user.name, new_user.email, created_at],
    )?;

    Ok(User {
        id: conn.last_insert_rowid(),
        name: new_user.name.clone(),
        email: new_user.email.clone(),
        created_at,
    })
}

/// All users, oldest first.
pub fn list_users(db: &DbPool) -> Result<Vec<User>, RepoError> {
    let conn = db.lock().map_err(|_| RepoError::LockPoisoned)?;

    let mut stmt = conn.prepare("SELECT id, name, email, created_at FROM users ORDER BY id ASC")?;
    let users = stmt
        .query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}
