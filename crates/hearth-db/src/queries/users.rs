use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::models::{ProfileRow, UserRow};
use crate::{Database, is_unique_violation, now};

impl Database {
    /// Insert a user and their profile together. Returns false if the email is taken.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        username: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ts = now();
            match tx.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, &ts),
            ) {
                Err(ref e) if is_unique_violation(e, "users.email") => return Ok(false),
                other => {
                    other?;
                }
            }
            tx.execute(
                "INSERT INTO profiles (id, username, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                (id, username, &ts),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, user_id))
    }

    pub fn update_username(&self, user_id: &str, username: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE profiles SET username = ?2, updated_at = ?3 WHERE id = ?1",
                (user_id, username, now()),
            )?;
            Ok(n > 0)
        })
    }

    /// Point the profile at a new avatar object. Returns the key it replaced.
    pub fn set_profile_avatar(&self, user_id: &str, key: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row("SELECT avatar_key FROM profiles WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| anyhow::anyhow!("Profile not found: {}", user_id))?;
            tx.execute(
                "UPDATE profiles SET avatar_key = ?2, updated_at = ?3 WHERE id = ?1",
                (user_id, key, now()),
            )?;
            tx.commit()?;
            Ok(previous.filter(|p| p != key))
        })
    }
}

fn query_profile(conn: &Connection, user_id: &str) -> Result<Option<ProfileRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, u.email, p.username, p.avatar_key, p.created_at, p.updated_at
         FROM profiles p
         JOIN users u ON u.id = p.id
         WHERE p.id = ?1",
    )?;

    stmt.query_row([user_id], |row| {
        Ok(ProfileRow {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            avatar_key: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    })
    .optional()
}
