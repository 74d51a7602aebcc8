use anyhow::{Result, anyhow};
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::PresenceRow;

impl Database {
    /// Flip the user's "is home" flag for a house and stamp it with `now`.
    /// A user with no presence row counts as away, so the first toggle marks them home.
    pub fn toggle_presence(
        &self,
        id: &str,
        user_id: &str,
        house_id: &str,
        now: &str,
    ) -> Result<PresenceRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current = query_presence(&tx, user_id, house_id)?.is_some_and(|p| p.is_home);

            tx.execute(
                "INSERT INTO member_presence (id, user_id, house_id, is_home, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, house_id)
                 DO UPDATE SET is_home = excluded.is_home, last_updated = excluded.last_updated",
                rusqlite::params![id, user_id, house_id, !current, now],
            )?;

            let row = query_presence(&tx, user_id, house_id)?
                .ok_or_else(|| anyhow!("Presence row missing after upsert"))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_presence(&self, user_id: &str, house_id: &str) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| query_presence(conn, user_id, house_id))
    }
}

fn query_presence(conn: &Connection, user_id: &str, house_id: &str) -> Result<Option<PresenceRow>> {
    conn.query_row(
        "SELECT id, user_id, house_id, is_home, last_updated
         FROM member_presence WHERE user_id = ?1 AND house_id = ?2",
        [user_id, house_id],
        |row| {
            Ok(PresenceRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                house_id: row.get(2)?,
                is_home: row.get(3)?,
                last_updated: row.get(4)?,
            })
        },
    )
    .optional()
}
