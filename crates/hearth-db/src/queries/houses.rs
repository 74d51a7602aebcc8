use anyhow::{Result, anyhow};
use rusqlite::Connection;
use tracing::info;

use super::{HOUSE_COLUMNS, OptionalExt, house_from_row};
use crate::models::{HouseMembershipRow, HouseRow, MemberRow, MembershipRow, NewHouse};
use crate::{Database, is_unique_violation, now};

#[derive(Debug)]
pub enum CreateHouseOutcome {
    Created(HouseRow),
    /// Another house already holds this invite code; nothing was written.
    InviteCodeTaken,
}

#[derive(Debug)]
pub enum JoinOutcome {
    Joined(HouseRow),
    AlreadyMember(HouseRow),
    NotFound,
}

impl Database {
    /// Insert the house and its creator's admin membership in one transaction.
    pub fn create_house(&self, house: &NewHouse, invite_code: &str) -> Result<CreateHouseOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ts = now();

            match tx.execute(
                "INSERT INTO houses (id, name, address, invite_code, currency, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &house.id,
                    &house.name,
                    &house.address,
                    invite_code,
                    &house.currency,
                    &house.created_by,
                    &ts,
                ),
            ) {
                Err(ref e) if is_unique_violation(e, "houses.invite_code") => {
                    return Ok(CreateHouseOutcome::InviteCodeTaken);
                }
                other => {
                    other?;
                }
            }

            tx.execute(
                "INSERT INTO house_members (id, house_id, user_id, is_admin, joined_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                (&house.membership_id, &house.id, &house.created_by, &ts),
            )?;

            let row = query_house(&tx, &house.id)?
                .ok_or_else(|| anyhow!("House {} missing after insert", house.id))?;
            tx.commit()?;

            info!("House {} created by {}", house.id, house.created_by);
            Ok(CreateHouseOutcome::Created(row))
        })
    }

    pub fn get_house(&self, house_id: &str) -> Result<Option<HouseRow>> {
        self.with_conn(|conn| query_house(conn, house_id))
    }

    /// Houses the user belongs to, oldest membership first.
    pub fn list_houses_for_user(&self, user_id: &str) -> Result<Vec<HouseMembershipRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, m.is_admin, m.joined_at
                 FROM house_members m
                 JOIN houses h ON h.id = m.house_id
                 WHERE m.user_id = ?1
                 ORDER BY m.joined_at ASC",
                HOUSE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(HouseMembershipRow {
                        house: house_from_row(row)?,
                        is_admin: row.get(8)?,
                        joined_at: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Look the code up and insert a plain membership in one transaction.
    /// `invite_code` must already be normalized.
    pub fn join_house_by_code(
        &self,
        membership_id: &str,
        invite_code: &str,
        user_id: &str,
    ) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let sql = format!("SELECT {} FROM houses h WHERE h.invite_code = ?1", HOUSE_COLUMNS);
            let Some(house) = tx.query_row(&sql, [invite_code], house_from_row).optional()? else {
                return Ok(JoinOutcome::NotFound);
            };

            match tx.execute(
                "INSERT INTO house_members (id, house_id, user_id, is_admin, joined_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                (membership_id, &house.id, user_id, now()),
            ) {
                Err(ref e) if is_unique_violation(e, "house_members.user_id") => {
                    return Ok(JoinOutcome::AlreadyMember(house));
                }
                other => {
                    other?;
                }
            }
            tx.commit()?;

            info!("User {} joined house {}", user_id, house.id);
            Ok(JoinOutcome::Joined(house))
        })
    }

    pub fn get_membership(&self, house_id: &str, user_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, house_id, user_id, is_admin, joined_at
                 FROM house_members WHERE house_id = ?1 AND user_id = ?2",
                [house_id, user_id],
                |row| {
                    Ok(MembershipRow {
                        id: row.get(0)?,
                        house_id: row.get(1)?,
                        user_id: row.get(2)?,
                        is_admin: row.get(3)?,
                        joined_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Members with profile and presence, in join order.
    pub fn list_members(&self, house_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.user_id, p.username, p.avatar_key, m.is_admin, m.joined_at,
                        mp.is_home, mp.last_updated
                 FROM house_members m
                 LEFT JOIN profiles p ON p.id = m.user_id
                 LEFT JOIN member_presence mp
                        ON mp.house_id = m.house_id AND mp.user_id = m.user_id
                 WHERE m.house_id = ?1
                 ORDER BY m.joined_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([house_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        username: row
                            .get::<_, Option<String>>(1)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        avatar_key: row.get(2)?,
                        is_admin: row.get(3)?,
                        joined_at: row.get(4)?,
                        is_home: row.get(5)?,
                        presence_updated: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the avatar key this replaced, if any.
    pub fn set_house_avatar(&self, house_id: &str, key: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row("SELECT avatar_key FROM houses WHERE id = ?1", [house_id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| anyhow!("House not found: {}", house_id))?;
            tx.execute("UPDATE houses SET avatar_key = ?2 WHERE id = ?1", (house_id, key))?;
            tx.commit()?;
            Ok(previous.filter(|p| p != key))
        })
    }
}

fn query_house(conn: &Connection, house_id: &str) -> Result<Option<HouseRow>> {
    let sql = format!("SELECT {} FROM houses h WHERE h.id = ?1", HOUSE_COLUMNS);
    conn.query_row(&sql, [house_id], house_from_row).optional()
}
