pub mod expenses;
pub mod houses;
pub mod notes;
pub mod presence;
pub mod storage;
pub mod users;

use anyhow::Result;
use rusqlite::Row;

use crate::models::HouseRow;

const HOUSE_COLUMNS: &str =
    "h.id, h.name, h.address, h.invite_code, h.currency, h.avatar_key, h.created_by, h.created_at";

fn house_from_row(row: &Row<'_>) -> rusqlite::Result<HouseRow> {
    Ok(HouseRow {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        invite_code: row.get(3)?,
        currency: row.get(4)?,
        avatar_key: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// `?1, ?2, ... ?n` for an IN clause.
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
