use std::collections::HashSet;

use anyhow::Result;

use crate::Database;

impl Database {
    /// Every object key some row still points at. Anything else in storage is garbage.
    pub fn referenced_storage_keys(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT storage_key FROM note_images
                 UNION SELECT avatar_key FROM profiles WHERE avatar_key IS NOT NULL
                 UNION SELECT avatar_key FROM houses WHERE avatar_key IS NOT NULL",
            )?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(keys)
        })
    }
}
