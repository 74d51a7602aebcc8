use anyhow::Result;
use rusqlite::Row;
use tracing::info;

use super::{OptionalExt, placeholders};
use crate::models::{NewNote, NewNoteImage, NoteImageRow, NoteRow};
use crate::{Database, now};

impl Database {
    /// Insert a note and its image rows in one transaction. The image files
    /// themselves must already be in storage.
    pub fn create_note(&self, note: &NewNote, images: &[NewNoteImage]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ts = now();
            tx.execute(
                "INSERT INTO notes (id, house_id, created_by, title, content, category, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                (
                    &note.id,
                    &note.house_id,
                    &note.created_by,
                    &note.title,
                    &note.content,
                    &note.category,
                    &ts,
                ),
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO note_images (id, note_id, storage_key, content_type, size, sha256, position, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for (position, image) in images.iter().enumerate() {
                    stmt.execute(rusqlite::params![
                        image.id,
                        note.id,
                        image.storage_key,
                        image.content_type,
                        image.size,
                        image.sha256,
                        position as i64,
                        ts,
                    ])?;
                }
            }

            tx.commit()?;
            info!("Note {} created in house {} with {} images", note.id, note.house_id, images.len());
            Ok(())
        })
    }

    /// Notes of a house, newest first.
    pub fn list_notes(&self, house_id: &str) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE n.house_id = ?1 ORDER BY n.created_at DESC", NOTE_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([house_id], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_note(&self, note_id: &str) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE n.id = ?1", NOTE_SELECT);
            conn.query_row(&sql, [note_id], note_from_row).optional()
        })
    }

    /// Batch-fetch images for a set of note IDs, in upload order.
    pub fn get_images_for_notes(&self, note_ids: &[String]) -> Result<Vec<NoteImageRow>> {
        if note_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, note_id, storage_key, content_type, size, sha256, position, created_at
                 FROM note_images WHERE note_id IN ({})
                 ORDER BY note_id, position ASC",
                placeholders(note_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(note_ids.iter()), |row| {
                    Ok(NoteImageRow {
                        id: row.get(0)?,
                        note_id: row.get(1)?,
                        storage_key: row.get(2)?,
                        content_type: row.get(3)?,
                        size: row.get(4)?,
                        sha256: row.get(5)?,
                        position: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a note, but only on behalf of its creator.
    ///
    /// Returns `None` when no row matched (wrong note, wrong house or not the
    /// creator), otherwise the storage keys of the images that went with it.
    pub fn delete_note(
        &self,
        note_id: &str,
        house_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let keys = {
                let mut stmt = tx.prepare(
                    "SELECT i.storage_key
                     FROM note_images i
                     JOIN notes n ON n.id = i.note_id
                     WHERE n.id = ?1 AND n.house_id = ?2 AND n.created_by = ?3",
                )?;
                let keys = stmt
                    .query_map([note_id, house_id, user_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                keys
            };

            let deleted = tx.execute(
                "DELETE FROM notes WHERE id = ?1 AND house_id = ?2 AND created_by = ?3",
                [note_id, house_id, user_id],
            )?;
            if deleted == 0 {
                return Ok(None);
            }

            tx.commit()?;
            info!("Note {} deleted by {}", note_id, user_id);
            Ok(Some(keys))
        })
    }
}

const NOTE_SELECT: &str =
    "SELECT n.id, n.house_id, n.created_by, p.username, n.title, n.content,
            n.category, n.created_at, n.updated_at
     FROM notes n
     LEFT JOIN profiles p ON p.id = n.created_by";

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        house_id: row.get(1)?,
        created_by: row.get(2)?,
        created_by_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        title: row.get(4)?,
        content: row.get(5)?,
        category: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
