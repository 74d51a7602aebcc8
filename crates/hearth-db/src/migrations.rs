use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                username    TEXT NOT NULL,
                avatar_key  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE houses (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                address     TEXT NOT NULL,
                invite_code TEXT NOT NULL UNIQUE,
                currency    TEXT NOT NULL DEFAULT 'USD',
                avatar_key  TEXT,
                created_by  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE TABLE house_members (
                id          TEXT PRIMARY KEY,
                house_id    TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                is_admin    INTEGER NOT NULL DEFAULT 0,
                joined_at   TEXT NOT NULL,
                UNIQUE(house_id, user_id)
            );

            CREATE INDEX idx_house_members_user ON house_members(user_id);

            CREATE TABLE expenses (
                id                  TEXT PRIMARY KEY,
                house_id            TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                created_by          TEXT NOT NULL REFERENCES users(id),
                title               TEXT NOT NULL,
                amount_cents        INTEGER NOT NULL CHECK (amount_cents > 0),
                is_recurring        INTEGER NOT NULL DEFAULT 0,
                recurrence_period   TEXT,
                split_with          TEXT NOT NULL,
                due_date            TEXT,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_expenses_house ON expenses(house_id, created_at);

            CREATE TABLE expense_payments (
                id              TEXT PRIMARY KEY,
                expense_id      TEXT NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id),
                amount_cents    INTEGER NOT NULL,
                paid            INTEGER NOT NULL DEFAULT 0,
                paid_at         TEXT,
                UNIQUE(expense_id, user_id)
            );

            CREATE TABLE notes (
                id          TEXT PRIMARY KEY,
                house_id    TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                created_by  TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                category    TEXT NOT NULL DEFAULT 'general',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notes_house ON notes(house_id, created_at);

            CREATE TABLE note_images (
                id              TEXT PRIMARY KEY,
                note_id         TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                storage_key     TEXT NOT NULL UNIQUE,
                content_type    TEXT NOT NULL,
                size            INTEGER NOT NULL,
                sha256          TEXT NOT NULL,
                position        INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_note_images_note ON note_images(note_id);

            CREATE TABLE member_presence (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                house_id        TEXT NOT NULL REFERENCES houses(id) ON DELETE CASCADE,
                is_home         INTEGER NOT NULL DEFAULT 0,
                last_updated    TEXT NOT NULL,
                UNIQUE(user_id, house_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
