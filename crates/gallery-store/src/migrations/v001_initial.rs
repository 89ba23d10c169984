//! v001 -- Initial schema creation.
//!
//! Creates the two tables: `images` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Images
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS images (
    id        TEXT PRIMARY KEY NOT NULL,   -- UUID v4, also the upload sub-directory
    filename  TEXT NOT NULL,               -- sanitized original name
    path      TEXT NOT NULL,               -- "<id>/<filename>"
    timestamp TEXT NOT NULL                -- RFC-3339, fixed microsecond precision
);

CREATE INDEX IF NOT EXISTS idx_images_timestamp ON images(timestamp DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    content   TEXT NOT NULL,
    author    TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    image_id  TEXT NOT NULL,               -- FK -> images(id)

    FOREIGN KEY (image_id) REFERENCES images(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_image_ts
    ON messages(image_id, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
