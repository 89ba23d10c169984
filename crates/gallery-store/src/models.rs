//! Domain model structs persisted in the gallery database.
//!
//! Stored rows derive `Serialize`; the HTTP layer still answers with narrower
//! projections of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest sanitized file name the `images` table accepts.
pub const MAX_FILENAME_LEN: usize = 100;

/// Longest storage-relative path the `images` table accepts.
pub const MAX_PATH_LEN: usize = 200;

/// Longest author display name the `messages` table accepts.
pub const MAX_AUTHOR_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// An uploaded picture. The id doubles as the name of the directory that
/// holds the file under the upload root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub id: Uuid,
    /// Sanitized original file name.
    pub filename: String,
    /// Storage-relative location, always `"{id}/{filename}"`.
    pub path: String,
    /// Set once when the row is staged; newest first in every listing.
    pub timestamp: DateTime<Utc>,
}

impl Image {
    /// Build the row for a file stored as `{id}/{filename}`, stamped now.
    pub fn new(id: Uuid, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            id,
            path: relative_path(id, &filename),
            filename,
            timestamp: crate::columns::now(),
        }
    }
}

/// Storage-relative path of a file inside its image directory.
pub fn relative_path(id: Uuid, filename: &str) -> String {
    format!("{id}/{filename}")
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A comment attached to one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Assigned by SQLite.
    pub id: i64,
    pub content: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub image_id: Uuid,
}

/// Fields supplied by the client when posting a comment.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub image_id: Uuid,
    pub author: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Gallery projection
// ---------------------------------------------------------------------------

/// An image together with its comment thread, newest comment first.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageThread {
    pub image: Image,
    pub messages: Vec<Message>,
}
