use rusqlite::params;
use uuid::Uuid;

use crate::columns;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ImageThread, Message, NewMessage, MAX_AUTHOR_LEN};

impl Database {
    /// Store a comment stamped with the current time.
    ///
    /// The schema rejects an `image_id` with no matching image.
    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        if new.author.trim().is_empty() {
            return Err(StoreError::InvalidInput("author is required".into()));
        }
        if new.author.chars().count() > MAX_AUTHOR_LEN {
            return Err(StoreError::InvalidInput(format!(
                "author exceeds {MAX_AUTHOR_LEN} characters"
            )));
        }
        if new.content.trim().is_empty() {
            return Err(StoreError::InvalidInput("content is required".into()));
        }

        let timestamp = columns::now();
        self.conn().execute(
            "INSERT INTO messages (content, author, timestamp, image_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                new.content,
                new.author,
                columns::encode(&timestamp),
                new.image_id.to_string(),
            ],
        )?;

        Ok(Message {
            id: self.conn().last_insert_rowid(),
            content: new.content.clone(),
            author: new.author.clone(),
            timestamp,
            image_id: new.image_id,
        })
    }

    /// Comments on one image, newest first.
    pub fn get_messages_for_image(&self, image_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, content, author, timestamp, image_id
             FROM messages
             WHERE image_id = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![image_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Every image, newest first, each with its comments newest first.
    pub fn list_image_threads(&self) -> Result<Vec<ImageThread>> {
        let images = self.list_images()?;
        let mut threads = Vec::with_capacity(images.len());
        for image in images {
            let messages = self.get_messages_for_image(image.id)?;
            threads.push(ImageThread { image, messages });
        }
        Ok(threads)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let content: String = row.get(1)?;
    let author: String = row.get(2)?;
    let ts_str: String = row.get(3)?;
    let image_id_str: String = row.get(4)?;

    Ok(Message {
        id,
        content,
        author,
        timestamp: columns::decode(&ts_str, 3)?,
        image_id: columns::decode_uuid(&image_id_str, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Image;

    fn db_with_image() -> (Database, Image) {
        let db = Database::open_in_memory().unwrap();
        let image = Image::new(Uuid::new_v4(), "sunset.jpg");
        db.insert_image(&image).unwrap();
        (db, image)
    }

    fn post(db: &Database, image_id: Uuid, author: &str, content: &str) -> Result<Message> {
        db.insert_message(&NewMessage {
            image_id,
            author: author.to_string(),
            content: content.to_string(),
        })
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (db, image) = db_with_image();

        let first = post(&db, image.id, "a", "hi").unwrap();
        let second = post(&db, image.id, "b", "yo").unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.image_id, image.id);
        assert_eq!(first.author, "a");
    }

    #[test]
    fn listing_is_newest_first() {
        let (db, image) = db_with_image();
        post(&db, image.id, "a", "hi").unwrap();
        post(&db, image.id, "b", "yo").unwrap();

        let pairs: Vec<_> = db
            .get_messages_for_image(image.id)
            .unwrap()
            .into_iter()
            .map(|m| (m.author, m.content))
            .collect();
        assert_eq!(
            pairs,
            [
                ("b".to_string(), "yo".to_string()),
                ("a".to_string(), "hi".to_string())
            ]
        );
    }

    #[test]
    fn messages_stay_with_their_image() {
        let (db, image) = db_with_image();
        let other = Image::new(Uuid::new_v4(), "other.jpg");
        db.insert_image(&other).unwrap();

        post(&db, image.id, "a", "on first").unwrap();
        post(&db, other.id, "b", "on other").unwrap();

        let msgs = db.get_messages_for_image(other.id).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "on other");
        assert!(db.get_messages_for_image(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn unknown_image_is_rejected_by_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        let result = post(&db, Uuid::new_v4(), "a", "orphan");
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn blank_fields_are_rejected() {
        let (db, image) = db_with_image();
        assert!(matches!(
            post(&db, image.id, "   ", "hi"),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            post(&db, image.id, "a", ""),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            post(&db, image.id, &"n".repeat(MAX_AUTHOR_LEN + 1), "hi"),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(db.get_messages_for_image(image.id).unwrap().is_empty());
    }

    #[test]
    fn threads_nest_messages_under_images() {
        let (db, image) = db_with_image();
        post(&db, image.id, "a", "hi").unwrap();
        post(&db, image.id, "b", "yo").unwrap();

        let threads = db.list_image_threads().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].image, image);
        let authors: Vec<_> = threads[0].messages.iter().map(|m| m.author.as_str()).collect();
        assert_eq!(authors, ["b", "a"]);
    }
}
