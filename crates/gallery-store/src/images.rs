use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::columns;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{relative_path, Image, MAX_FILENAME_LEN, MAX_PATH_LEN};

const INSERT_SQL: &str = "INSERT INTO images (id, filename, path, timestamp)
                          VALUES (?1, ?2, ?3, ?4)";

impl Database {
    pub fn insert_image(&self, image: &Image) -> Result<()> {
        validate_image(image)?;
        self.conn().execute(
            INSERT_SQL,
            params![
                image.id.to_string(),
                image.filename,
                image.path,
                columns::encode(&image.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Insert every image inside a single transaction.
    ///
    /// Either all rows are committed or, on the first failure, none are.
    pub fn insert_images(&mut self, images: &[Image]) -> Result<()> {
        for image in images {
            validate_image(image)?;
        }

        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for image in images {
                stmt.execute(params![
                    image.id.to_string(),
                    image.filename,
                    image.path,
                    columns::encode(&image.timestamp),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(count = images.len(), "committed image batch");
        Ok(())
    }

    pub fn get_image(&self, id: Uuid) -> Result<Option<Image>> {
        let image = self
            .conn()
            .query_row(
                "SELECT id, filename, path, timestamp FROM images WHERE id = ?1",
                params![id.to_string()],
                row_to_image,
            )
            .optional()?;
        Ok(image)
    }

    pub fn image_exists(&self, id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM images WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All images, newest first. Equal timestamps fall back to insertion
    /// order, newest first.
    pub fn list_images(&self) -> Result<Vec<Image>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, filename, path, timestamp
             FROM images
             ORDER BY timestamp DESC, rowid DESC",
        )?;

        let rows = stmt.query_map([], row_to_image)?;

        let mut images = Vec::new();
        for row in rows {
            images.push(row?);
        }
        Ok(images)
    }

    /// Ids of every stored image, in no particular order.
    pub fn list_image_ids(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare("SELECT id FROM images")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            columns::decode_uuid(&raw, 0)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

fn validate_image(image: &Image) -> Result<()> {
    if image.filename.is_empty() {
        return Err(StoreError::InvalidInput("filename cannot be empty".into()));
    }
    if image.filename.chars().count() > MAX_FILENAME_LEN {
        return Err(StoreError::InvalidInput(format!(
            "filename exceeds {MAX_FILENAME_LEN} characters"
        )));
    }
    if image.path.chars().count() > MAX_PATH_LEN {
        return Err(StoreError::InvalidInput(format!(
            "path exceeds {MAX_PATH_LEN} characters"
        )));
    }
    if image.path != relative_path(image.id, &image.filename) {
        return Err(StoreError::InvalidInput(format!(
            "path '{}' does not live in the directory of image {}",
            image.path, image.id
        )));
    }
    Ok(())
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
    let id_str: String = row.get(0)?;
    let filename: String = row.get(1)?;
    let path: String = row.get(2)?;
    let ts_str: String = row.get(3)?;

    Ok(Image {
        id: columns::decode_uuid(&id_str, 0)?,
        filename,
        path,
        timestamp: columns::decode(&ts_str, 3)?,
    })
}
