//! On-disk storage for uploaded image files.
//!
//! Every image lives in its own directory named by the image id:
//! `<upload root>/<id>/<sanitized filename>`. The database row and the
//! directory share the id, so the filesystem can always be checked against
//! the `images` table.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use gallery_store::{Image, MAX_FILENAME_LEN};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;

/// Longest extension kept when a name has to be shortened or replaced.
const MAX_EXTENSION_LEN: usize = 16;

/// Reserved device names that Windows refuses as file names.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
        }
    }
    if !resolved.starts_with(base) || resolved == base {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// Reduce a client-supplied file name to a safe, flat ASCII name.
///
/// Non-ASCII characters are dropped, path separators become word breaks,
/// words are joined with `_`, anything outside `[A-Za-z0-9_.-]` is removed
/// and leading/trailing dots and underscores are stripped. The result may be
/// empty.
pub fn sanitize_filename(original: &str) -> String {
    let spaced: String = original
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_ascii_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let mut name = kept.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = name.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|dev| dev.eq_ignore_ascii_case(stem))
    {
        name.insert(0, '_');
    }

    truncate_keeping_extension(&name, MAX_FILENAME_LEN)
}

/// Extension of the last path segment of `original`, if it is short plain
/// ASCII.
fn original_extension(original: &str) -> Option<String> {
    let last = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_string())
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    // The name is pure ASCII here, so byte offsets are char boundaries.
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() < MAX_EXTENSION_LEN => {
            let keep = max - ext.len() - 1;
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => name[..max].to_string(),
    }
}

/// Placeholder used when nothing usable survives sanitization.
fn placeholder_filename(id: Uuid, extension: Option<&str>) -> String {
    let simple = id.simple().to_string();
    let short = &simple[..8];
    match extension {
        Some(ext) => format!("upload-{short}.{ext}"),
        None => format!("upload-{short}"),
    }
}

/// Generate a fresh image id and derive the stored name and relative path
/// from the client-supplied file name.
///
/// Falls back to a placeholder name when sanitization leaves nothing but the
/// extension (or nothing at all).
pub fn plan_upload(original: &str) -> Image {
    let id = Uuid::new_v4();
    let sanitized = sanitize_filename(original);
    let extension = original_extension(original);

    let stem_lost = match &extension {
        Some(ext) => sanitized.eq_ignore_ascii_case(ext),
        None => false,
    };

    let filename = if sanitized.is_empty() || stem_lost {
        placeholder_filename(id, extension.as_deref())
    } else {
        sanitized
    };

    Image::new(id, filename)
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::UploadStorage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Upload store initialized");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Absolute location of an image's file.
    pub fn file_path(&self, image: &Image) -> Result<PathBuf, ServerError> {
        ensure_within(&self.base_path, &self.base_path.join(&image.path))
    }

    /// Create the image directory and write the file bytes into it.
    ///
    /// If writing the file fails the freshly created directory is removed
    /// again before the error is returned.
    pub async fn write(&self, image: &Image, data: &[u8]) -> Result<PathBuf, ServerError> {
        let dir = self.image_dir(image.id)?;
        let path = self.file_path(image)?;

        fs::create_dir(&dir).await.map_err(|e| {
            ServerError::UploadStorage(format!("Failed to create directory for {}: {}", image.id, e))
        })?;

        if let Err(e) = fs::write(&path, data).await {
            self.discard(image.id).await;
            return Err(ServerError::UploadStorage(format!(
                "Failed to write file for {}: {}",
                image.id, e
            )));
        }

        debug!(id = %image.id, size = data.len(), path = %image.path, "Stored upload");
        Ok(path)
    }

    /// Best-effort removal of an image directory and everything in it.
    pub async fn discard(&self, id: Uuid) {
        let dir = match self.image_dir(id) {
            Ok(dir) => dir,
            Err(_) => return,
        };
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(id = %id, "Discarded upload directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(id = %id, error = %e, "Failed to discard upload directory"),
        }
    }

    /// Ids of every directory under the upload root whose name is a UUID.
    pub async fn list_upload_dirs(&self) -> Result<Vec<Uuid>, ServerError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ServerError::UploadStorage(format!("Failed to list uploads: {}", e)))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ServerError::UploadStorage(format!("Failed to read directory entry: {}", e))
        })? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(id) = Uuid::parse_str(name) {
                    ids.push(id);
                }
            }
        }

        Ok(ids)
    }

    /// Remove every upload directory with no entry in `known`.
    ///
    /// Directories modified less than `min_age` ago are kept, since a request
    /// may still be about to insert their row. Directories whose name is not a
    /// UUID are never touched. Returns the ids that were removed.
    pub async fn reconcile(
        &self,
        known: &HashSet<Uuid>,
        min_age: Duration,
    ) -> Result<Vec<Uuid>, ServerError> {
        let mut removed = Vec::new();
        for id in self.list_upload_dirs().await? {
            if known.contains(&id) {
                continue;
            }
            let dir = self.image_dir(id)?;
            if !min_age.is_zero() && self.age(&dir).await? < min_age {
                debug!(id = %id, "Skipping recent upload directory");
                continue;
            }
            fs::remove_dir_all(&dir).await.map_err(|e| {
                ServerError::UploadStorage(format!("Failed to remove orphan {}: {}", id, e))
            })?;
            info!(id = %id, "Removed orphaned upload directory");
            removed.push(id);
        }
        Ok(removed)
    }

    /// Time since a directory was last modified. Writing its file counts.
    async fn age(&self, dir: &Path) -> Result<Duration, ServerError> {
        let modified = fs::metadata(dir)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| {
                ServerError::UploadStorage(format!(
                    "Failed to stat '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        // A timestamp in the future counts as brand new.
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    fn image_dir(&self, id: Uuid) -> Result<PathBuf, ServerError> {
        ensure_within(&self.base_path, &self.base_path.join(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (UploadStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path().join("uploads")).await.unwrap();
        (store, dir)
    }

    #[test]
    fn test_sanitize_plain_names() {
        assert_eq!(sanitize_filename("cat.png"), "cat.png");
        assert_eq!(sanitize_filename("My Holiday Photo.JPG"), "My_Holiday_Photo.JPG");
        assert_eq!(sanitize_filename("a-b_c.tar.gz"), "a-b_c.tar.gz");
    }

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("/abs/path/x.png"), "abs_path_x.png");
        assert!(!sanitize_filename("../../../x/../y.png").contains(".."));
    }

    #[test]
    fn test_sanitize_drops_unsafe_characters() {
        assert_eq!(sanitize_filename("f\u{e9}te<1>:*?.png"), "fte1.png");
        assert_eq!(sanitize_filename("nul\0byte.gif"), "nulbyte.gif");
        assert_eq!(sanitize_filename("CON.txt"), "_CON.txt");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn test_sanitize_truncates_but_keeps_extension() {
        let long = format!("{}.jpeg", "a".repeat(300));
        let name = sanitize_filename(&long);
        assert_eq!(name.len(), MAX_FILENAME_LEN);
        assert!(name.ends_with(".jpeg"));
    }

    #[test]
    fn test_plan_upload_layout() {
        let image = plan_upload("beach day.jpg");
        assert_eq!(image.filename, "beach_day.jpg");
        assert_eq!(image.path, format!("{}/beach_day.jpg", image.id));
    }

    #[test]
    fn test_plan_upload_placeholder() {
        let image = plan_upload("\u{65e5}\u{672c}.png");
        assert!(image.filename.starts_with("upload-"));
        assert!(image.filename.ends_with(".png"));

        let bare = plan_upload("../..");
        assert!(bare.filename.starts_with("upload-"));
        assert!(!bare.filename.contains('.'));
    }

    #[test]
    fn test_plan_upload_ids_are_unique() {
        let a = plan_upload("x.png");
        let b = plan_upload("x.png");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_ensure_within_rejects_escape() {
        let base = Path::new("/srv/uploads");
        assert!(ensure_within(base, &base.join("../etc")).is_err());
        assert!(ensure_within(base, base).is_err());
        assert!(ensure_within(base, &base.join("abc/def.png")).is_ok());
    }

    #[tokio::test]
    async fn test_write_places_file_in_id_directory() {
        let (store, _dir) = test_store().await;
        let image = plan_upload("cat.png");

        let path = store.write(&image, b"png-bytes").await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"png-bytes");
        let parent = path.parent().unwrap();
        assert_eq!(parent.file_name().unwrap().to_str().unwrap(), image.id.to_string());
        assert_eq!(parent.parent().unwrap(), store.base_path());
    }

    #[tokio::test]
    async fn test_traversal_name_stays_inside_image_directory() {
        let (store, _dir) = test_store().await;
        let image = plan_upload("../../../outside.png");

        let path = store.write(&image, b"x").await.unwrap();

        assert!(path.starts_with(store.base_path().join(image.id.to_string())));
        assert!(!store.base_path().parent().unwrap().join("outside.png").exists());
    }

    #[tokio::test]
    async fn test_discard_removes_directory() {
        let (store, _dir) = test_store().await;
        let image = plan_upload("cat.png");
        store.write(&image, b"x").await.unwrap();

        store.discard(image.id).await;

        assert!(store.list_upload_dirs().await.unwrap().is_empty());
        // Discarding twice is harmless.
        store.discard(image.id).await;
    }

    #[tokio::test]
    async fn test_reconcile_removes_only_orphans() {
        let (store, _dir) = test_store().await;
        let kept = plan_upload("kept.png");
        let orphan = plan_upload("orphan.png");
        store.write(&kept, b"k").await.unwrap();
        store.write(&orphan, b"o").await.unwrap();
        fs::create_dir(store.base_path().join("not-a-uuid")).await.unwrap();
        fs::write(store.base_path().join(Uuid::new_v4().to_string()), b"stray file")
            .await
            .unwrap();

        let known: HashSet<Uuid> = [kept.id].into_iter().collect();
        let removed = store.reconcile(&known, Duration::ZERO).await.unwrap();

        assert_eq!(removed, vec![orphan.id]);
        assert_eq!(store.list_upload_dirs().await.unwrap(), vec![kept.id]);
        assert!(store.base_path().join("not-a-uuid").exists());
    }

    #[tokio::test]
    async fn test_reconcile_spares_upload_awaiting_its_row() {
        let (store, _dir) = test_store().await;
        let image = plan_upload("in-flight.png");
        store.write(&image, b"bytes").await.unwrap();

        // The row is not inserted yet, so the id is unknown.
        let removed = store
            .reconcile(&HashSet::new(), Duration::from_secs(600))
            .await
            .unwrap();

        assert!(removed.is_empty());
        assert!(store.file_path(&image).unwrap().exists());

        // Once the window is waived the same directory counts as orphaned.
        let removed = store.reconcile(&HashSet::new(), Duration::ZERO).await.unwrap();
        assert_eq!(removed, vec![image.id]);
    }
}
