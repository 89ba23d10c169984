//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum_extra::extract::cookie::Key;

/// Signing secret used when `SECRET_KEY` is unset. Development only.
const DEV_SECRET_KEY: &str = "your_secret_key_here";

/// Domain separation string for deriving the cookie key from the secret.
const FLASH_KEY_CONTEXT: &str = "couples-gallery 2024 flash cookie signing";

/// Server configuration.
#[derive(Clone)]
pub struct GalleryConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./couples_gallery.db`
    pub database_path: PathBuf,

    /// Root directory holding one sub-directory per uploaded image.
    /// Env: `UPLOAD_FOLDER`
    /// Default: `./static/uploads`
    pub upload_folder: PathBuf,

    /// Secret the flash cookies are signed with.
    /// Env: `SECRET_KEY`
    /// Default: a fixed development value.
    pub secret_key: String,

    /// Largest accepted request body in bytes, for single and batch uploads
    /// alike.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 50 MiB
    pub max_upload_size: usize,

    /// Upload directories younger than this survive an on-demand
    /// `reconcile`, because a running server may not have inserted their
    /// rows yet.
    /// Env: `RECONCILE_GRACE_SECS`
    /// Default: 600 (10 minutes)
    pub reconcile_grace: Duration,
}

// Hand-written so the secret never reaches the logs.
impl std::fmt::Debug for GalleryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("upload_folder", &self.upload_folder)
            .field("secret_key", &"<redacted>")
            .field("max_upload_size", &self.max_upload_size)
            .field("reconcile_grace", &self.reconcile_grace)
            .finish()
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 3000).into(),
            database_path: PathBuf::from("./couples_gallery.db"),
            upload_folder: PathBuf::from("./static/uploads"),
            secret_key: DEV_SECRET_KEY.to_string(),
            max_upload_size: 50 * 1024 * 1024, // 50 MiB
            reconcile_grace: Duration::from_secs(600),
        }
    }
}

impl GalleryConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("UPLOAD_FOLDER") {
            config.upload_folder = PathBuf::from(path);
        }

        match var("SECRET_KEY") {
            Some(secret) if !secret.is_empty() => config.secret_key = secret,
            _ => tracing::warn!("SECRET_KEY not set, flash cookies use the development secret"),
        }

        if let Some(val) = var("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        if let Some(val) = var("RECONCILE_GRACE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.reconcile_grace = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %val, "Invalid RECONCILE_GRACE_SECS, using default"),
            }
        }

        config
    }

    /// Cookie signing key derived from the configured secret.
    ///
    /// Secrets of any length are accepted; BLAKE3 in key-derivation mode
    /// stretches them to the 64 bytes the cookie crate requires.
    pub fn flash_key(&self) -> Key {
        let mut hasher = blake3::Hasher::new_derive_key(FLASH_KEY_CONTEXT);
        hasher.update(self.secret_key.as_bytes());
        let mut material = [0u8; 64];
        hasher.finalize_xof().fill(&mut material);
        Key::from(&material[..])
    }
}
