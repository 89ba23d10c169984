//! One-shot notifications carried between a redirect and the next page.
//!
//! Messages are kept in a signed cookie so clients cannot forge them. The
//! page that renders them also clears the cookie.

use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};

const FLASH_COOKIE: &str = "_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

impl Level {
    pub fn css_class(self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: Level,
    pub message: String,
}

/// Queue a message for the next rendered page.
pub fn push(jar: SignedCookieJar, level: Level, message: impl Into<String>) -> SignedCookieJar {
    let mut pending = read(&jar);
    pending.push(FlashMessage {
        level,
        message: message.into(),
    });

    let value = match serde_json::to_string(&pending) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "dropping flash message");
            return jar;
        }
    };

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Take every pending message and clear the cookie.
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Vec<FlashMessage>) {
    let pending = read(&jar);
    if pending.is_empty() {
        return (jar, pending);
    }
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    (jar, pending)
}

fn read(jar: &SignedCookieJar) -> Vec<FlashMessage> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
        .unwrap_or_default()
}
