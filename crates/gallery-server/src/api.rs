use std::sync::{Arc, Mutex};

use axum::{
    extract::{rejection::FormRejection, DefaultBodyLimit, FromRef, Multipart, Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use gallery_store::{Database, Image, NewMessage, MAX_AUTHOR_LEN};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GalleryConfig;
use crate::error::ServerError;
use crate::flash::{self, Level};
use crate::pages::{self, UPLOADS_URL_PREFIX};
use crate::upload_store::{plan_upload, UploadStore};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub uploads: Arc<UploadStore>,
    pub config: Arc<GalleryConfig>,
    pub flash_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.flash_key.clone()
    }
}

impl AppState {
    pub fn new(db: Database, uploads: UploadStore, config: GalleryConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            uploads: Arc::new(uploads),
            flash_key: config.flash_key(),
            config: Arc::new(config),
        }
    }

    /// Run a synchronous store operation under the database lock.
    pub fn with_db<T>(
        &self,
        op: impl FnOnce(&mut Database) -> gallery_store::Result<T>,
    ) -> Result<T, ServerError> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
        Ok(op(&mut db)?)
    }
}

pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.uploads.base_path());

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/gallery", get(gallery))
        .route("/thumbnail_view", get(thumbnail_view))
        .route("/upload", get(upload_form).post(upload))
        .route("/batch_upload", get(batch_upload_form).post(batch_upload))
        .route(
            "/add_message/{image_id}",
            get(message_page).post(add_message),
        )
        .route("/messages/{image_id}", get(messages_partial))
        .route("/api/images", get(api_images))
        .route("/api/messages/{image_id}", get(api_messages))
        .route("/api/gallery-data", get(api_gallery_data))
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ImageSummary {
    id: Uuid,
    path: String,
}

#[derive(Serialize)]
struct MessageSummary {
    author: String,
    content: String,
}

#[derive(Serialize)]
struct GalleryEntry {
    id: Uuid,
    path: String,
    messages: Vec<MessageSummary>,
}

#[derive(Deserialize)]
struct MessageForm {
    content: String,
    author: String,
}

/// Path ids that do not parse are treated like ids with no row.
fn parse_image_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Pages ───

async fn index(jar: SignedCookieJar) -> (SignedCookieJar, Html<String>) {
    let (jar, flashes) = flash::take(jar);
    (jar, pages::landing(&flashes))
}

async fn gallery(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Html<String>), ServerError> {
    let images = state.with_db(|db| db.list_images())?;
    let (jar, flashes) = flash::take(jar);
    Ok((jar, pages::gallery(&images, &flashes)))
}

async fn thumbnail_view(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Html<String>), ServerError> {
    let images = state.with_db(|db| db.list_images())?;
    let (jar, flashes) = flash::take(jar);
    Ok((jar, pages::thumbnail_view(&images, &flashes)))
}

async fn messages_partial(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Html<String>, ServerError> {
    let messages = match parse_image_id(&image_id) {
        Some(id) => state.with_db(|db| db.get_messages_for_image(id))?,
        None => Vec::new(),
    };
    Ok(Html(pages::messages_partial(&messages)))
}

// ─── Uploads ───

async fn upload_form(jar: SignedCookieJar) -> (SignedCookieJar, Html<String>) {
    let (jar, flashes) = flash::take(jar);
    (jar, pages::upload_form(&flashes, None))
}

async fn upload(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut received = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
        received = Some((original, data));
        break;
    }

    let Some((original, data)) = received else {
        let (jar, flashes) = flash::take(jar);
        let page = pages::upload_form(&flashes, Some("No file selected"));
        return Ok((jar, page).into_response());
    };

    let image = plan_upload(&original);
    state.uploads.write(&image, &data).await?;

    if let Err(e) = state.with_db(|db| db.insert_image(&image)) {
        state.uploads.discard(image.id).await;
        return Err(e);
    }

    info!(id = %image.id, filename = %image.filename, size = data.len(), "Image uploaded");

    let jar = flash::push(jar, Level::Success, "Image uploaded successfully");
    Ok((jar, Redirect::to("/gallery")).into_response())
}

async fn batch_upload_form(jar: SignedCookieJar) -> (SignedCookieJar, Html<String>) {
    let (jar, flashes) = flash::take(jar);
    (jar, pages::batch_upload_form(&flashes))
}

async fn batch_upload(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut written = Vec::new();

    if let Err(e) = receive_batch(&state.uploads, &mut multipart, &mut written).await {
        discard_all(&state.uploads, &written).await;
        return Err(e);
    }

    if let Err(e) = state.with_db(|db| db.insert_images(&written)) {
        discard_all(&state.uploads, &written).await;
        return Err(e);
    }

    info!(count = written.len(), "Image batch uploaded");

    let jar = flash::push(jar, Level::Success, "All images uploaded successfully");
    Ok((jar, Redirect::to("/thumbnail_view")).into_response())
}

/// Write every non-empty `files` field to disk, recording each stored image
/// in `written` as soon as its file exists.
async fn receive_batch(
    uploads: &UploadStore,
    multipart: &mut Multipart,
    written: &mut Vec<Image>,
) -> Result<(), ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;

        let image = plan_upload(&original);
        uploads.write(&image, &data).await?;
        written.push(image);
    }
    Ok(())
}

async fn discard_all(uploads: &UploadStore, images: &[Image]) {
    warn!(count = images.len(), "Rolling back partially stored batch");
    for image in images {
        uploads.discard(image.id).await;
    }
}

// ─── Messages ───

async fn message_page(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    jar: SignedCookieJar,
) -> Result<Response, ServerError> {
    let found = match parse_image_id(&image_id) {
        Some(id) => state.with_db(|db| {
            let Some(image) = db.get_image(id)? else {
                return Ok(None);
            };
            let messages = db.get_messages_for_image(id)?;
            Ok(Some((image, messages)))
        })?,
        None => None,
    };

    let Some((image, messages)) = found else {
        return Ok(image_not_found(jar));
    };

    let (jar, flashes) = flash::take(jar);
    Ok((jar, pages::add_message(&image, &messages, &flashes)).into_response())
}

async fn add_message(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    jar: SignedCookieJar,
    form: Result<Form<MessageForm>, FormRejection>,
) -> Result<Response, ServerError> {
    let id = match parse_image_id(&image_id) {
        Some(id) if state.with_db(|db| db.image_exists(id))? => id,
        _ => return Ok(image_not_found(jar)),
    };

    // The body is only judged once the image is known to exist.
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let back = Redirect::to(&format!("/add_message/{id}"));

    if form.author.trim().is_empty() || form.content.trim().is_empty() {
        let jar = flash::push(jar, Level::Error, "Name and message are both required");
        return Ok((jar, back).into_response());
    }
    if form.author.chars().count() > MAX_AUTHOR_LEN {
        let jar = flash::push(
            jar,
            Level::Error,
            format!("Name must be at most {MAX_AUTHOR_LEN} characters"),
        );
        return Ok((jar, back).into_response());
    }

    let message = state.with_db(|db| {
        db.insert_message(&NewMessage {
            image_id: id,
            author: form.author,
            content: form.content,
        })
    })?;

    info!(image = %id, message = message.id, "Message added");

    let jar = flash::push(jar, Level::Success, "Message added successfully");
    Ok((jar, back).into_response())
}

fn image_not_found(jar: SignedCookieJar) -> Response {
    let jar = flash::push(jar, Level::Error, "Image not found");
    (jar, Redirect::to("/thumbnail_view")).into_response()
}

// ─── JSON ───

async fn api_images(State(state): State<AppState>) -> Result<Json<Vec<ImageSummary>>, ServerError> {
    let images = state.with_db(|db| db.list_images())?;
    Ok(Json(
        images
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                path: image.path,
            })
            .collect(),
    ))
}

async fn api_messages(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<Vec<MessageSummary>>, ServerError> {
    let messages = match parse_image_id(&image_id) {
        Some(id) => state.with_db(|db| db.get_messages_for_image(id))?,
        None => Vec::new(),
    };
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageSummary {
                author: m.author,
                content: m.content,
            })
            .collect(),
    ))
}

async fn api_gallery_data(
    State(state): State<AppState>,
) -> Result<Json<Vec<GalleryEntry>>, ServerError> {
    let threads = state.with_db(|db| db.list_image_threads())?;
    Ok(Json(
        threads
            .into_iter()
            .map(|thread| GalleryEntry {
                id: thread.image.id,
                path: thread.image.path,
                messages: thread
                    .messages
                    .into_iter()
                    .map(|m| MessageSummary {
                        author: m.author,
                        content: m.content,
                    })
                    .collect(),
            })
            .collect(),
    ))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
