use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, Instrument, Span};

use super::dto::{
    DeleteResult, FolderCreate, FolderDto, FolderPatch, MoveResult, PhotoDto, PhotoList,
    PhotoPatch, UrlBuilder,
};
use super::AppState;
use crate::db::{FolderUpdate, NewFolder, Photo};
use crate::error::{GalleryError, GalleryResult};
use crate::gallery::{Gallery, PhotoChanges, PhotoUpload};
use crate::listing::PageRequest;
use crate::ordering::Move;
use crate::storage::StorageError;

pub(crate) async fn request_tracing(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request.uri().path().to_string();
    let span = tracing::info_span!("http.request", method = %method, route = %route);

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        )
    });
    response
}

/// Run gallery work on the blocking pool, inside the request's span.
async fn blocking<T, F>(state: &AppState, work: F) -> GalleryResult<T>
where
    F: FnOnce(&Gallery) -> GalleryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let gallery = state.gallery.clone();
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| work(&gallery)))
        .await
        .map_err(|e| GalleryError::Internal(format!("blocking task failed: {}", e)))?
}

pub(crate) async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// ============================================================================
// Listings
// ============================================================================

pub(crate) async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<PhotoList>, GalleryError> {
    let request = PageRequest::from_query(&query, state.gallery.api());
    let page = blocking(&state, move |gallery| gallery.list_photos(&request)).await?;

    let urls = UrlBuilder::new(
        state.gallery.storage(),
        state.public_base_url.as_deref(),
        &headers,
    );
    Ok(Json(PhotoList {
        results: page.items.into_iter().map(|p| PhotoDto::new(p, &urls)).collect(),
        meta: page.meta,
    }))
}

pub(crate) async fn list_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<FolderDto>>, GalleryError> {
    let folders = blocking(&state, |gallery| gallery.list_folders()).await?;
    Ok(Json(folders.into_iter().map(FolderDto::from).collect()))
}

// ============================================================================
// Photos
// ============================================================================

#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<(String, Vec<u8>)>,
}

impl UploadForm {
    fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }
}

async fn read_upload_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> GalleryResult<UploadForm> {
    let mut multipart = multipart.map_err(|e| GalleryError::validation(e.body_text()))?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "image" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(malformed)?;
            form.image = Some((filename, bytes.to_vec()));
        } else {
            let value = field.text().await.map_err(malformed)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn malformed(err: axum::extract::multipart::MultipartError) -> GalleryError {
    GalleryError::validation(format!("Malformed multipart body: {}", err.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> GalleryResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| GalleryError::validation(e.body_text()))
}

fn photo_response(state: &AppState, headers: &HeaderMap, photo: Photo) -> PhotoDto {
    let urls = UrlBuilder::new(
        state.gallery.storage(),
        state.public_base_url.as_deref(),
        headers,
    );
    PhotoDto::new(photo, &urls)
}

pub(crate) async fn upload_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<PhotoDto>), GalleryError> {
    let mut form = read_upload_form(multipart).await?;
    let (filename, bytes) = form
        .image
        .take()
        .ok_or_else(|| GalleryError::validation("image: No file was submitted."))?;

    let folder = form.text("folder");
    let upload = PhotoUpload {
        title: form.text("title"),
        description: form.text("description"),
        category: form.text("category"),
        folder_slug: Some(folder).filter(|s| !s.trim().is_empty()),
        filename,
        bytes,
    };

    let photo = blocking(&state, move |gallery| gallery.upload_photo(upload)).await?;
    Ok((StatusCode::CREATED, Json(photo_response(&state, &headers, photo))))
}

pub(crate) async fn replace_original(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PhotoDto>, GalleryError> {
    let form = read_upload_form(multipart).await?;
    let (filename, bytes) = form
        .image
        .ok_or_else(|| GalleryError::validation("image: No file was submitted."))?;

    let photo = blocking(&state, move |gallery| {
        gallery.replace_original(id, &filename, &bytes)
    })
    .await?;
    Ok(Json(photo_response(&state, &headers, photo)))
}

pub(crate) async fn update_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<PhotoPatch>, JsonRejection>,
) -> Result<Json<PhotoDto>, GalleryError> {
    let changes: PhotoChanges = json_body(body)?.into();
    let photo = blocking(&state, move |gallery| gallery.update_photo(id, changes)).await?;
    Ok(Json(photo_response(&state, &headers, photo)))
}

pub(crate) async fn delete_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResult>, GalleryError> {
    let report = blocking(&state, move |gallery| gallery.delete_photo(id)).await?;
    Ok(Json(DeleteResult {
        deleted: report.id,
        storage_failures: report.storage_failures,
    }))
}

async fn move_photo(state: AppState, id: i64, mv: Move) -> Result<Json<MoveResult>, GalleryError> {
    let order = blocking(&state, move |gallery| gallery.move_photo(id, mv)).await?;
    Ok(Json(MoveResult { id, order }))
}

pub(crate) async fn move_up(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MoveResult>, GalleryError> {
    move_photo(state, id, Move::Up).await
}

pub(crate) async fn move_down(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MoveResult>, GalleryError> {
    move_photo(state, id, Move::Down).await
}

pub(crate) async fn move_top(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MoveResult>, GalleryError> {
    move_photo(state, id, Move::Top).await
}

pub(crate) async fn move_bottom(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MoveResult>, GalleryError> {
    move_photo(state, id, Move::Bottom).await
}

// ============================================================================
// Folders
// ============================================================================

pub(crate) async fn create_folder(
    State(state): State<AppState>,
    body: Result<Json<FolderCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<FolderDto>), GalleryError> {
    let folder: NewFolder = json_body(body)?.into();
    let created = blocking(&state, move |gallery| gallery.create_folder(&folder)).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub(crate) async fn update_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<FolderPatch>, JsonRejection>,
) -> Result<Json<FolderDto>, GalleryError> {
    let update: FolderUpdate = json_body(body)?.into();
    let folder = blocking(&state, move |gallery| gallery.update_folder(id, &update)).await?;
    Ok(Json(folder.into()))
}

pub(crate) async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, GalleryError> {
    blocking(&state, move |gallery| gallery.delete_folder(id)).await?;
    Ok(Json(json!({"deleted": id})))
}

// ============================================================================
// Media
// ============================================================================

pub(crate) async fn media(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, GalleryError> {
    let name = path.clone();
    let bytes = blocking(&state, move |gallery| match gallery.storage().open(&name) {
        Ok(bytes) => Ok(bytes),
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidName(_)) => {
            Err(GalleryError::not_found(format!("Media {}", name)))
        }
        Err(e) => Err(e.into()),
    })
    .await?;

    let mut response = bytes.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&path)),
    );
    Ok(response)
}

fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
