//! JSON shapes exchanged with API clients.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::{Folder, FolderSummary, FolderUpdate, NewFolder, Photo};
use crate::gallery::PhotoChanges;
use crate::listing::PageMeta;
use crate::storage::Storage;

#[derive(Debug, Clone, Serialize)]
pub struct PhotoDto {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub order: i64,
    pub image_url: String,
    pub thumbnail_url: Option<String>,
    pub preview_url: Option<String>,
    pub blur_data_url: String,
    pub folder: Option<i64>,
}

impl PhotoDto {
    pub fn new(photo: Photo, urls: &UrlBuilder<'_>) -> Self {
        let url = |name: Option<&str>| name.filter(|n| !n.is_empty()).map(|n| urls.url(n));
        Self {
            image_url: urls.url(&photo.original),
            thumbnail_url: url(photo.thumb.as_deref()),
            preview_url: url(photo.preview.as_deref()),
            id: photo.id,
            title: photo.title,
            description: photo.description,
            category: photo.category,
            created_at: photo.created_at,
            order: photo.order,
            blur_data_url: photo.blur_placeholder,
            folder: photo.folder_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoList {
    pub results: Vec<PhotoDto>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderDto {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<i64>,
}

impl From<Folder> for FolderDto {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id,
            title: folder.title,
            slug: folder.slug,
            description: folder.description,
            order: folder.order,
            created_at: folder.created_at,
            photo_count: None,
        }
    }
}

impl From<FolderSummary> for FolderDto {
    fn from(summary: FolderSummary) -> Self {
        Self {
            photo_count: Some(summary.photo_count),
            ..FolderDto::from(summary.folder)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveResult {
    pub id: i64,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub deleted: i64,
    pub storage_failures: Vec<String>,
}

/// Body of `POST /photos/:id/`. `"folder": null` ungroups the photo; an absent
/// `folder` leaves it where it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub folder: Option<Option<String>>,
}

impl From<PhotoPatch> for PhotoChanges {
    fn from(patch: PhotoPatch) -> Self {
        Self {
            title: patch.title,
            description: patch.description,
            category: patch.category,
            folder: patch.folder,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderCreate {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
}

impl From<FolderCreate> for NewFolder {
    fn from(body: FolderCreate) -> Self {
        Self {
            title: body.title,
            slug: body.slug,
            description: body.description,
            order: body.order,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i64>,
}

impl From<FolderPatch> for FolderUpdate {
    fn from(body: FolderPatch) -> Self {
        Self {
            title: body.title,
            description: body.description,
            order: body.order,
        }
    }
}

/// Present fields (including `null`) become `Some`, so absence and null differ.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Turns storage names into URLs, absolute when an origin is known.
pub struct UrlBuilder<'a> {
    storage: &'a dyn Storage,
    origin: Option<String>,
}

impl<'a> UrlBuilder<'a> {
    /// The origin comes from the configured public base URL, else from the
    /// request's `Host` (and `X-Forwarded-Proto`) headers.
    pub fn new(storage: &'a dyn Storage, public_base_url: Option<&str>, headers: &HeaderMap) -> Self {
        let origin = public_base_url
            .map(|base| base.trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .or_else(|| request_origin(headers));
        Self { storage, origin }
    }

    pub fn url(&self, name: &str) -> String {
        let path = self.storage.url(name);
        match &self.origin {
            Some(origin) if path.starts_with('/') => format!("{}{}", origin, path),
            _ => path,
        }
    }
}

fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim())
        .filter(|s| matches!(*s, "http" | "https"))
        .unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}
