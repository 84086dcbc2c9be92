//! HTTP surface: axum router, staff gate, DTOs and error mapping.

mod auth;
mod dto;
mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

pub use auth::{StaffGate, TokenGate};
pub use dto::{FolderDto, PhotoDto};

use crate::config::Config;
use crate::gallery::Gallery;

#[derive(Clone)]
pub struct AppState {
    pub gallery: Arc<Gallery>,
    pub gate: Arc<dyn StaffGate>,
    /// Origin used for absolute URLs when set; otherwise taken from the request.
    pub public_base_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(gallery: Arc<Gallery>, config: &Config) -> Self {
        Self {
            gallery,
            gate: Arc::new(TokenGate::new(config.auth.staff_tokens.clone())),
            public_base_url: config.server.public_base_url.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let staff = Router::new()
        .route("/upload/", post(handlers::upload_photo))
        .route("/up_order/:id/", post(handlers::move_up))
        .route("/down_order/:id/", post(handlers::move_down))
        .route("/top_order/:id/", post(handlers::move_top))
        .route("/bottom_order/:id/", post(handlers::move_bottom))
        .route("/photos/:id/", post(handlers::update_photo))
        .route("/photos/:id/delete/", post(handlers::delete_photo))
        .route("/photos/:id/original/", post(handlers::replace_original))
        .route("/api/folders/", post(handlers::create_folder))
        .route("/api/folders/:id/", post(handlers::update_folder))
        .route("/api/folders/:id/delete/", post(handlers::delete_folder))
        .route_layer(from_fn_with_state(state.clone(), auth::require_staff));

    let public = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/photos/", get(handlers::list_photos))
        .route("/api/folders/", get(handlers::list_folders))
        .route("/media/*path", get(handlers::media));

    public
        .merge(staff)
        .layer(from_fn(handlers::request_tracing))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}
