//! folio: a small photo-gallery backend.
//!
//! Photos live in optional folders and keep a hand-curated display order per
//! folder. Uploads produce a thumbnail, a preview and a blur placeholder.

pub mod config;
pub mod db;
pub mod derivatives;
pub mod error;
pub mod gallery;
pub mod listing;
pub mod logging;
pub mod ordering;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{GalleryError, GalleryResult};
pub use gallery::Gallery;
