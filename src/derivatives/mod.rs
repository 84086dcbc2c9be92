//! Thumbnail, preview and blur-placeholder generation.

pub mod imaging;
pub mod naming;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DerivativeConfig;
use crate::error::GalleryResult;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum DerivativeError {
    #[error("source image {name} is unreadable: {source}")]
    Unreadable {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("source image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("source image has no pixels")]
    EmptyImage,

    #[error("derivative could not be encoded: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeKind {
    Thumb,
    Preview,
}

impl DerivativeKind {
    pub fn directory(&self) -> &'static str {
        match self {
            DerivativeKind::Thumb => "thumbs",
            DerivativeKind::Preview => "previews",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            DerivativeKind::Thumb => "thumb",
            DerivativeKind::Preview => "preview",
        }
    }
}

/// The three derived values stored on a photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derivatives {
    pub thumb: Option<String>,
    pub preview: Option<String>,
    pub blur_placeholder: String,
}

pub struct DerivativeGenerator {
    settings: DerivativeConfig,
}

impl DerivativeGenerator {
    pub fn new(settings: &DerivativeConfig) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn strict(&self) -> bool {
        self.settings.strict
    }

    pub fn make_thumbnail(&self, img: &DynamicImage) -> Result<Vec<u8>, DerivativeError> {
        imaging::resized_jpeg(img, self.settings.thumb_max_width, self.settings.thumb_quality)
    }

    pub fn make_preview(&self, img: &DynamicImage) -> Result<Vec<u8>, DerivativeError> {
        imaging::resized_jpeg(
            img,
            self.settings.preview_max_width,
            self.settings.preview_quality,
        )
    }

    pub fn make_blur_placeholder(&self, img: &DynamicImage) -> Result<String, DerivativeError> {
        imaging::blur_data_url(img, self.settings.blur_width, self.settings.blur_quality)
    }

    /// Read the original from storage and fill in missing derivatives
    /// (all of them when `force` is set).
    pub fn generate(
        &self,
        storage: &dyn Storage,
        original: &str,
        current: &Derivatives,
        force: bool,
    ) -> GalleryResult<Derivatives> {
        if !force && self.is_complete(storage, current)? {
            debug!(original, "Derivatives present, skipping");
            return Ok(current.clone());
        }

        let bytes = storage
            .open(original)
            .map_err(|e| DerivativeError::Unreadable {
                name: original.to_string(),
                source: e,
            })?;
        let img = imaging::decode(&bytes)?;
        self.generate_from_image(storage, original, &img, current, force)
    }

    /// Same as [`generate`](Self::generate) for an image the caller already decoded.
    pub fn generate_from_image(
        &self,
        storage: &dyn Storage,
        original: &str,
        img: &DynamicImage,
        current: &Derivatives,
        force: bool,
    ) -> GalleryResult<Derivatives> {
        let mut out = current.clone();

        if force || !is_present(storage, current.thumb.as_deref())? {
            let bytes = self.make_thumbnail(img)?;
            out.thumb = Some(self.store(storage, original, DerivativeKind::Thumb, &bytes, current.thumb.as_deref())?);
        }

        if force || !is_present(storage, current.preview.as_deref())? {
            let bytes = self.make_preview(img)?;
            out.preview = Some(self.store(storage, original, DerivativeKind::Preview, &bytes, current.preview.as_deref())?);
        }

        if force || current.blur_placeholder.is_empty() {
            out.blur_placeholder = self.make_blur_placeholder(img)?;
        }

        Ok(out)
    }

    fn is_complete(&self, storage: &dyn Storage, current: &Derivatives) -> GalleryResult<bool> {
        Ok(is_present(storage, current.thumb.as_deref())?
            && is_present(storage, current.preview.as_deref())?
            && !current.blur_placeholder.is_empty())
    }

    fn store(
        &self,
        storage: &dyn Storage,
        original: &str,
        kind: DerivativeKind,
        bytes: &[u8],
        previous: Option<&str>,
    ) -> GalleryResult<String> {
        let name = naming::derivative_name(original, kind);
        storage.save(&name, bytes)?;

        // A replaced original gets new names; drop the stale file
        if let Some(previous) = previous.filter(|p| !p.is_empty() && *p != name) {
            if let Err(e) = storage.delete(previous) {
                warn!("Failed to remove stale {} {}: {}", kind.suffix(), previous, e);
            }
        }

        Ok(name)
    }
}

fn is_present(storage: &dyn Storage, name: Option<&str>) -> GalleryResult<bool> {
    match name {
        Some(name) if !name.is_empty() => Ok(storage.exists(name)?),
        _ => Ok(false),
    }
}
