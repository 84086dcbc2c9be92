//! The gallery service: every pipeline that touches more than one of the
//! database, the storage backend and the derivative generator.
//!
//! Each mutation takes the database lock for its whole duration and does its
//! row work inside one `IMMEDIATE` transaction, so a failure at any step leaves
//! the rows as they were.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::Utc;
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, Config};
use crate::db::{
    folders, photos, Database, Folder, FolderSummary, FolderUpdate, NewFolder, NewPhoto, Photo,
};
use crate::derivatives::{imaging, naming, DerivativeGenerator, DerivativeKind, Derivatives};
use crate::error::{GalleryError, GalleryResult};
use crate::listing::{Page, PageMeta, PageRequest};
use crate::ordering::{self, Move, Scope};
use crate::storage::{FileStorage, Storage, StorageError};

const PHOTO_TITLE_MAX_CHARS: usize = 100;
const CATEGORY_MAX_CHARS: usize = 50;

/// A new photo as received from a client.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub title: String,
    pub description: String,
    pub category: String,
    /// Folder slug; `None` files the photo as ungrouped.
    pub folder_slug: Option<String>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Partial edit of a photo. `folder: Some(None)` moves it out of its folder.
#[derive(Debug, Clone, Default)]
pub struct PhotoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub folder: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub id: i64,
    /// Storage names that could not be removed.
    pub storage_failures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub total: usize,
    pub processed: usize,
    pub failed: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub missing: Vec<i64>,
    pub deleted: Vec<i64>,
    pub storage_failures: Vec<String>,
}

pub struct Gallery {
    db: Mutex<Database>,
    storage: Arc<dyn Storage>,
    generator: DerivativeGenerator,
    api: ApiConfig,
}

impl Gallery {
    pub fn new(db: Database, storage: Arc<dyn Storage>, config: &Config) -> Self {
        Self {
            db: Mutex::new(db),
            storage,
            generator: DerivativeGenerator::new(&config.derivatives),
            api: config.api.clone(),
        }
    }

    /// Open the configured SQLite file and media root.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let db = Database::open(&config.database.sqlite_path)?;
        db.initialize().context("Failed to initialize database schema")?;

        std::fs::create_dir_all(&config.storage.media_root).with_context(|| {
            format!(
                "Failed to create media root {}",
                config.storage.media_root.display()
            )
        })?;
        let storage = FileStorage::new(&config.storage.media_root, &config.storage.media_url);

        info!(
            database = %config.database.sqlite_path.display(),
            media_root = %config.storage.media_root.display(),
            "Gallery opened"
        );
        Ok(Self::new(db, Arc::new(storage), config))
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        // A panic mid-transaction rolls back on drop, so the data is still consistent
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn list_photos(&self, request: &PageRequest) -> GalleryResult<Page<Photo>> {
        let db = self.db();
        let count = db.count_photos(&request.filter)?;
        let items = db.list_photos(&request.filter, request.limit, request.offset)?;
        Ok(Page {
            items,
            meta: PageMeta::new(count, request.limit, request.offset),
        })
    }

    pub fn get_photo(&self, id: i64) -> GalleryResult<Photo> {
        photos::require_photo(self.db().conn(), id)
    }

    pub fn list_folders(&self) -> GalleryResult<Vec<FolderSummary>> {
        self.db().list_folders()
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Store the original, insert the row, generate derivatives and persist
    /// them, all-or-nothing.
    pub fn upload_photo(&self, upload: PhotoUpload) -> GalleryResult<Photo> {
        let title = validate_photo_title(&upload.title)?;
        let category = validate_category(&upload.category)?;
        if upload.bytes.is_empty() {
            return Err(GalleryError::validation("image: No file was submitted."));
        }

        // Decoding is pure, so it runs before the lock is taken
        let decoded = self.decode_upload(&upload.bytes)?;

        let mut db = self.db();
        let folder = resolve_folder(db.conn(), upload.folder_slug.as_deref())?;
        let folder_slug = folder.as_ref().map(|f| f.slug.as_str());
        let uploaded_at = Utc::now();

        let original = self.storage.available_name(&naming::original_name(
            folder_slug,
            &uploaded_at,
            &upload.filename,
        ))?;
        self.storage.save(&original, &upload.bytes)?;

        let new_photo = NewPhoto {
            title,
            description: upload.description,
            category,
            folder_id: folder.as_ref().map(|f| f.id),
            original: original.clone(),
            created_at: uploaded_at,
        };

        let result = (|| -> GalleryResult<Photo> {
            let tx = db.transaction()?;
            let id = photos::insert_photo(&tx, &new_photo)?;

            let derivatives = self.derive(&original, decoded.as_ref())?;
            photos::update_derivatives(&tx, id, &derivatives)?;

            let photo = photos::require_photo(&tx, id)?;
            tx.commit()?;
            Ok(photo)
        })();

        match result {
            Ok(photo) => {
                info!(photo_id = photo.id, original = %photo.original, order = photo.order, "Uploaded photo");
                Ok(photo)
            }
            Err(e) => {
                self.discard_upload(&original);
                Err(self.upload_error(e))
            }
        }
    }

    /// Replace a photo's original file and regenerate every derivative.
    pub fn replace_original(&self, id: i64, filename: &str, bytes: &[u8]) -> GalleryResult<Photo> {
        if bytes.is_empty() {
            return Err(GalleryError::validation("image: No file was submitted."));
        }
        let decoded = self.decode_upload(bytes)?;

        let mut db = self.db();
        let photo = photos::require_photo(db.conn(), id)?;
        let folder_slug = photo.folder_slug.as_deref();

        // Same prefix as the first upload, so the photo keeps one location
        let original = self.storage.available_name(&naming::original_name(
            folder_slug,
            &photo.created_at,
            filename,
        ))?;
        self.storage.save(&original, bytes)?;

        let result = (|| -> GalleryResult<Photo> {
            let tx = db.transaction()?;
            photos::set_original(&tx, id, &original)?;

            let derivatives = self.derive(&original, decoded.as_ref())?;
            photos::update_derivatives(&tx, id, &derivatives)?;

            let updated = photos::require_photo(&tx, id)?;
            tx.commit()?;
            Ok(updated)
        })();

        match result {
            Ok(updated) => {
                let kept = updated.stored_files();
                for name in photo.stored_files().into_iter().filter(|n| !kept.contains(n)) {
                    if let Err(e) = self.storage.delete(name) {
                        warn!("Failed to remove replaced file {}: {}", name, e);
                    }
                }
                info!(photo_id = id, original = %updated.original, "Replaced original");
                Ok(updated)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&original) {
                    warn!("Failed to remove {} after failed replace: {}", original, cleanup);
                }
                Err(self.upload_error(e))
            }
        }
    }

    /// `Ok(None)` means the image is unusable but the generator is lenient.
    fn decode_upload(&self, bytes: &[u8]) -> GalleryResult<Option<DynamicImage>> {
        match imaging::decode(bytes) {
            Ok(img) => Ok(Some(img)),
            Err(e) if self.generator.strict() => {
                Err(GalleryError::validation(format!("image: {}", e)))
            }
            Err(e) => {
                warn!("Upload is not a usable image, storing without derivatives: {}", e);
                Ok(None)
            }
        }
    }

    fn derive(&self, original: &str, img: Option<&DynamicImage>) -> GalleryResult<Derivatives> {
        let Some(img) = img else {
            return Ok(Derivatives::default());
        };

        match self.generator.generate_from_image(
            self.storage.as_ref(),
            original,
            img,
            &Derivatives::default(),
            true,
        ) {
            Err(GalleryError::DerivativeGeneration(e)) if !self.generator.strict() => {
                warn!(original, "Derivative generation failed, leaving empty: {}", e);
                Ok(Derivatives::default())
            }
            other => other,
        }
    }

    fn upload_error(&self, err: GalleryError) -> GalleryError {
        match err {
            GalleryError::DerivativeGeneration(e) => GalleryError::validation(format!("image: {}", e)),
            other => other,
        }
    }

    /// Best-effort removal of everything an aborted upload may have written.
    fn discard_upload(&self, original: &str) {
        let names = [
            original.to_string(),
            naming::derivative_name(original, DerivativeKind::Thumb),
            naming::derivative_name(original, DerivativeKind::Preview),
        ];
        for name in &names {
            if let Err(e) = self.storage.delete(name) {
                warn!("Failed to clean up {} after aborted upload: {}", name, e);
            }
        }
    }

    // ========================================================================
    // Edits and ordering
    // ========================================================================

    pub fn update_photo(&self, id: i64, changes: PhotoChanges) -> GalleryResult<Photo> {
        let mut db = self.db();
        let tx = db.transaction()?;
        let mut photo = photos::require_photo(&tx, id)?;

        if let Some(title) = &changes.title {
            photo.title = validate_photo_title(title)?;
        }
        if let Some(description) = changes.description {
            photo.description = description;
        }
        if let Some(category) = &changes.category {
            photo.category = validate_category(category)?;
        }
        photos::update_details(&tx, id, &photo.title, &photo.description, &photo.category)?;

        if let Some(folder) = changes.folder {
            let folder_id = resolve_folder(&tx, folder.as_deref())?.map(|f| f.id);
            if folder_id != photo.folder_id {
                ordering::reassign(&tx, id, folder_id)?;
                debug!(photo_id = id, from = ?photo.folder_id, to = ?folder_id, "Reassigned photo");
            }
        }

        let updated = photos::require_photo(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Returns the photo's order after the move.
    pub fn move_photo(&self, id: i64, mv: Move) -> GalleryResult<i64> {
        let mut db = self.db();
        let tx = db.transaction()?;
        let order = ordering::apply_move(&tx, id, mv)?;
        tx.commit()?;
        Ok(order)
    }

    /// Release the photo's files, then delete its row and close the gap in its
    /// scope. Storage failures are reported, not fatal.
    pub fn delete_photo(&self, id: i64) -> GalleryResult<DeleteReport> {
        let mut db = self.db();
        let photo = photos::require_photo(db.conn(), id)?;
        let scope = photo.scope();

        let mut storage_failures = Vec::new();
        for name in photo.stored_files() {
            if let Err(e) = self.storage.delete(name) {
                warn!(photo_id = id, "Failed to delete {}: {}", name, e);
                storage_failures.push(name.to_string());
            }
        }

        let tx = db.transaction()?;
        photos::delete_photo_row(&tx, id)?;
        ordering::renormalize(&tx, scope)?;
        tx.commit()?;

        info!(photo_id = id, failures = storage_failures.len(), "Deleted photo");
        Ok(DeleteReport {
            id,
            storage_failures,
        })
    }

    pub fn renormalize_all(&self) -> GalleryResult<usize> {
        let mut db = self.db();
        let tx = db.transaction()?;
        let scopes = ordering::renormalize_all(&tx)?;
        tx.commit()?;
        Ok(scopes)
    }

    // ========================================================================
    // Folders
    // ========================================================================

    pub fn create_folder(&self, folder: &NewFolder) -> GalleryResult<Folder> {
        let folder = self.db().create_folder(folder)?;
        info!(folder_id = folder.id, slug = %folder.slug, "Created folder");
        Ok(folder)
    }

    pub fn update_folder(&self, id: i64, update: &FolderUpdate) -> GalleryResult<Folder> {
        self.db().update_folder(id, update)
    }

    /// Delete a folder. Its photos become ungrouped and that scope is repaired.
    pub fn delete_folder(&self, id: i64) -> GalleryResult<()> {
        let mut db = self.db();
        let tx = db.transaction()?;
        if !folders::delete_folder(&tx, id)? {
            return Err(GalleryError::not_found(format!("Folder {}", id)));
        }
        ordering::renormalize(&tx, Scope::Ungrouped)?;
        tx.commit()?;

        info!(folder_id = id, "Deleted folder");
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Force-regenerate derivatives for every photo, in id order.
    /// `progress` is called with `(done, total, photo_id)` after each photo.
    pub fn backfill_derivatives(
        &self,
        mut progress: impl FnMut(usize, usize, i64),
    ) -> GalleryResult<BackfillReport> {
        let ids = self.db().photo_ids()?;
        let mut report = BackfillReport {
            total: ids.len(),
            ..Default::default()
        };

        for (i, id) in ids.iter().copied().enumerate() {
            // Lock per photo so the server is not starved during a long backfill
            let db = self.db();
            let Some(photo) = db.get_photo(id)? else {
                continue;
            };

            match self.generator.generate(
                self.storage.as_ref(),
                &photo.original,
                &photo.derivatives(),
                true,
            )
            {
                Ok(derivatives) => {
                    photos::update_derivatives(db.conn(), id, &derivatives)?;
                    report.processed += 1;
                }
                Err(GalleryError::DerivativeGeneration(e)) => {
                    warn!(photo_id = id, "Skipping photo: {}", e);
                    report.failed.push(id);
                }
                Err(e) => return Err(e),
            }
            drop(db);

            progress(i + 1, report.total, id);
        }

        info!(
            processed = report.processed,
            failed = report.failed.len(),
            "Derivative backfill finished"
        );
        Ok(report)
    }

    /// Find photos whose original is gone from storage; delete them unless `dry_run`.
    pub fn prune_missing(&self, dry_run: bool) -> GalleryResult<PruneReport> {
        let mut report = PruneReport::default();

        let ids = self.db().photo_ids()?;
        for id in ids {
            let Some(photo) = self.db().get_photo(id)? else {
                continue;
            };
            if self.original_missing(&photo)? {
                report.missing.push(id);
            }
        }

        if !dry_run {
            for id in report.missing.clone() {
                let deleted = self.delete_photo(id)?;
                report.storage_failures.extend(deleted.storage_failures);
                report.deleted.push(id);
            }
        }

        info!(
            missing = report.missing.len(),
            deleted = report.deleted.len(),
            dry_run,
            "Prune finished"
        );
        Ok(report)
    }

    fn original_missing(&self, photo: &Photo) -> GalleryResult<bool> {
        if photo.original.is_empty() {
            return Ok(true);
        }
        match self.storage.exists(&photo.original) {
            Ok(exists) => Ok(!exists),
            // A name that can never resolve is as good as missing
            Err(StorageError::InvalidName(_)) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_photo_title(title: &str) -> GalleryResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GalleryError::validation("title: This field is required."));
    }
    if title.chars().count() > PHOTO_TITLE_MAX_CHARS {
        return Err(GalleryError::validation(format!(
            "title: Ensure this value has at most {} characters.",
            PHOTO_TITLE_MAX_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validate_category(category: &str) -> GalleryResult<String> {
    let category = category.trim();
    if category.chars().count() > CATEGORY_MAX_CHARS {
        return Err(GalleryError::validation(format!(
            "category: Ensure this value has at most {} characters.",
            CATEGORY_MAX_CHARS
        )));
    }
    Ok(category.to_string())
}

/// Look up a folder by slug. Blank means ungrouped; an unknown slug is a
/// validation error.
fn resolve_folder(conn: &rusqlite::Connection, slug: Option<&str>) -> GalleryResult<Option<Folder>> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(slug) => folders::folder_by_slug(conn, slug)?
            .map(Some)
            .ok_or_else(|| GalleryError::validation(format!("folder: Unknown folder {:?}.", slug))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivatives::imaging::tests::png_bytes;

    struct Fixture {
        _dir: tempfile::TempDir,
        gallery: Gallery,
    }

    fn fixture_with(config: Config) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path(), "/media/"));
        Fixture {
            gallery: Gallery::new(db, storage, &config),
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default())
    }

    fn upload(title: &str, folder: Option<&str>) -> PhotoUpload {
        PhotoUpload {
            title: title.to_string(),
            folder_slug: folder.map(str::to_string),
            filename: format!("{}.png", title),
            bytes: png_bytes(40, 20),
            ..Default::default()
        }
    }

    fn media_files(fx: &Fixture) -> usize {
        fn walk(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|entry| {
                    let path = entry.unwrap().path();
                    if path.is_dir() { walk(&path) } else { 1 }
                })
                .sum()
        }
        walk(fx._dir.path())
    }

    fn orders(fx: &Fixture, scope: Scope) -> Vec<i64> {
        photos::scope_orders(fx.gallery.db().conn(), scope)
            .unwrap()
            .into_iter()
            .map(|(_, order)| order)
            .collect()
    }

    #[test]
    fn test_upload_generates_derivatives() {
        let fx = fixture();
        let photo = fx.gallery.upload_photo(upload("sunset", None)).unwrap();

        assert_eq!(photo.order, 1);
        assert!(photo.original.starts_with("photos/none/"));
        assert!(photo.original.ends_with("/sunset.png"));
        assert!(photo.thumb.as_deref().unwrap().ends_with("/thumbs/sunset.png_thumb.jpg"));
        assert!(photo.preview.as_deref().unwrap().ends_with("/previews/sunset.png_preview.jpg"));
        assert!(photo.blur_placeholder.starts_with("data:image/jpeg;base64,"));

        let storage = fx.gallery.storage();
        for name in photo.stored_files() {
            assert!(storage.exists(name).unwrap(), "{} missing", name);
        }
    }

    #[test]
    fn test_upload_puts_newest_on_top() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        let b = fx.gallery.upload_photo(upload("b", None)).unwrap();
        assert_eq!(a.order, 1);
        assert_eq!(b.order, 2);

        let page = fx.gallery.list_photos(&PageRequest::new(None, None, None, &ApiConfig::default())).unwrap();
        let ids: Vec<i64> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn test_same_filename_does_not_collide() {
        let fx = fixture();
        let first = fx.gallery.upload_photo(upload("dup", None)).unwrap();
        let second = fx.gallery.upload_photo(upload("dup", None)).unwrap();
        assert_ne!(first.original, second.original);
        assert!(second.original.ends_with("/dup_1.png"));
    }

    #[test]
    fn test_strict_upload_rejects_corrupt_image() {
        let fx = fixture();
        let mut bad = upload("broken", None);
        bad.bytes = b"definitely not an image".to_vec();

        let err = fx.gallery.upload_photo(bad).unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
        assert_eq!(fx.gallery.db().count_photos(&crate::db::PhotoFilter::All).unwrap(), 0);
        assert_eq!(media_files(&fx), 0);
    }

    #[test]
    fn test_lenient_upload_keeps_photo_without_derivatives() {
        let mut config = Config::default();
        config.derivatives.strict = false;
        let fx = fixture_with(config);

        let mut bad = upload("broken", None);
        bad.bytes = b"definitely not an image".to_vec();
        let photo = fx.gallery.upload_photo(bad).unwrap();

        assert_eq!(photo.thumb, None);
        assert_eq!(photo.preview, None);
        assert_eq!(photo.blur_placeholder, "");
        assert!(fx.gallery.storage().exists(&photo.original).unwrap());
    }

    #[test]
    fn test_upload_validation() {
        let fx = fixture();
        assert!(matches!(
            fx.gallery.upload_photo(upload("   ", None)),
            Err(GalleryError::Validation(_))
        ));
        assert!(matches!(
            fx.gallery.upload_photo(upload("x", Some("no-such-folder"))),
            Err(GalleryError::Validation(_))
        ));

        let mut long_category = upload("x", None);
        long_category.category = "c".repeat(51);
        assert!(matches!(
            fx.gallery.upload_photo(long_category),
            Err(GalleryError::Validation(_))
        ));

        let mut empty = upload("x", None);
        empty.bytes.clear();
        assert!(matches!(fx.gallery.upload_photo(empty), Err(GalleryError::Validation(_))));
        assert_eq!(media_files(&fx), 0);
    }

    #[test]
    fn test_upload_into_folder() {
        let fx = fixture();
        let folder = fx
            .gallery
            .create_folder(&NewFolder { title: "Trips".into(), ..Default::default() })
            .unwrap();
        let photo = fx.gallery.upload_photo(upload("alps", Some("trips"))).unwrap();

        assert_eq!(photo.folder_id, Some(folder.id));
        assert!(photo.original.starts_with("photos/trips/"));
    }

    #[test]
    fn test_delete_releases_files_and_renormalizes() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        let b = fx.gallery.upload_photo(upload("b", None)).unwrap();
        fx.gallery.upload_photo(upload("c", None)).unwrap();

        let report = fx.gallery.delete_photo(b.id).unwrap();
        assert_eq!(report, DeleteReport { id: b.id, storage_failures: vec![] });

        for name in b.stored_files() {
            assert!(!fx.gallery.storage().exists(name).unwrap());
        }
        assert!(fx.gallery.storage().exists(&a.original).unwrap());
        assert_eq!(orders(&fx, Scope::Ungrouped), vec![2, 1]);

        assert!(matches!(fx.gallery.delete_photo(b.id), Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn test_move_photo() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        fx.gallery.upload_photo(upload("b", None)).unwrap();

        assert_eq!(fx.gallery.move_photo(a.id, Move::Up).unwrap(), 2);
        assert_eq!(fx.gallery.move_photo(a.id, Move::Up).unwrap(), 2);
        assert_eq!(fx.gallery.move_photo(a.id, Move::Bottom).unwrap(), 1);
        assert!(matches!(fx.gallery.move_photo(99, Move::Top), Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn test_update_photo_details_and_folder() {
        let fx = fixture();
        let folder = fx
            .gallery
            .create_folder(&NewFolder { title: "Trips".into(), ..Default::default() })
            .unwrap();
        fx.gallery.upload_photo(upload("t1", Some("trips"))).unwrap();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        fx.gallery.upload_photo(upload("b", None)).unwrap();

        let updated = fx
            .gallery
            .update_photo(
                a.id,
                PhotoChanges {
                    title: Some("Renamed".into()),
                    folder: Some(Some("trips".into())),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.folder_id, Some(folder.id));
        assert_eq!(updated.order, 2);
        assert_eq!(updated.created_at, a.created_at);
        assert_eq!(orders(&fx, Scope::Ungrouped), vec![1]);
        assert_eq!(orders(&fx, Scope::Folder(folder.id)), vec![2, 1]);

        let back = fx
            .gallery
            .update_photo(a.id, PhotoChanges { folder: Some(None), ..Default::default() })
            .unwrap();
        assert_eq!(back.folder_id, None);
        assert_eq!(back.order, 2);
        assert_eq!(orders(&fx, Scope::Folder(folder.id)), vec![1]);
    }

    #[test]
    fn test_failed_update_leaves_photo_unchanged() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();

        let err = fx
            .gallery
            .update_photo(
                a.id,
                PhotoChanges {
                    title: Some("New".into()),
                    folder: Some(Some("missing".into())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
        assert_eq!(fx.gallery.get_photo(a.id).unwrap().title, "a");
    }

    #[test]
    fn test_failed_delete_keeps_row_and_orders() {
        let fx = fixture();
        let c = fx.gallery.upload_photo(upload("c", None)).unwrap();
        let b = fx.gallery.upload_photo(upload("b", None)).unwrap();
        let _a = fx.gallery.upload_photo(upload("a", None)).unwrap();

        // Deleting C rewrites A then B; B refuses its new order
        fx.gallery
            .db()
            .conn()
            .execute_batch(&format!(
                "CREATE TRIGGER block_b BEFORE UPDATE OF sort_order ON photos
                 WHEN NEW.id = {}
                 BEGIN SELECT RAISE(ABORT, 'order write blocked'); END;",
                b.id
            ))
            .unwrap();

        let err = fx.gallery.delete_photo(c.id).unwrap_err();
        assert!(matches!(err, GalleryError::Database(_)));

        assert_eq!(fx.gallery.get_photo(c.id).unwrap().order, 1);
        assert_eq!(orders(&fx, Scope::Ungrouped), vec![3, 2, 1]);
    }

    #[test]
    fn test_delete_folder_ungroups_photos() {
        let fx = fixture();
        let folder = fx
            .gallery
            .create_folder(&NewFolder { title: "Gone".into(), ..Default::default() })
            .unwrap();
        fx.gallery.upload_photo(upload("g1", Some("gone"))).unwrap();
        fx.gallery.upload_photo(upload("g2", Some("gone"))).unwrap();
        fx.gallery.upload_photo(upload("u1", None)).unwrap();

        fx.gallery.delete_folder(folder.id).unwrap();
        assert_eq!(orders(&fx, Scope::Ungrouped), vec![3, 2, 1]);
        assert!(fx.gallery.list_folders().unwrap().is_empty());
        assert!(matches!(fx.gallery.delete_folder(folder.id), Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn test_replace_original_regenerates() {
        let fx = fixture();
        let photo = fx.gallery.upload_photo(upload("old", None)).unwrap();

        let replaced = fx.gallery.replace_original(photo.id, "new.png", &png_bytes(30, 30)).unwrap();
        assert!(replaced.original.ends_with("/new.png"));
        assert!(replaced.thumb.as_deref().unwrap().ends_with("/thumbs/new.png_thumb.jpg"));
        assert_ne!(replaced.blur_placeholder, "");
        assert!(!fx.gallery.storage().exists(&photo.original).unwrap());
        assert!(!fx.gallery.storage().exists(photo.thumb.as_deref().unwrap()).unwrap());
        assert_eq!(replaced.order, photo.order);
    }

    #[test]
    fn test_replace_original_keeps_upload_prefix() {
        let fx = fixture();
        let photo = fx.gallery.upload_photo(upload("old", None)).unwrap();
        let uploaded_at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2020, 1, 15, 8, 0, 0).unwrap();
        fx.gallery
            .db()
            .conn()
            .execute(
                "UPDATE photos SET created_at = ?1 WHERE id = ?2",
                rusqlite::params![uploaded_at, photo.id],
            )
            .unwrap();

        let replaced = fx.gallery.replace_original(photo.id, "new.png", &png_bytes(30, 30)).unwrap();
        assert_eq!(replaced.original, "photos/none/2020/01/new.png");
        assert_eq!(
            replaced.thumb.as_deref(),
            Some("photos/none/2020/01/thumbs/new.png_thumb.jpg")
        );
        assert_eq!(
            replaced.preview.as_deref(),
            Some("photos/none/2020/01/previews/new.png_preview.jpg")
        );
    }

    #[test]
    fn test_same_stem_uploads_keep_separate_derivatives() {
        let fx = fixture();
        let jpg = fx
            .gallery
            .upload_photo(PhotoUpload {
                filename: "cat.jpg".into(),
                ..upload("cat", None)
            })
            .unwrap();
        let png = fx
            .gallery
            .upload_photo(PhotoUpload {
                filename: "cat.png".into(),
                ..upload("cat", None)
            })
            .unwrap();

        assert_ne!(jpg.thumb, png.thumb);
        assert_ne!(jpg.preview, png.preview);

        fx.gallery.delete_photo(png.id).unwrap();

        let storage = fx.gallery.storage();
        for name in jpg.stored_files() {
            assert!(storage.exists(name).unwrap(), "{} missing", name);
        }
        let kept = fx.gallery.get_photo(jpg.id).unwrap();
        assert_eq!(kept.thumb, jpg.thumb);
    }

    #[test]
    fn test_backfill_restores_missing_derivatives() {
        let fx = fixture();
        let photo = fx.gallery.upload_photo(upload("a", None)).unwrap();
        let thumb = photo.thumb.clone().unwrap();
        fx.gallery.storage().delete(&thumb).unwrap();

        let mut seen = Vec::new();
        let report = fx
            .gallery
            .backfill_derivatives(|done, total, id| seen.push((done, total, id)))
            .unwrap();

        assert_eq!(report.processed, 1);
        assert!(report.failed.is_empty());
        assert_eq!(seen, vec![(1, 1, photo.id)]);
        assert!(fx.gallery.storage().exists(&thumb).unwrap());
        assert_eq!(fx.gallery.get_photo(photo.id).unwrap().thumb, Some(thumb));
    }

    #[test]
    fn test_backfill_skips_unreadable_originals() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        let b = fx.gallery.upload_photo(upload("b", None)).unwrap();
        fx.gallery.storage().delete(&a.original).unwrap();

        let report = fx.gallery.backfill_derivatives(|_, _, _| {}).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, vec![a.id]);
        assert!(fx.gallery.get_photo(b.id).is_ok());
    }

    #[test]
    fn test_prune_missing() {
        let fx = fixture();
        let a = fx.gallery.upload_photo(upload("a", None)).unwrap();
        let b = fx.gallery.upload_photo(upload("b", None)).unwrap();
        fx.gallery.upload_photo(upload("c", None)).unwrap();
        fx.gallery.storage().delete(&b.original).unwrap();

        let dry = fx.gallery.prune_missing(true).unwrap();
        assert_eq!(dry.missing, vec![b.id]);
        assert!(dry.deleted.is_empty());
        assert!(fx.gallery.get_photo(b.id).is_ok());

        let real = fx.gallery.prune_missing(false).unwrap();
        assert_eq!(real.deleted, vec![b.id]);
        assert!(matches!(fx.gallery.get_photo(b.id), Err(GalleryError::NotFound(_))));
        assert!(fx.gallery.get_photo(a.id).is_ok());
        assert_eq!(orders(&fx, Scope::Ungrouped), vec![2, 1]);
    }

    #[test]
    fn test_renormalize_all() {
        let fx = fixture();
        let folder = fx
            .gallery
            .create_folder(&NewFolder { title: "F".into(), ..Default::default() })
            .unwrap();
        let a = fx.gallery.upload_photo(upload("a", Some("f"))).unwrap();
        fx.gallery.upload_photo(upload("b", Some("f"))).unwrap();
        photos::set_order(fx.gallery.db().conn(), a.id, 40).unwrap();

        assert_eq!(fx.gallery.renormalize_all().unwrap(), 2);
        assert_eq!(orders(&fx, Scope::Folder(folder.id)), vec![2, 1]);
        assert_eq!(fx.gallery.get_photo(a.id).unwrap().order, 2);
    }
}
