mod schema;
pub mod folders;
pub mod photos;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

pub use folders::{slugify, Folder, FolderSummary, FolderUpdate, NewFolder};
pub use photos::{NewPhoto, Photo, PhotoFilter};
pub use schema::{MIGRATIONS, SCHEMA};

use crate::error::GalleryResult;

/// SQLite store for folders and photos.
///
/// Not `Sync`: share it behind a mutex. Holding that mutex for the length of a
/// transaction is what serializes writers.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        // SET NULL on folder deletion only fires with foreign keys enabled
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    /// Read access for queries that need no transaction.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction. `IMMEDIATE` takes the write lock up front so a
    /// read-modify-write sequence cannot be interleaved by another connection.
    pub fn transaction(&mut self) -> GalleryResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    // ========================================================================
    // Folder operations
    // ========================================================================

    pub fn create_folder(&self, folder: &NewFolder) -> GalleryResult<Folder> {
        folders::insert_folder(&self.conn, folder)
    }

    pub fn get_folder(&self, id: i64) -> GalleryResult<Option<Folder>> {
        folders::get_folder(&self.conn, id)
    }

    pub fn folder_by_slug(&self, slug: &str) -> GalleryResult<Option<Folder>> {
        folders::folder_by_slug(&self.conn, slug)
    }

    pub fn list_folders(&self) -> GalleryResult<Vec<FolderSummary>> {
        folders::list_folders(&self.conn)
    }

    pub fn update_folder(&self, id: i64, update: &FolderUpdate) -> GalleryResult<Folder> {
        folders::update_folder(&self.conn, id, update)
    }

    // ========================================================================
    // Photo operations
    // ========================================================================

    pub fn get_photo(&self, id: i64) -> GalleryResult<Option<Photo>> {
        photos::get_photo(&self.conn, id)
    }

    pub fn list_photos(
        &self,
        filter: &PhotoFilter,
        limit: u64,
        offset: u64,
    ) -> GalleryResult<Vec<Photo>> {
        photos::list_photos(&self.conn, filter, limit, offset)
    }

    pub fn count_photos(&self, filter: &PhotoFilter) -> GalleryResult<u64> {
        photos::count_photos(&self.conn, filter)
    }

    pub fn photo_ids(&self) -> GalleryResult<Vec<i64>> {
        photos::photo_ids(&self.conn)
    }
}
