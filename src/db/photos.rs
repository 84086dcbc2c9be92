//! Photo records and the row-level queries the ordering engine builds on.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::derivatives::Derivatives;
use crate::error::{GalleryError, GalleryResult};
use crate::ordering::Scope;

/// A photo row, joined with its folder's slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub folder_id: Option<i64>,
    pub folder_slug: Option<String>,
    pub original: String,
    pub thumb: Option<String>,
    pub preview: Option<String>,
    pub blur_placeholder: String,
}

impl Photo {
    pub fn scope(&self) -> Scope {
        Scope::of(self.folder_id)
    }

    pub fn derivatives(&self) -> Derivatives {
        Derivatives {
            thumb: self.thumb.clone(),
            preview: self.preview.clone(),
            blur_placeholder: self.blur_placeholder.clone(),
        }
    }

    /// Storage names owned by this photo.
    pub fn stored_files(&self) -> Vec<&str> {
        [
            Some(self.original.as_str()),
            self.thumb.as_deref(),
            self.preview.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|name| !name.is_empty())
        .collect()
    }
}

/// Core fields written in the first phase of an upload.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub title: String,
    pub description: String,
    pub category: String,
    pub folder_id: Option<i64>,
    pub original: String,
    pub created_at: DateTime<Utc>,
}

/// Which photos a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoFilter {
    All,
    FolderSlug(String),
}

impl PhotoFilter {
    fn slug(&self) -> Option<&str> {
        match self {
            PhotoFilter::All => None,
            PhotoFilter::FolderSlug(slug) => Some(slug),
        }
    }
}

const PHOTO_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.category, p.sort_order, p.created_at,
           p.folder_id, f.slug, p.original, p.thumb, p.preview, p.blur_placeholder
    FROM photos p
    LEFT JOIN folders f ON f.id = p.folder_id
"#;

fn row_to_photo(row: &Row) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        order: row.get(4)?,
        created_at: row.get(5)?,
        folder_id: row.get(6)?,
        folder_slug: row.get(7)?,
        original: row.get(8)?,
        thumb: row.get(9)?,
        preview: row.get(10)?,
        blur_placeholder: row.get(11)?,
    })
}

/// Insert with `order = max(order in scope) + 1`, or 1 for an empty scope.
pub fn insert_photo(conn: &Connection, photo: &NewPhoto) -> GalleryResult<i64> {
    let order = next_top_order(conn, Scope::of(photo.folder_id))?;
    conn.execute(
        r#"
        INSERT INTO photos (title, description, category, sort_order, created_at, folder_id, original)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            photo.title,
            photo.description,
            photo.category,
            order,
            photo.created_at,
            photo.folder_id,
            photo.original,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_photo(conn: &Connection, id: i64) -> GalleryResult<Option<Photo>> {
    Ok(conn
        .query_row(&format!("{} WHERE p.id = ?", PHOTO_SELECT), [id], row_to_photo)
        .optional()?)
}

pub fn require_photo(conn: &Connection, id: i64) -> GalleryResult<Photo> {
    get_photo(conn, id)?.ok_or_else(|| GalleryError::not_found(format!("Photo {}", id)))
}

/// Photos in display order (`order desc, id desc`). An unknown slug matches nothing.
pub fn list_photos(
    conn: &Connection,
    filter: &PhotoFilter,
    limit: u64,
    offset: u64,
) -> GalleryResult<Vec<Photo>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE (?1 IS NULL OR f.slug = ?1) ORDER BY p.sort_order DESC, p.id DESC LIMIT ?2 OFFSET ?3",
        PHOTO_SELECT
    ))?;
    let photos = stmt
        .query_map(
            params![filter.slug(), limit as i64, offset as i64],
            row_to_photo,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(photos)
}

pub fn count_photos(conn: &Connection, filter: &PhotoFilter) -> GalleryResult<u64> {
    let count: i64 = conn.query_row(
        r#"
        SELECT COUNT(*)
        FROM photos p
        LEFT JOIN folders f ON f.id = p.folder_id
        WHERE (?1 IS NULL OR f.slug = ?1)
        "#,
        [filter.slug()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn photo_ids(conn: &Connection) -> GalleryResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM photos ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Persist only the three derived fields.
pub fn update_derivatives(conn: &Connection, id: i64, derivatives: &Derivatives) -> GalleryResult<()> {
    conn.execute(
        "UPDATE photos SET thumb = ?1, preview = ?2, blur_placeholder = ?3 WHERE id = ?4",
        params![
            derivatives.thumb,
            derivatives.preview,
            derivatives.blur_placeholder,
            id
        ],
    )?;
    Ok(())
}

pub fn update_details(
    conn: &Connection,
    id: i64,
    title: &str,
    description: &str,
    category: &str,
) -> GalleryResult<()> {
    conn.execute(
        "UPDATE photos SET title = ?1, description = ?2, category = ?3 WHERE id = ?4",
        params![title, description, category, id],
    )?;
    Ok(())
}

pub fn set_original(conn: &Connection, id: i64, original: &str) -> GalleryResult<()> {
    conn.execute(
        "UPDATE photos SET original = ?1 WHERE id = ?2",
        params![original, id],
    )?;
    Ok(())
}

/// Move a photo into another scope, at the given order.
pub fn set_folder(conn: &Connection, id: i64, folder_id: Option<i64>, order: i64) -> GalleryResult<()> {
    conn.execute(
        "UPDATE photos SET folder_id = ?1, sort_order = ?2 WHERE id = ?3",
        params![folder_id, order, id],
    )?;
    Ok(())
}

pub fn delete_photo_row(conn: &Connection, id: i64) -> GalleryResult<bool> {
    let deleted = conn.execute("DELETE FROM photos WHERE id = ?", [id])?;
    Ok(deleted > 0)
}

// ============================================================================
// Ordering primitives
// ============================================================================

/// `(id, order)` pairs of a scope in rank order.
pub fn scope_orders(conn: &Connection, scope: Scope) -> GalleryResult<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, sort_order FROM photos WHERE folder_id IS ?1 ORDER BY sort_order DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([scope.folder_id()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
    Ok(rows)
}

pub fn set_order(conn: &Connection, id: i64, order: i64) -> GalleryResult<()> {
    let mut stmt = conn.prepare_cached("UPDATE photos SET sort_order = ?1 WHERE id = ?2")?;
    stmt.execute(params![order, id])?;
    Ok(())
}

pub fn next_top_order(conn: &Connection, scope: Scope) -> GalleryResult<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sort_order) FROM photos WHERE folder_id IS ?1",
        [scope.folder_id()],
        |row| row.get(0),
    )?;
    Ok(max.map(|m| m + 1).unwrap_or(1))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::db::{Database, NewFolder};

    pub(crate) fn add_photo(db: &Database, title: &str, folder_id: Option<i64>) -> i64 {
        insert_photo(
            db.conn(),
            &NewPhoto {
                title: title.to_string(),
                description: String::new(),
                category: String::new(),
                folder_id,
                original: format!("photos/{}.jpg", title),
                created_at: Utc::now(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_assigns_next_order_per_scope() {
        let db = test_db();
        let folder = db.create_folder(&NewFolder { title: "Trips".into(), ..Default::default() }).unwrap();

        let a = add_photo(&db, "a", None);
        let b = add_photo(&db, "b", None);
        let c = add_photo(&db, "c", Some(folder.id));

        assert_eq!(db.get_photo(a).unwrap().unwrap().order, 1);
        assert_eq!(db.get_photo(b).unwrap().unwrap().order, 2);
        assert_eq!(db.get_photo(c).unwrap().unwrap().order, 1);
        assert_eq!(db.get_photo(c).unwrap().unwrap().folder_slug.as_deref(), Some("trips"));
    }

    #[test]
    fn test_list_and_count_by_folder() {
        let db = test_db();
        let folder = db.create_folder(&NewFolder { title: "Trips".into(), ..Default::default() }).unwrap();
        add_photo(&db, "a", None);
        let b = add_photo(&db, "b", Some(folder.id));
        let c = add_photo(&db, "c", Some(folder.id));

        let trips = PhotoFilter::FolderSlug("trips".into());
        assert_eq!(count_photos(db.conn(), &trips).unwrap(), 2);
        let ids: Vec<i64> = list_photos(db.conn(), &trips, 10, 0).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c, b]);

        let unknown = PhotoFilter::FolderSlug("nope".into());
        assert_eq!(count_photos(db.conn(), &unknown).unwrap(), 0);
        assert!(list_photos(db.conn(), &unknown, 10, 0).unwrap().is_empty());

        assert_eq!(count_photos(db.conn(), &PhotoFilter::All).unwrap(), 3);
    }

    #[test]
    fn test_folder_delete_clears_reference() {
        let db = test_db();
        let folder = db.create_folder(&NewFolder { title: "Gone".into(), ..Default::default() }).unwrap();
        let a = add_photo(&db, "a", Some(folder.id));

        assert!(crate::db::folders::delete_folder(db.conn(), folder.id).unwrap());
        let photo = db.get_photo(a).unwrap().unwrap();
        assert_eq!(photo.folder_id, None);
        assert_eq!(photo.folder_slug, None);
    }

    #[test]
    fn test_stored_files_skips_empty() {
        let db = test_db();
        let a = add_photo(&db, "a", None);
        let mut photo = db.get_photo(a).unwrap().unwrap();
        assert_eq!(photo.stored_files(), vec!["photos/a.jpg"]);

        photo.thumb = Some("t.jpg".into());
        photo.preview = Some(String::new());
        assert_eq!(photo.stored_files(), vec!["photos/a.jpg", "t.jpg"]);
    }
}
