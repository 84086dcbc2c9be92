//! Folder records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{is_unique_violation, GalleryError, GalleryResult};

const TITLE_MAX_CHARS: usize = 120;
const SLUG_MAX_CHARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

/// A folder plus the number of photos filed under it.
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    #[serde(flatten)]
    pub folder: Folder,
    pub photo_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewFolder {
    pub title: String,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    pub description: String,
    pub order: i64,
}

/// Editable folder fields. The slug is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct FolderUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i64>,
}

/// URL-safe slug: ASCII lowercase letters, digits, `_` and `-`.
/// Whitespace and hyphen runs collapse to one `-`; other characters are dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }

    let slug = slug.trim_matches(|c| c == '-' || c == '_');
    slug.chars().take(SLUG_MAX_CHARS).collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

fn validate_title(title: &str) -> GalleryResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GalleryError::validation("title: This field is required."));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(GalleryError::validation(format!(
            "title: Ensure this value has at most {} characters.",
            TITLE_MAX_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validate_slug(slug: &str) -> GalleryResult<String> {
    let valid = !slug.is_empty()
        && slug.chars().count() <= SLUG_MAX_CHARS
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(GalleryError::validation(
            "slug: Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
        ));
    }
    Ok(slug.to_string())
}

fn validate_order(order: i64) -> GalleryResult<i64> {
    if order < 0 {
        return Err(GalleryError::validation(
            "order: Ensure this value is greater than or equal to 0.",
        ));
    }
    Ok(order)
}

fn unique_to_validation(err: rusqlite::Error) -> GalleryError {
    if is_unique_violation(&err) {
        GalleryError::validation("A folder with this title or slug already exists.")
    } else {
        err.into()
    }
}

fn row_to_folder(row: &Row) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        order: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const FOLDER_COLUMNS: &str = "id, title, slug, description, sort_order, created_at";

pub fn insert_folder(conn: &Connection, folder: &NewFolder) -> GalleryResult<Folder> {
    let title = validate_title(&folder.title)?;
    let slug = match folder.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => validate_slug(slug)?,
        None => slugify(&title),
    };
    if slug.is_empty() {
        return Err(GalleryError::validation(
            "slug: Could not derive a slug from the title; provide one explicitly.",
        ));
    }
    let order = validate_order(folder.order)?;

    conn.execute(
        r#"
        INSERT INTO folders (title, slug, description, sort_order, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![title, slug, folder.description, order, Utc::now()],
    )
    .map_err(unique_to_validation)?;

    let id = conn.last_insert_rowid();
    get_folder(conn, id)?.ok_or_else(|| GalleryError::not_found(format!("Folder {}", id)))
}

pub fn get_folder(conn: &Connection, id: i64) -> GalleryResult<Option<Folder>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM folders WHERE id = ?", FOLDER_COLUMNS),
            [id],
            row_to_folder,
        )
        .optional()?)
}

pub fn folder_by_slug(conn: &Connection, slug: &str) -> GalleryResult<Option<Folder>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM folders WHERE slug = ?", FOLDER_COLUMNS),
            [slug],
            row_to_folder,
        )
        .optional()?)
}

pub fn list_folders(conn: &Connection) -> GalleryResult<Vec<FolderSummary>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT f.id, f.title, f.slug, f.description, f.sort_order, f.created_at, COUNT(p.id)
        FROM folders f
        LEFT JOIN photos p ON p.folder_id = f.id
        GROUP BY f.id
        ORDER BY f.sort_order DESC, f.id DESC
        "#,
    )?;
    let folders = stmt
        .query_map([], |row| {
            Ok(FolderSummary {
                folder: row_to_folder(row)?,
                photo_count: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(folders)
}

pub fn folder_ids(conn: &Connection) -> GalleryResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM folders ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub fn update_folder(conn: &Connection, id: i64, update: &FolderUpdate) -> GalleryResult<Folder> {
    let mut folder = get_folder(conn, id)?
        .ok_or_else(|| GalleryError::not_found(format!("Folder {}", id)))?;

    if let Some(title) = &update.title {
        folder.title = validate_title(title)?;
    }
    if let Some(description) = &update.description {
        folder.description = description.clone();
    }
    if let Some(order) = update.order {
        folder.order = validate_order(order)?;
    }

    conn.execute(
        "UPDATE folders SET title = ?1, description = ?2, sort_order = ?3 WHERE id = ?4",
        params![folder.title, folder.description, folder.order, id],
    )
    .map_err(unique_to_validation)?;

    Ok(folder)
}

/// Remove a folder row. Its photos keep existing with `folder_id` cleared.
pub fn delete_folder(conn: &Connection, id: i64) -> GalleryResult<bool> {
    let deleted = conn.execute("DELETE FROM folders WHERE id = ?", [id])?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;

    fn new_folder(title: &str) -> NewFolder {
        NewFolder {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer in Lisbon"), "summer-in-lisbon");
        assert_eq!(slugify("  Black & White -- 2024  "), "black-white-2024");
        assert_eq!(slugify("snake_case_title"), "snake_case_title");
        assert_eq!(slugify("Café Crème"), "caf-crme");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_create_derives_slug() {
        let db = test_db();
        let folder = db.create_folder(&new_folder("Street Photography")).unwrap();
        assert_eq!(folder.slug, "street-photography");
        assert_eq!(folder.order, 0);
        assert_eq!(db.folder_by_slug("street-photography").unwrap(), Some(folder));
    }

    #[test]
    fn test_lookups_of_missing_folder() {
        let db = test_db();
        let folder = db.create_folder(&new_folder("Harbour")).unwrap();
        assert_eq!(db.get_folder(folder.id).unwrap(), Some(folder.clone()));
        assert_eq!(db.get_folder(folder.id + 1).unwrap(), None);
        assert_eq!(db.folder_by_slug("nowhere").unwrap(), None);
    }

    #[test]
    fn test_explicit_slug_is_kept() {
        let db = test_db();
        let folder = db
            .create_folder(&NewFolder {
                title: "Street".to_string(),
                slug: Some("streets-2025".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(folder.slug, "streets-2025");
    }

    #[test]
    fn test_slug_not_recomputed_on_update() {
        let db = test_db();
        let folder = db.create_folder(&new_folder("Mountains")).unwrap();

        let updated = db
            .update_folder(
                folder.id,
                &FolderUpdate {
                    title: Some("Alps".to_string()),
                    order: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Alps");
        assert_eq!(updated.slug, "mountains");
        assert_eq!(updated.order, 4);
        assert_eq!(updated.created_at, folder.created_at);
    }

    #[test]
    fn test_duplicate_title_is_validation_error() {
        let db = test_db();
        db.create_folder(&new_folder("Portraits")).unwrap();
        let err = db.create_folder(&new_folder("Portraits")).unwrap_err();
        assert!(matches!(err, GalleryError::Validation(_)));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let db = test_db();
        assert!(matches!(
            db.create_folder(&new_folder("   ")),
            Err(GalleryError::Validation(_))
        ));
        assert!(matches!(
            db.create_folder(&new_folder("???")),
            Err(GalleryError::Validation(_))
        ));
        assert!(matches!(
            db.create_folder(&NewFolder {
                title: "Neg".to_string(),
                order: -1,
                ..Default::default()
            }),
            Err(GalleryError::Validation(_))
        ));
    }

    #[test]
    fn test_update_missing_folder() {
        let db = test_db();
        let err = db.update_folder(99, &FolderUpdate::default()).unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }

    #[test]
    fn test_list_folders_ordering() {
        let db = test_db();
        let a = db.create_folder(&NewFolder { title: "A".into(), order: 1, ..Default::default() }).unwrap();
        let b = db.create_folder(&NewFolder { title: "B".into(), order: 5, ..Default::default() }).unwrap();
        let c = db.create_folder(&NewFolder { title: "C".into(), order: 1, ..Default::default() }).unwrap();

        let ids: Vec<i64> = db.list_folders().unwrap().iter().map(|f| f.folder.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
    }
}
