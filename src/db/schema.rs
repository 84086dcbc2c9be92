pub const SCHEMA: &str = r#"
-- Folders: optional grouping for photos
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE,        -- derived from title once, at creation
    description TEXT NOT NULL DEFAULT '',
    sort_order INTEGER NOT NULL DEFAULT 0 CHECK (sort_order >= 0),
    created_at TEXT NOT NULL
);

-- Photos: originals plus generated derivatives
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    sort_order INTEGER NOT NULL DEFAULT 0,  -- contiguous n..1 within a folder scope
    created_at TEXT NOT NULL,
    folder_id INTEGER,

    -- Storage names
    original TEXT NOT NULL,
    thumb TEXT,
    preview TEXT,

    -- Tiny JPEG as a data: URL
    blur_placeholder TEXT NOT NULL DEFAULT '',

    FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_photos_folder_order ON photos(folder_id, sort_order DESC);
CREATE INDEX IF NOT EXISTS idx_folders_order ON folders(sort_order DESC);
"#;

/// Column additions for databases created before derivatives existed.
/// Each statement fails harmlessly once the column is present.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE photos ADD COLUMN thumb TEXT",
    "ALTER TABLE photos ADD COLUMN preview TEXT",
    "ALTER TABLE photos ADD COLUMN blur_placeholder TEXT NOT NULL DEFAULT ''",
];
