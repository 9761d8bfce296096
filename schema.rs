/// MIGRATION 0001: Initial database schema.
pub const MIGRATION_0001: &str = r#"
-- Users Table: Identity of album and photo owners. Authentication lives elsewhere.
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    may_administrate BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

-- Albums Table: Tree albums, positioned with nested-set bounds.
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER,
    _lft INTEGER NOT NULL,
    _rgt INTEGER NOT NULL,
    cover_id INTEGER,
    title TEXT NOT NULL,
    description TEXT,
    license TEXT NOT NULL DEFAULT 'none',
    is_public BOOLEAN NOT NULL DEFAULT 0,
    is_downloadable BOOLEAN NOT NULL DEFAULT 0,
    password TEXT, -- argon2 PHC string
    owner_id INTEGER NOT NULL,
    sorting_col TEXT,
    sorting_order TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (owner_id) REFERENCES users (id)
);

-- Tag Albums Table: Virtual albums matching photos by tag.
CREATE TABLE IF NOT EXISTS tag_albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    is_public BOOLEAN NOT NULL DEFAULT 0,
    is_downloadable BOOLEAN NOT NULL DEFAULT 0,
    password TEXT,
    owner_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (owner_id) REFERENCES users (id)
);

-- Tag Album Tags Table: A photo belongs to a tag album when it carries every listed tag.
CREATE TABLE IF NOT EXISTS tag_album_tags (
    tag_album_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    FOREIGN KEY (tag_album_id) REFERENCES tag_albums (id) ON DELETE CASCADE,
    UNIQUE (tag_album_id, tag)
);

-- Photos Table: album_id is NULL for unsorted photos.
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    album_id INTEGER,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    type TEXT NOT NULL,
    is_starred BOOLEAN NOT NULL DEFAULT 0,
    taken_at INTEGER, -- Stored as Unix timestamp
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (album_id) REFERENCES albums (id) ON DELETE SET NULL,
    FOREIGN KEY (owner_id) REFERENCES users (id)
);

-- Photo Tags Table: Feeds tag albums and photo search.
CREATE TABLE IF NOT EXISTS photo_tags (
    photo_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    FOREIGN KEY (photo_id) REFERENCES photos (id) ON DELETE CASCADE,
    UNIQUE (photo_id, tag)
);

-- Size Variants Table: Resized renditions; 'original' is used for export.
CREATE TABLE IF NOT EXISTS size_variants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    path TEXT NOT NULL,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (photo_id) REFERENCES photos (id) ON DELETE CASCADE,
    UNIQUE (photo_id, kind)
);

-- Configs Table: Key-value settings store.
CREATE TABLE IF NOT EXISTS configs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexes for faster queries
CREATE INDEX IF NOT EXISTS idx_albums_parent_id ON albums (parent_id);
CREATE INDEX IF NOT EXISTS idx_albums_bounds ON albums (_lft, _rgt);
CREATE INDEX IF NOT EXISTS idx_albums_owner_id ON albums (owner_id);
CREATE INDEX IF NOT EXISTS idx_photos_album_id ON photos (album_id);
CREATE INDEX IF NOT EXISTS idx_photos_owner_id ON photos (owner_id);
CREATE INDEX IF NOT EXISTS idx_photos_starred ON photos (is_starred);
CREATE INDEX IF NOT EXISTS idx_photo_tags_tag ON photo_tags (tag);
CREATE INDEX IF NOT EXISTS idx_size_variants_photo_id ON size_variants (photo_id);
"#;

pub const MIGRATION_0002: &str = r#"
-- Default settings; existing values are left untouched.
INSERT OR IGNORE INTO configs (key, value) VALUES
    ('sorting_albums_col', 'created_at'),
    ('sorting_albums_order', 'DESC'),
    ('sorting_photos_col', 'taken_at'),
    ('sorting_photos_order', 'DESC'),
    ('default_license', 'none'),
    ('recent_age', '1'),
    ('downloadable', '0'),
    ('thumb_strategy', 'correlated');
"#;

/// Migrations in application order; the index + 1 is the resulting `user_version`.
pub const MIGRATIONS: &[&str] = &[MIGRATION_0001, MIGRATION_0002];
