use crate::error::{Error, Result};
use crate::sorting::{AlbumColumn, AlbumSorting, PhotoColumn, PhotoSorting, SortOrder, SortingCriterion};
use crate::thumbs::ThumbStrategy;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Overrides the database location.
pub const DB_ENV_VAR: &str = "GALLERY_DB";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    /// Database under the platform data directory, unless `GALLERY_DB` is set.
    pub fn discover() -> Result<Self> {
        if let Some(db_path) = std::env::var_os(DB_ENV_VAR).filter(|v| !v.is_empty()) {
            let db_path = PathBuf::from(db_path);
            let root = db_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            return Ok(Self { root, db_path });
        }

        let root = dirs::data_dir()
            .ok_or_else(|| Error::Path("Failed to get app data dir".to_string()))?
            .join(env!("CARGO_PKG_NAME"));
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            db_path: root.join("gallery.db"),
            root,
        })
    }
}

/// Gallery-wide settings, stored in the `configs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_album_sorting")]
    pub album_sorting: AlbumSorting,
    #[serde(default = "default_photo_sorting")]
    pub photo_sorting: PhotoSorting,
    #[serde(default = "default_license")]
    pub default_license: String,
    /// Days a photo counts as recent.
    #[serde(default = "default_recent_age")]
    pub recent_age: i64,
    /// Whether smart albums may be downloaded.
    #[serde(default)]
    pub downloadable: bool,
    #[serde(default)]
    pub thumb_strategy: ThumbStrategy,
}

fn default_album_sorting() -> AlbumSorting {
    SortingCriterion::new(AlbumColumn::CreatedAt, SortOrder::Desc)
}

fn default_photo_sorting() -> PhotoSorting {
    SortingCriterion::new(PhotoColumn::TakenAt, SortOrder::Desc)
}

fn default_license() -> String {
    "none".to_string()
}

fn default_recent_age() -> i64 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            album_sorting: default_album_sorting(),
            photo_sorting: default_photo_sorting(),
            default_license: default_license(),
            recent_age: default_recent_age(),
            downloadable: false,
            thumb_strategy: ThumbStrategy::default(),
        }
    }
}

impl Settings {
    /// Reads every known key; missing or malformed values keep their default.
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT key, value FROM configs")?;
        let values = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<HashMap<String, String>>>()?;

        let defaults = Settings::default();
        let album_sorting = SortingCriterion::new(
            parse_or(&values, "sorting_albums_col", defaults.album_sorting.column),
            parse_or(&values, "sorting_albums_order", defaults.album_sorting.order),
        );
        let photo_sorting = SortingCriterion::new(
            parse_or(&values, "sorting_photos_col", defaults.photo_sorting.column),
            parse_or(&values, "sorting_photos_order", defaults.photo_sorting.order),
        );

        Ok(Self {
            album_sorting,
            photo_sorting,
            default_license: values
                .get("default_license")
                .cloned()
                .unwrap_or(defaults.default_license),
            recent_age: parse_or(&values, "recent_age", defaults.recent_age).max(0),
            downloadable: values
                .get("downloadable")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.downloadable),
            thumb_strategy: parse_or(&values, "thumb_strategy", defaults.thumb_strategy),
        })
    }
}

fn parse_or<T>(values: &HashMap<String, String>, key: &str, fallback: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match values.get(key) {
        None => fallback,
        Some(raw) => raw.parse().unwrap_or_else(|err| {
            log::warn!("Invalid config value for {key} ('{raw}'): {err}; using default");
            fallback
        }),
    }
}

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM configs WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?)
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO configs (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    log::info!("Config {key} set to '{value}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn seeded_configs_match_defaults() {
        let conn = db::open_in_memory().unwrap();
        assert_eq!(Settings::load(&conn).unwrap(), Settings::default());
    }

    #[test]
    fn stored_values_override_defaults() {
        let conn = db::open_in_memory().unwrap();
        set_config(&conn, "sorting_albums_col", "title").unwrap();
        set_config(&conn, "sorting_albums_order", "ASC").unwrap();
        set_config(&conn, "recent_age", "7").unwrap();
        set_config(&conn, "downloadable", "1").unwrap();
        set_config(&conn, "thumb_strategy", "window").unwrap();

        let settings = Settings::load(&conn).unwrap();
        assert_eq!(settings.album_sorting, SortingCriterion::new(AlbumColumn::Title, SortOrder::Asc));
        assert_eq!(settings.recent_age, 7);
        assert!(settings.downloadable);
        assert_eq!(settings.thumb_strategy, ThumbStrategy::Window);
        assert_eq!(get_config(&conn, "recent_age").unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn malformed_values_fall_back() {
        let conn = db::open_in_memory().unwrap();
        set_config(&conn, "sorting_photos_col", "colour").unwrap();
        set_config(&conn, "recent_age", "soon").unwrap();
        set_config(&conn, "thumb_strategy", "magic").unwrap();

        let settings = Settings::load(&conn).unwrap();
        let defaults = Settings::default();
        assert_eq!(settings.photo_sorting, defaults.photo_sorting);
        assert_eq!(settings.recent_age, defaults.recent_age);
        assert_eq!(settings.thumb_strategy, ThumbStrategy::Correlated);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"downloadable": true}"#).unwrap();
        assert!(settings.downloadable);
        assert_eq!(settings.default_license, "none");
    }
}
