//! Planning of album downloads.
//!
//! Produces the list of files and their paths inside the archive; writing the
//! archive itself is left to the caller.

use crate::access::AccessFilter;
use crate::albums::{find_album, AnyAlbum};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Album, Photo, SizeVariantKind, ALBUM_COLUMNS, PHOTO_COLUMNS};
use crate::photos::size_variants_for;
use crate::query::{QueryBuilder, SqlFilter};
use crate::session::Session;
use crate::sorting::SortingDecorator;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub photo_id: i64,
    pub source: PathBuf,
    pub archive_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Suggested file name of the archive.
    pub name: String,
    pub entries: Vec<ArchiveEntry>,
    /// Photos left out because their original is missing.
    pub skipped: Vec<i64>,
}

/// Replaces characters that are not allowed in archive paths.
fn safe_name(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

/// Claims `dir/stem.ext`, appending ` (n)` until the path is unused.
fn claim(used: &mut HashSet<String>, dir: &str, stem: &str, ext: &str) -> String {
    let suffix = if ext.is_empty() { String::new() } else { format!(".{ext}") };
    let mut n = 0;
    loop {
        let name = if n == 0 { format!("{stem}{suffix}") } else { format!("{stem} ({n}){suffix}") };
        let path = if dir.is_empty() { name } else { format!("{dir}/{name}") };
        if used.insert(path.to_lowercase()) {
            return path;
        }
        n += 1;
    }
}

fn extension_of(path: &Path, photo_type: &str) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| match photo_type.rsplit('/').next() {
            Some("jpeg") => "jpg".to_string(),
            Some(subtype) => subtype.to_string(),
            None => String::new(),
        })
}

/// Lays out the accessible subtree of `album_id` as archive entries.
///
/// Albums below an inaccessible album are left out. Photos whose original is
/// missing on disk are skipped and reported in [`ArchiveManifest::skipped`].
pub fn plan_archive(conn: &Connection, session: &Session, settings: &Settings, album_id: i64) -> Result<ArchiveManifest> {
    let root = find_album(conn, album_id)?.ok_or_else(|| Error::NotFound(format!("album {album_id}")))?;
    let access = AccessFilter::new(session);
    if !access.is_album_accessible(conn, album_id)? {
        return Err(Error::Forbidden(format!("album {album_id}")));
    }
    if !AnyAlbum::Tree(root.clone()).is_downloadable(session, settings) {
        return Err(Error::Forbidden(format!("album {album_id} is not downloadable")));
    }

    let mut query = QueryBuilder::new(&format!("SELECT {ALBUM_COLUMNS} FROM albums a WHERE a._lft >= "));
    query
        .bind(root.lft)
        .push(" AND a._rgt <= ")
        .bind(root.rgt)
        .push(" AND ")
        .push_filter(&access.album_accessible("a"))
        .push(" ORDER BY a._lft");
    let subtree: Vec<Album> = query.query_map(conn, Album::from_row)?;

    let mut used = HashSet::new();
    let mut folders: HashMap<i64, String> = HashMap::new();
    for album in &subtree {
        let parent_dir = if album.id == root.id {
            Some(String::new())
        } else {
            album.parent_id.and_then(|p| folders.get(&p).cloned())
        };
        match parent_dir {
            Some(dir) => {
                let folder = claim(&mut used, &dir, &safe_name(&album.title), "");
                folders.insert(album.id, folder);
            }
            None => log::debug!("Skipping album {} below an inaccessible parent", album.id),
        }
    }

    let album_ids: Vec<i64> = subtree.iter().map(|a| a.id).filter(|id| folders.contains_key(id)).collect();
    let mut photos: Vec<Photo> = Vec::new();
    for chunk in album_ids.chunks(crate::db::MAX_BATCH_SIZE) {
        let mut query = QueryBuilder::new(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos p LEFT JOIN albums pa ON pa.id = p.album_id WHERE "
        ));
        query
            .push_filter(&SqlFilter::in_list("p.album_id", chunk))
            .push(" AND ")
            .push_filter(&access.photo_visible("p", "pa"));
        photos.extend(SortingDecorator::new(settings.photo_sorting).fetch(conn, query, "p", Photo::from_row)?);
    }

    let photo_ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
    let originals = size_variants_for(conn, &photo_ids, SizeVariantKind::Original)?;

    let mut manifest = ArchiveManifest {
        name: format!("{}.zip", safe_name(&root.title)),
        ..Default::default()
    };
    for photo in photos {
        let (Some(variant), Some(dir)) = (originals.get(&photo.id), photo.album_id.and_then(|id| folders.get(&id))) else {
            log::warn!("Photo {} has no original, skipping", photo.id);
            manifest.skipped.push(photo.id);
            continue;
        };
        let source = PathBuf::from(&variant.path);
        if !source.is_file() {
            log::warn!("Original of photo {} missing at {}, skipping", photo.id, source.display());
            manifest.skipped.push(photo.id);
            continue;
        }
        let ext = extension_of(&source, &photo.photo_type);
        let archive_path = claim(&mut used, dir, &safe_name(&photo.title), &ext);
        manifest.entries.push(ArchiveEntry {
            photo_id: photo.id,
            source,
            archive_path,
        });
    }

    log::info!(
        "Planned archive '{}': {} file(s), {} skipped",
        manifest.name,
        manifest.entries.len(),
        manifest.skipped.len()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Actor;
    use crate::testing::Fixture;
    use std::fs;

    fn paths(manifest: &ArchiveManifest) -> Vec<&str> {
        let mut paths: Vec<&str> = manifest.entries.iter().map(|e| e.archive_path.as_str()).collect();
        paths.sort_unstable();
        paths
    }

    #[test]
    fn manifest_mirrors_the_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let file = |name: &str| {
            let path = dir.path().join(name);
            fs::write(&path, b"jpeg").unwrap();
            path.to_string_lossy().into_owned()
        };

        let fx = Fixture::new();
        let owner = fx.user("alice");
        let root = fx.album(None, "Trip: Rome", owner);
        let day = fx.album(Some(root), "Day 1", owner);
        fx.photo_at(Some(root), owner, "Forum", &file("a.JPG"));
        fx.photo_at(Some(root), owner, "Forum", &file("b.jpg"));
        fx.photo_at(Some(day), owner, "Colosseum", &file("c.png"));
        let missing = fx.photo_at(Some(day), owner, "Gone", &dir.path().join("gone.jpg").to_string_lossy());

        let session = Session::new(Actor::User { id: owner });
        let manifest = plan_archive(&fx.conn, &session, &Settings::default(), root).unwrap();
        assert_eq!(manifest.name, "Trip_ Rome.zip");
        assert_eq!(
            paths(&manifest),
            vec!["Trip_ Rome/Day 1/Colosseum.png", "Trip_ Rome/Forum (1).jpg", "Trip_ Rome/Forum.jpg"]
        );
        assert_eq!(manifest.skipped, vec![missing]);
    }

    #[test]
    fn visitors_need_download_permission() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let visitor = fx.user("bob");
        let album = fx.public_album(None, "Shared", owner);
        let private = fx.album(None, "Private", owner);
        let session = Session::new(Actor::User { id: visitor });
        let settings = Settings::default();

        assert!(matches!(plan_archive(&fx.conn, &session, &settings, album), Err(Error::Forbidden(_))));
        assert!(matches!(plan_archive(&fx.conn, &session, &settings, private), Err(Error::Forbidden(_))));
        assert!(matches!(plan_archive(&fx.conn, &session, &settings, 77), Err(Error::NotFound(_))));

        fx.conn
            .execute("UPDATE albums SET is_downloadable = 1 WHERE id = ?1", [album])
            .unwrap();
        let manifest = plan_archive(&fx.conn, &session, &settings, album).unwrap();
        assert!(manifest.entries.is_empty());
    }

    #[test]
    fn hidden_sub_albums_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jpg");
        fs::write(&path, b"x").unwrap();
        let path = path.to_string_lossy().into_owned();

        let fx = Fixture::new();
        let owner = fx.user("alice");
        let visitor = fx.user("bob");
        let root = fx.public_album(None, "Root", owner);
        let private = fx.album(Some(root), "Private", owner);
        let nested = fx.public_album(Some(private), "Nested", owner);
        fx.photo_at(Some(root), owner, "shown", &path);
        fx.photo_at(Some(nested), owner, "hidden", &path);
        fx.conn.execute("UPDATE albums SET is_downloadable = 1", []).unwrap();

        let session = Session::new(Actor::User { id: visitor });
        let manifest = plan_archive(&fx.conn, &session, &Settings::default(), root).unwrap();
        assert_eq!(paths(&manifest), vec!["Root/shown.jpg"]);
        assert!(manifest.skipped.is_empty());
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(safe_name("  a/b\\c  "), "a_b_c");
        assert_eq!(safe_name(".."), "Untitled");
        assert_eq!(extension_of(Path::new("/x/noext"), "image/jpeg"), "jpg");
    }
}
