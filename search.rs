//! Free-text search over albums and photos.
//!
//! Each term must occur in one of the searched fields; terms are AND-ed.
//! Both sides are folded with the `casefold` SQL function before `LIKE`, so
//! matching ignores case beyond ASCII as well.

use crate::access::AccessFilter;
use crate::albums::AnyAlbum;
use crate::error::Result;
use crate::models::{Album, Photo, TagAlbum, ALBUM_COLUMNS, PHOTO_COLUMNS, TAG_ALBUM_COLUMNS};
use crate::query::{like_contains, QueryBuilder, SqlFilter};
use crate::session::Session;
use crate::sorting::{AlbumSorting, PhotoSorting, SortingDecorator};
use rusqlite::types::Value;
use rusqlite::Connection;

/// Splits a raw query on whitespace.
pub fn parse_terms(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Term occurs in at least one of `columns`.
fn term_in(columns: &[String], term: &str) -> SqlFilter {
    let pattern = like_contains(&term.to_lowercase());
    SqlFilter::any(columns.iter().map(|column| {
        SqlFilter::new(
            format!("casefold({column}) LIKE ? ESCAPE '\\'"),
            vec![Value::Text(pattern.clone())],
        )
    }))
}

fn all_terms(columns: &[String], terms: &[String]) -> SqlFilter {
    SqlFilter::all(terms.iter().map(|term| term_in(columns, term)))
}

fn text_columns(alias: &str) -> Vec<String> {
    vec![format!("{alias}.title"), format!("{alias}.description")]
}

/// Tag albums first, then tree albums, each ordered by `sorting`.
pub fn search_albums(conn: &Connection, session: &Session, sorting: AlbumSorting, terms: &[String]) -> Result<Vec<AnyAlbum>> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let access = AccessFilter::new(session);
    let decorator = SortingDecorator::new(sorting);

    let mut tag_query = QueryBuilder::new(&format!("SELECT {TAG_ALBUM_COLUMNS} FROM tag_albums ta WHERE "));
    tag_query
        .push_filter(&all_terms(&text_columns("ta"), terms))
        .push(" AND ")
        .push_filter(&access.tag_album_accessible("ta"));
    let tag_albums = decorator.fetch(conn, tag_query, "ta", TagAlbum::from_row)?;

    let mut album_query = QueryBuilder::new(&format!("SELECT {ALBUM_COLUMNS} FROM albums a WHERE "));
    album_query
        .push_filter(&all_terms(&text_columns("a"), terms))
        .push(" AND ")
        .push_filter(&access.album_reachable("a"));
    let albums = decorator.fetch(conn, album_query, "a", Album::from_row)?;

    log::debug!(
        "Album search for {terms:?}: {} tag album(s), {} album(s)",
        tag_albums.len(),
        albums.len()
    );
    Ok(tag_albums
        .into_iter()
        .map(AnyAlbum::Tag)
        .chain(albums.into_iter().map(AnyAlbum::Tree))
        .collect())
}

/// Photos whose title, description or one of whose tags contains every term.
pub fn search_photos(conn: &Connection, session: &Session, sorting: PhotoSorting, terms: &[String]) -> Result<Vec<Photo>> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let access = AccessFilter::new(session);
    let tag_hit = |term: &String| {
        SqlFilter::new(
            "EXISTS (SELECT 1 FROM photo_tags pt WHERE pt.photo_id = p.id AND casefold(pt.tag) LIKE ? ESCAPE '\\')",
            vec![Value::Text(like_contains(&term.to_lowercase()))],
        )
    };
    let matches = SqlFilter::all(
        terms
            .iter()
            .map(|term| term_in(&text_columns("p"), term).or(tag_hit(term))),
    );

    let mut query = QueryBuilder::new(&format!(
        "SELECT {PHOTO_COLUMNS} FROM photos p LEFT JOIN albums pa ON pa.id = p.album_id WHERE "
    ));
    query
        .push_filter(&matches)
        .push(" AND ")
        .push_filter(&access.photo_searchable("p", "pa"));
    SortingDecorator::new(sorting).fetch(conn, query, "p", Photo::from_row)
}
