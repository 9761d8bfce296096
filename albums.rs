//! Album kinds and the listings built on them.

use crate::access::AccessFilter;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::hashing;
use crate::models::{Album, NewTagAlbum, Photo, TagAlbum, Thumb, ALBUM_COLUMNS, PHOTO_COLUMNS, TAG_ALBUM_COLUMNS};
use crate::photos::normalize_tags;
use crate::query::{QueryBuilder, SqlFilter};
use crate::session::{Actor, Session};
use crate::sorting::{AlbumColumn, PhotoColumn, PhotoSorting, SortColumn, Sortable, SortingDecorator};
use crate::thumbs::{tag_match, ThumbResolver};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

pub fn find_album(conn: &Connection, id: i64) -> Result<Option<Album>> {
    let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums a WHERE a.id = ?1");
    Ok(conn.query_row(&sql, params![id], Album::from_row).optional()?)
}

pub fn find_tag_album(conn: &Connection, id: i64) -> Result<Option<TagAlbum>> {
    let sql = format!("SELECT {TAG_ALBUM_COLUMNS} FROM tag_albums ta WHERE ta.id = ?1");
    Ok(conn.query_row(&sql, params![id], TagAlbum::from_row).optional()?)
}

pub fn create_tag_album(conn: &Connection, new: &NewTagAlbum) -> Result<TagAlbum> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO tag_albums (title, description, is_public, is_downloadable, owner_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![new.title, new.description, new.is_public, new.is_downloadable, new.owner_id],
    )?;
    let id = tx.last_insert_rowid();
    for tag in normalize_tags(&new.show_tags) {
        tx.execute("INSERT INTO tag_album_tags (tag_album_id, tag) VALUES (?1, ?2)", params![id, tag])?;
    }
    tx.commit()?;

    log::info!("Created tag album {id} '{}'", new.title);
    find_tag_album(conn, id)?.ok_or_else(|| Error::NotFound(format!("tag album {id}")))
}

fn expect_updated(updated: usize, what: &str, id: i64) -> Result<()> {
    if updated == 0 {
        return Err(Error::NotFound(format!("{what} {id}")));
    }
    Ok(())
}

/// Sets or clears the explicit cover of a tree album.
pub fn set_cover(conn: &Connection, album_id: i64, photo_id: Option<i64>) -> Result<()> {
    let updated = conn.execute("UPDATE albums SET cover_id = ?1 WHERE id = ?2", params![photo_id, album_id])?;
    expect_updated(updated, "album", album_id)
}

/// Publishes or hides an album; a non-empty `password` is hashed, `None` or
/// an empty string removes the password.
pub fn set_protection(conn: &Connection, album_id: i64, is_public: bool, password: Option<&str>) -> Result<()> {
    let hash = match password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hashing::hash_password(password)?),
        None => None,
    };
    let updated = conn.execute(
        "UPDATE albums SET is_public = ?1, password = ?2 WHERE id = ?3",
        params![is_public, hash, album_id],
    )?;
    expect_updated(updated, "album", album_id)
}

pub fn set_license(conn: &Connection, album_id: i64, license: &str) -> Result<()> {
    let updated = conn.execute("UPDATE albums SET license = ?1 WHERE id = ?2", params![license, album_id])?;
    expect_updated(updated, "album", album_id)
}

/// Overrides the photo order of one album; `None` restores the gallery default.
pub fn set_photo_sorting(conn: &Connection, album_id: i64, sorting: Option<PhotoSorting>) -> Result<()> {
    let (column, order) = match sorting {
        Some(s) => (Some(s.column.column_name().to_string()), Some(s.order.as_sql().to_string())),
        None => (None, None),
    };
    let updated = conn.execute(
        "UPDATE albums SET sorting_col = ?1, sorting_order = ?2 WHERE id = ?3",
        params![column, order, album_id],
    )?;
    expect_updated(updated, "album", album_id)
}

impl Sortable<AlbumColumn> for Album {
    fn sort_id(&self) -> i64 {
        self.id
    }

    fn sort_text(&self, column: AlbumColumn) -> Option<&str> {
        match column {
            AlbumColumn::Title => Some(&self.title),
            AlbumColumn::Description => self.description.as_deref(),
            _ => None,
        }
    }
}

impl Sortable<AlbumColumn> for TagAlbum {
    fn sort_id(&self) -> i64 {
        self.id
    }

    fn sort_text(&self, column: AlbumColumn) -> Option<&str> {
        match column {
            AlbumColumn::Title => Some(&self.title),
            AlbumColumn::Description => self.description.as_deref(),
            _ => None,
        }
    }
}

impl Sortable<PhotoColumn> for Photo {
    fn sort_id(&self) -> i64 {
        self.id
    }

    fn sort_text(&self, column: PhotoColumn) -> Option<&str> {
        match column {
            PhotoColumn::Title => Some(&self.title),
            PhotoColumn::Description => self.description.as_deref(),
            _ => None,
        }
    }
}

/// Virtual albums computed from photo attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartAlbum {
    Starred,
    Recent,
    Unsorted,
}

impl SmartAlbum {
    pub const ALL: [SmartAlbum; 3] = [SmartAlbum::Unsorted, SmartAlbum::Starred, SmartAlbum::Recent];

    pub fn title(&self) -> &'static str {
        match self {
            SmartAlbum::Starred => "Starred",
            SmartAlbum::Recent => "Recent",
            SmartAlbum::Unsorted => "Unsorted",
        }
    }

    /// Membership and visibility over photo `p` with album `pa`.
    pub fn filter(&self, session: &Session, settings: &Settings) -> SqlFilter {
        let access = AccessFilter::new(session);
        match self {
            SmartAlbum::Starred => SqlFilter::raw("p.is_starred = 1").and(access.photo_searchable("p", "pa")),
            SmartAlbum::Recent => {
                let age = settings.recent_age.max(0).saturating_mul(SECONDS_PER_DAY);
                let cutoff = chrono::Utc::now().timestamp().saturating_sub(age);
                SqlFilter::new("p.created_at >= ?", vec![Value::Integer(cutoff)]).and(access.photo_searchable("p", "pa"))
            }
            SmartAlbum::Unsorted => {
                let unsorted = SqlFilter::raw("p.album_id IS NULL");
                match session.actor() {
                    Actor::Admin { .. } => unsorted,
                    Actor::User { id } => unsorted.and(SqlFilter::new("p.owner_id = ?", vec![Value::Integer(id)])),
                    Actor::Anonymous => SqlFilter::never(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "album", rename_all = "snake_case")]
pub enum AnyAlbum {
    Tree(Album),
    Tag(TagAlbum),
    Smart(SmartAlbum),
}

impl AnyAlbum {
    pub fn title(&self) -> &str {
        match self {
            AnyAlbum::Tree(album) => &album.title,
            AnyAlbum::Tag(album) => &album.title,
            AnyAlbum::Smart(smart) => smart.title(),
        }
    }

    /// Photos shown inside the album, in display order.
    pub fn photos(&self, conn: &Connection, session: &Session, settings: &Settings) -> Result<Vec<Photo>> {
        let access = AccessFilter::new(session);
        let mut query = QueryBuilder::new(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos p LEFT JOIN albums pa ON pa.id = p.album_id WHERE "
        ));
        let sorting = match self {
            AnyAlbum::Tree(album) => {
                query
                    .push("p.album_id = ")
                    .bind(album.id)
                    .push(" AND ")
                    .push_filter(&access.photo_visible("p", "pa"));
                album.photo_sorting.unwrap_or(settings.photo_sorting)
            }
            AnyAlbum::Tag(album) => {
                let matches = tag_match("ta", "p");
                query
                    .push("EXISTS (SELECT 1 FROM tag_albums ta WHERE ta.id = ")
                    .bind(album.id)
                    .push(" AND ")
                    .push_filter(&matches)
                    .push(") AND ")
                    .push_filter(&access.photo_searchable("p", "pa"));
                settings.photo_sorting
            }
            AnyAlbum::Smart(smart) => {
                query.push_filter(&smart.filter(session, settings));
                settings.photo_sorting
            }
        };
        SortingDecorator::new(sorting).fetch(conn, query, "p", Photo::from_row)
    }

    /// Owners and admins may always download; others follow the album flag.
    pub fn is_downloadable(&self, session: &Session, settings: &Settings) -> bool {
        let actor = session.actor();
        match self {
            AnyAlbum::Tree(album) => actor.owns(album.owner_id) || album.is_downloadable,
            AnyAlbum::Tag(album) => actor.owns(album.owner_id) || album.is_downloadable,
            AnyAlbum::Smart(_) => actor.is_admin() || settings.downloadable,
        }
    }

    /// Smart albums are listed for logged-in users only.
    pub fn is_visible(&self, conn: &Connection, session: &Session) -> Result<bool> {
        let access = AccessFilter::new(session);
        match self {
            AnyAlbum::Tree(album) => access.is_album_accessible(conn, album.id),
            AnyAlbum::Tag(album) => access.is_tag_album_accessible(conn, album.id),
            AnyAlbum::Smart(_) => Ok(session.actor().is_logged_in()),
        }
    }
}

impl Sortable<AlbumColumn> for AnyAlbum {
    fn sort_id(&self) -> i64 {
        match self {
            AnyAlbum::Tree(album) => album.id,
            AnyAlbum::Tag(album) => album.id,
            AnyAlbum::Smart(_) => 0,
        }
    }

    fn sort_text(&self, column: AlbumColumn) -> Option<&str> {
        match self {
            AnyAlbum::Tree(album) => album.sort_text(column),
            AnyAlbum::Tag(album) => album.sort_text(column),
            AnyAlbum::Smart(smart) => matches!(column, AlbumColumn::Title).then(|| smart.title()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub album: AnyAlbum,
    pub thumb: Option<Thumb>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopAlbums {
    pub smart_albums: Vec<AlbumSummary>,
    pub tag_albums: Vec<AlbumSummary>,
    pub albums: Vec<AlbumSummary>,
    pub shared_albums: Vec<AlbumSummary>,
}

/// Accessible tree albums matching `filter`, in the gallery album order.
pub(crate) fn list_albums(conn: &Connection, session: &Session, settings: &Settings, filter: &SqlFilter) -> Result<Vec<Album>> {
    let mut query = QueryBuilder::new(&format!("SELECT {ALBUM_COLUMNS} FROM albums a WHERE "));
    query
        .push_filter(filter)
        .push(" AND ")
        .push_filter(&AccessFilter::new(session).album_accessible("a"));
    SortingDecorator::new(settings.album_sorting).fetch(conn, query, "a", Album::from_row)
}

fn list_tag_albums(conn: &Connection, session: &Session, settings: &Settings) -> Result<Vec<TagAlbum>> {
    let mut query = QueryBuilder::new(&format!("SELECT {TAG_ALBUM_COLUMNS} FROM tag_albums ta WHERE "));
    query.push_filter(&AccessFilter::new(session).tag_album_accessible("ta"));
    SortingDecorator::new(settings.album_sorting).fetch(conn, query, "ta", TagAlbum::from_row)
}

/// Smart albums, accessible tag albums and accessible root albums. Roots are
/// split into the actor's own and everybody else's.
pub fn top_albums(conn: &Connection, session: &Session, settings: &Settings) -> Result<TopAlbums> {
    let resolver = ThumbResolver::new(conn, session, settings.photo_sorting, settings.thumb_strategy);
    let mut top = TopAlbums::default();

    for smart in SmartAlbum::ALL {
        let album = AnyAlbum::Smart(smart);
        if !album.is_visible(conn, session)? {
            continue;
        }
        let thumb = resolver.best_of(&smart.filter(session, settings))?;
        top.smart_albums.push(AlbumSummary { album, thumb });
    }

    let tag_albums = list_tag_albums(conn, session, settings)?;
    let tag_ids: Vec<i64> = tag_albums.iter().map(|a| a.id).collect();
    let mut tag_thumbs = resolver.resolve_tag_albums(&tag_ids)?;
    top.tag_albums = tag_albums
        .into_iter()
        .map(|album| AlbumSummary {
            thumb: tag_thumbs.remove(&album.id).flatten(),
            album: AnyAlbum::Tag(album),
        })
        .collect();

    let roots = list_albums(conn, session, settings, &SqlFilter::raw("a.parent_id IS NULL"))?;
    let root_ids: Vec<i64> = roots.iter().map(|a| a.id).collect();
    let mut thumbs = resolver.resolve(&root_ids)?;
    let actor = session.actor();
    for album in roots {
        let shared = actor.is_logged_in() && actor.user_id() != Some(album.owner_id);
        let summary = AlbumSummary {
            thumb: thumbs.remove(&album.id).flatten(),
            album: AnyAlbum::Tree(album),
        };
        if shared {
            top.shared_albums.push(summary);
        } else {
            top.albums.push(summary);
        }
    }

    log::debug!(
        "Top albums: {} smart, {} tag, {} own, {} shared",
        top.smart_albums.len(),
        top.tag_albums.len(),
        top.albums.len(),
        top.shared_albums.len()
    );
    Ok(top)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumView {
    pub album: Album,
    pub thumb: Option<Thumb>,
    pub license: String,
    pub is_downloadable: bool,
    pub children: Vec<AlbumSummary>,
    pub photos: Vec<Photo>,
}

/// One tree album with its accessible children and visible photos.
pub fn get_album(conn: &Connection, session: &Session, settings: &Settings, album_id: i64) -> Result<AlbumView> {
    let album = find_album(conn, album_id)?.ok_or_else(|| Error::NotFound(format!("album {album_id}")))?;
    let access = AccessFilter::new(session);
    if !access.is_album_accessible(conn, album_id)? {
        return Err(Error::Forbidden(format!("album {album_id}")));
    }

    let children = list_albums(
        conn,
        session,
        settings,
        &SqlFilter::new("a.parent_id = ?", vec![Value::Integer(album_id)]),
    )?;
    let mut ids: Vec<i64> = children.iter().map(|a| a.id).collect();
    ids.push(album_id);
    let mut thumbs = ThumbResolver::new(conn, session, settings.photo_sorting, settings.thumb_strategy).resolve(&ids)?;

    let any = AnyAlbum::Tree(album.clone());
    let photos = any.photos(conn, session, settings)?;
    let is_downloadable = any.is_downloadable(session, settings);

    Ok(AlbumView {
        thumb: thumbs.remove(&album_id).flatten(),
        license: album.effective_license(&settings.default_license).to_string(),
        is_downloadable,
        children: children
            .into_iter()
            .map(|child| AlbumSummary {
                thumb: thumbs.remove(&child.id).flatten(),
                album: AnyAlbum::Tree(child),
            })
            .collect(),
        photos,
        album,
    })
}
