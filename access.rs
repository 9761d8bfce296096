//! Authorization predicates over albums and photos.
//!
//! Every function here only composes SQL; nothing is executed except in the
//! `is_*` convenience checks. Lacking access never raises an error, the rows
//! simply drop out of the result.

use crate::error::Result;
use crate::query::{QueryBuilder, SqlFilter};
use crate::session::{Actor, Session};
use rusqlite::types::Value;
use rusqlite::Connection;

pub struct AccessFilter<'a> {
    session: &'a Session,
}

impl<'a> AccessFilter<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn actor(&self) -> Actor {
        self.session.actor()
    }

    /// The tree album row at `alias` may be browsed by the actor.
    pub fn album_accessible(&self, alias: &str) -> SqlFilter {
        self.protected(alias, &self.session.unlocked_tree_ids())
    }

    /// The tag album row at `alias` may be browsed by the actor.
    pub fn tag_album_accessible(&self, alias: &str) -> SqlFilter {
        self.protected(alias, &self.session.unlocked_tag_ids())
    }

    /// Accessible, and so is every ancestor. Albums hidden below a private or
    /// locked album are not reachable and therefore not searchable.
    pub fn album_reachable(&self, alias: &str) -> SqlFilter {
        self.reachable(alias, None)
    }

    /// Accessible, and so is every ancestor strictly below the album at
    /// `root`. Ancestors at or above `root` are not checked.
    pub fn album_reachable_below(&self, alias: &str, root: &str) -> SqlFilter {
        self.reachable(alias, Some(root))
    }

    fn reachable(&self, alias: &str, root: Option<&str>) -> SqlFilter {
        if self.actor().is_admin() {
            return SqlFilter::always();
        }
        let anc = format!("{alias}_anc");
        let bound = root
            .map(|root| format!(" AND {anc}._lft > {root}._lft AND {anc}._rgt < {root}._rgt"))
            .unwrap_or_default();
        let blocked = self.album_accessible(&anc).not();
        let hidden_ancestor = SqlFilter::new(
            format!(
                "EXISTS (SELECT 1 FROM albums {anc} WHERE {anc}._lft < {alias}._lft AND {anc}._rgt > {alias}._rgt{bound} AND {})",
                blocked.clause()
            ),
            blocked.params().to_vec(),
        );
        self.album_accessible(alias).and(hidden_ancestor.not())
    }

    /// Photo at `photo` (with its album LEFT JOINed as `album`) may be seen.
    /// Unsorted photos are only visible to their owner.
    pub fn photo_visible(&self, photo: &str, album: &str) -> SqlFilter {
        let in_album = SqlFilter::raw(format!("{photo}.album_id IS NOT NULL"));
        self.photo_rule(photo, in_album.and(self.album_accessible(album)))
    }

    /// Like [`photo_visible`](Self::photo_visible) but the album must be reachable.
    pub fn photo_searchable(&self, photo: &str, album: &str) -> SqlFilter {
        let in_album = SqlFilter::raw(format!("{photo}.album_id IS NOT NULL"));
        self.photo_rule(photo, in_album.and(self.album_reachable(album)))
    }

    /// Like [`photo_visible`](Self::photo_visible) for a photo somewhere below
    /// the album at `root`: no album between `root` and the photo may be
    /// private or locked.
    pub fn photo_visible_below(&self, photo: &str, album: &str, root: &str) -> SqlFilter {
        let in_album = SqlFilter::raw(format!("{photo}.album_id IS NOT NULL"));
        self.photo_rule(photo, in_album.and(self.album_reachable_below(album, root)))
    }

    /// Public albums with a password: candidates for the unlock flow.
    pub fn album_unlockable(alias: &str) -> SqlFilter {
        SqlFilter::raw(format!("{alias}.is_public = 1 AND {alias}.password IS NOT NULL"))
    }

    pub fn is_album_accessible(&self, conn: &Connection, album_id: i64) -> Result<bool> {
        self.check(conn, "albums", album_id, self.album_accessible("a"))
    }

    pub fn is_tag_album_accessible(&self, conn: &Connection, tag_album_id: i64) -> Result<bool> {
        self.check(conn, "tag_albums", tag_album_id, self.tag_album_accessible("a"))
    }

    pub fn is_photo_visible(&self, conn: &Connection, photo_id: i64) -> Result<bool> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM photos p LEFT JOIN albums pa ON pa.id = p.album_id WHERE p.id = ");
        query.bind(photo_id).push(" AND ").push_filter(&self.photo_visible("p", "pa"));
        let counts = query.query_map(conn, |row| row.get::<_, i64>(0))?;
        Ok(counts.first().copied().unwrap_or(0) > 0)
    }

    fn photo_rule(&self, photo: &str, via_album: SqlFilter) -> SqlFilter {
        match self.actor() {
            Actor::Admin { .. } => SqlFilter::always(),
            Actor::User { id } => SqlFilter::new(format!("{photo}.owner_id = ?"), vec![Value::Integer(id)]).or(via_album),
            Actor::Anonymous => via_album,
        }
    }

    fn protected(&self, alias: &str, unlocked: &[i64]) -> SqlFilter {
        let open = SqlFilter::raw(format!("{alias}.password IS NULL"))
            .or(SqlFilter::in_list(&format!("{alias}.id"), unlocked));
        let public = SqlFilter::raw(format!("{alias}.is_public = 1")).and(open);
        match self.actor() {
            Actor::Admin { .. } => SqlFilter::always(),
            Actor::User { id } => SqlFilter::new(format!("{alias}.owner_id = ?"), vec![Value::Integer(id)]).or(public),
            Actor::Anonymous => public,
        }
    }

    fn check(&self, conn: &Connection, table: &str, id: i64, filter: SqlFilter) -> Result<bool> {
        let mut query = QueryBuilder::new(&format!("SELECT COUNT(*) FROM {table} a WHERE a.id = "));
        query.bind(id).push(" AND ").push_filter(&filter);
        let counts = query.query_map(conn, |row| row.get::<_, i64>(0))?;
        Ok(counts.first().copied().unwrap_or(0) > 0)
    }
}
