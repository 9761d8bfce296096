//! Batched thumbnail resolution.
//!
//! Albums without an explicit cover are represented by their best visible
//! descendant photo: starred first, then the configured photo order, then id.
//! The number of queries depends on the batch count, never on the number of
//! albums.

use crate::access::AccessFilter;
use crate::db::MAX_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::models::Thumb;
use crate::query::{QueryBuilder, SqlFilter};
use crate::session::Session;
use crate::sorting::PhotoSorting;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// How the best descendant photo is selected.
///
/// `Correlated` re-runs a ranking subquery per album row and works on any SQL
/// engine. `Window` joins all candidates once and keeps rank 1 via
/// `ROW_NUMBER()`. Both yield identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbStrategy {
    #[default]
    Correlated,
    Window,
}

impl FromStr for ThumbStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "correlated" => Ok(ThumbStrategy::Correlated),
            "window" => Ok(ThumbStrategy::Window),
            other => Err(Error::InvalidValue(format!("unknown thumb strategy '{other}'"))),
        }
    }
}

pub struct ThumbResolver<'a> {
    conn: &'a Connection,
    session: &'a Session,
    sorting: PhotoSorting,
    strategy: ThumbStrategy,
}

impl<'a> ThumbResolver<'a> {
    pub fn new(conn: &'a Connection, session: &'a Session, sorting: PhotoSorting, strategy: ThumbStrategy) -> Self {
        Self {
            conn,
            session,
            sorting,
            strategy,
        }
    }

    fn ranking(&self, photo: &str) -> String {
        format!("{photo}.is_starred DESC, {}", self.sorting.order_terms(photo))
    }

    /// Maps every requested tree album id to its thumb, or `None` when the
    /// album is unknown, inaccessible, or has no visible photo.
    pub fn resolve(&self, album_ids: &[i64]) -> Result<HashMap<i64, Option<Thumb>>> {
        let mut thumbs: HashMap<i64, Option<Thumb>> = album_ids.iter().map(|id| (*id, None)).collect();
        let mut ids: Vec<i64> = thumbs.keys().copied().collect();
        ids.sort_unstable();

        let filter = AccessFilter::new(self.session);
        let mut pending = Vec::new();
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            let mut query = QueryBuilder::new("SELECT a.id, a.cover_id, cp.type, CASE WHEN ");
            query
                .push_filter(&filter.album_accessible("a"))
                .push(" THEN 1 ELSE 0 END FROM albums a LEFT JOIN photos cp ON cp.id = a.cover_id WHERE ")
                .push_filter(&SqlFilter::in_list("a.id", chunk));
            let rows = query.query_map(self.conn, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?;

            for (id, cover_id, cover_type, accessible) in rows {
                if !accessible {
                    continue;
                }
                match (cover_id, cover_type) {
                    (Some(photo_id), Some(photo_type)) => {
                        thumbs.insert(id, Some(Thumb { photo_id, photo_type }));
                    }
                    _ => pending.push(id),
                }
            }
        }

        for chunk in pending.chunks(MAX_BATCH_SIZE) {
            let best = match self.strategy {
                ThumbStrategy::Correlated => self.best_correlated(chunk)?,
                ThumbStrategy::Window => self.best_windowed(chunk)?,
            };
            for (album_id, thumb) in best {
                thumbs.insert(album_id, Some(thumb));
            }
        }

        log::debug!(
            "Resolved thumbs for {} album(s), {} by ranking",
            thumbs.len(),
            pending.len()
        );
        Ok(thumbs)
    }

    fn best_correlated(&self, album_ids: &[i64]) -> Result<Vec<(i64, Thumb)>> {
        let filter = AccessFilter::new(self.session);
        let mut query = QueryBuilder::new(
            "SELECT a.id, tp.id, tp.type FROM albums a JOIN photos tp ON tp.id = (\
             SELECT cand.id FROM photos cand JOIN albums cpa ON cpa.id = cand.album_id \
             WHERE cpa._lft >= a._lft AND cpa._rgt <= a._rgt AND ",
        );
        query
            .push_filter(&filter.photo_visible_below("cand", "cpa", "a"))
            .push(" ORDER BY ")
            .push(&self.ranking("cand"))
            .push(" LIMIT 1) WHERE ")
            .push_filter(&SqlFilter::in_list("a.id", album_ids))
            .push(" AND ")
            .push_filter(&filter.album_accessible("a"));
        self.collect(query)
    }

    fn best_windowed(&self, album_ids: &[i64]) -> Result<Vec<(i64, Thumb)>> {
        let filter = AccessFilter::new(self.session);
        let mut query = QueryBuilder::new(
            "SELECT album_id, photo_id, photo_type FROM (\
             SELECT a.id AS album_id, cand.id AS photo_id, cand.type AS photo_type, \
             ROW_NUMBER() OVER (PARTITION BY a.id ORDER BY ",
        );
        query
            .push(&self.ranking("cand"))
            .push(
                ") AS rn FROM albums a \
                 JOIN albums cpa ON cpa._lft >= a._lft AND cpa._rgt <= a._rgt \
                 JOIN photos cand ON cand.album_id = cpa.id WHERE ",
            )
            .push_filter(&SqlFilter::in_list("a.id", album_ids))
            .push(" AND ")
            .push_filter(&filter.album_accessible("a"))
            .push(" AND ")
            .push_filter(&filter.photo_visible_below("cand", "cpa", "a"))
            .push(") ranked WHERE rn = 1");
        self.collect(query)
    }

    fn collect(&self, query: QueryBuilder) -> Result<Vec<(i64, Thumb)>> {
        query.query_map(self.conn, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Thumb {
                    photo_id: row.get(1)?,
                    photo_type: row.get(2)?,
                },
            ))
        })
    }

    /// Thumbs for tag albums: best searchable photo carrying every tag.
    pub fn resolve_tag_albums(&self, tag_album_ids: &[i64]) -> Result<HashMap<i64, Option<Thumb>>> {
        let mut thumbs: HashMap<i64, Option<Thumb>> = tag_album_ids.iter().map(|id| (*id, None)).collect();
        let mut ids: Vec<i64> = thumbs.keys().copied().collect();
        ids.sort_unstable();

        let filter = AccessFilter::new(self.session);
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            let mut query = QueryBuilder::new(
                "SELECT ta.id, tp.id, tp.type FROM tag_albums ta JOIN photos tp ON tp.id = (\
                 SELECT cand.id FROM photos cand LEFT JOIN albums cpa ON cpa.id = cand.album_id WHERE ",
            );
            query
                .push_filter(&tag_match("ta", "cand"))
                .push(" AND ")
                .push_filter(&filter.photo_searchable("cand", "cpa"))
                .push(" ORDER BY ")
                .push(&self.ranking("cand"))
                .push(" LIMIT 1) WHERE ")
                .push_filter(&SqlFilter::in_list("ta.id", chunk))
                .push(" AND ")
                .push_filter(&filter.tag_album_accessible("ta"));
            for (id, thumb) in self.collect(query)? {
                thumbs.insert(id, Some(thumb));
            }
        }
        Ok(thumbs)
    }

    /// Best photo among those matching `filter`, which may reference the
    /// photo as `p` and its album as `pa`.
    pub fn best_of(&self, filter: &SqlFilter) -> Result<Option<Thumb>> {
        let mut query = QueryBuilder::new("SELECT p.id, p.type FROM photos p LEFT JOIN albums pa ON pa.id = p.album_id WHERE ");
        query
            .push_filter(filter)
            .push(" ORDER BY ")
            .push(&self.ranking("p"))
            .push(" LIMIT 1");
        let thumbs = query.query_map(self.conn, |row| {
            Ok(Thumb {
                photo_id: row.get(0)?,
                photo_type: row.get(1)?,
            })
        })?;
        Ok(thumbs.into_iter().next())
    }
}

/// Shorthand for [`ThumbResolver::resolve`].
pub fn resolve_thumbs(
    conn: &Connection,
    session: &Session,
    sorting: PhotoSorting,
    strategy: ThumbStrategy,
    album_ids: &[i64],
) -> Result<HashMap<i64, Option<Thumb>>> {
    ThumbResolver::new(conn, session, sorting, strategy).resolve(album_ids)
}

/// Photo at `photo` carries every tag of the tag album at `tag_album`, and
/// the tag album lists at least one tag.
pub fn tag_match(tag_album: &str, photo: &str) -> SqlFilter {
    SqlFilter::raw(format!(
        "EXISTS (SELECT 1 FROM tag_album_tags tat WHERE tat.tag_album_id = {tag_album}.id) \
         AND NOT EXISTS (SELECT 1 FROM tag_album_tags tat WHERE tat.tag_album_id = {tag_album}.id \
         AND NOT EXISTS (SELECT 1 FROM photo_tags pt WHERE pt.photo_id = {photo}.id AND pt.tag = tat.tag))"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Actor, AlbumRef};
    use crate::sorting::{PhotoColumn, SortOrder, SortingCriterion};
    use crate::testing::Fixture;

    fn newest_first() -> PhotoSorting {
        SortingCriterion::new(PhotoColumn::CreatedAt, SortOrder::Desc)
    }

    fn resolve_both(fx: &Fixture, session: &Session, ids: &[i64]) -> HashMap<i64, Option<Thumb>> {
        let correlated = ThumbResolver::new(&fx.conn, session, newest_first(), ThumbStrategy::Correlated)
            .resolve(ids)
            .unwrap();
        let windowed = ThumbResolver::new(&fx.conn, session, newest_first(), ThumbStrategy::Window)
            .resolve(ids)
            .unwrap();
        assert_eq!(correlated, windowed);
        correlated
    }

    fn photo_of(thumbs: &HashMap<i64, Option<Thumb>>, album: i64) -> Option<i64> {
        thumbs[&album].as_ref().map(|t| t.photo_id)
    }

    #[test]
    fn explicit_cover_wins_over_ranking() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let album = fx.public_album(None, "A", owner);
        let plain = fx.photo(Some(album), owner, "plain", false, 1);
        fx.photo(Some(album), owner, "starred", true, 50);
        fx.set_cover(album, plain);

        let thumbs = resolve_both(&fx, &Session::anonymous(), &[album]);
        assert_eq!(photo_of(&thumbs, album), Some(plain));
        assert_eq!(thumbs[&album].as_ref().unwrap().photo_type, "image/jpeg");
    }

    #[test]
    fn starred_descendant_beats_newer_photo() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let root = fx.public_album(None, "Root", owner);
        let child = fx.public_album(Some(root), "Child", owner);
        let grandchild = fx.public_album(Some(child), "Grandchild", owner);
        fx.photo(Some(root), owner, "newest", false, 300);
        let starred = fx.photo(Some(grandchild), owner, "old star", true, 10);
        let child_newest = fx.photo(Some(child), owner, "child newest", false, 200);

        let thumbs = resolve_both(&fx, &Session::anonymous(), &[root, child, grandchild]);
        assert_eq!(photo_of(&thumbs, root), Some(starred));
        assert_eq!(photo_of(&thumbs, child), Some(starred));
        assert_eq!(photo_of(&thumbs, grandchild), Some(starred));

        fx.conn.execute("UPDATE photos SET is_starred = 0", []).unwrap();
        let thumbs = resolve_both(&fx, &Session::anonymous(), &[child]);
        assert_eq!(photo_of(&thumbs, child), Some(child_newest));
    }

    #[test]
    fn covers_exactly_the_requested_ids() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let empty = fx.public_album(None, "Empty", owner);
        let full = fx.public_album(None, "Full", owner);
        fx.photo(Some(full), owner, "p", false, 1);

        let thumbs = resolve_both(&fx, &Session::anonymous(), &[empty, full, 4242, full]);
        let mut keys: Vec<i64> = thumbs.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![empty, full, 4242]);
        assert_eq!(thumbs[&empty], None);
        assert_eq!(thumbs[&4242], None);
        assert!(thumbs[&full].is_some());
    }

    #[test]
    fn locked_descendants_do_not_leak() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let visitor = fx.user("bob");
        let root = fx.public_album(None, "Root", owner);
        let locked = fx.protected_album(Some(root), "Locked", owner, "pw");
        let private = fx.album(Some(root), "Private", owner);
        let hidden_star = fx.photo(Some(locked), owner, "hidden", true, 5);
        fx.photo(Some(private), owner, "private", true, 6);
        let visible = fx.photo(Some(root), owner, "visible", false, 1);

        let mut session = Session::new(Actor::User { id: visitor });
        let thumbs = resolve_both(&fx, &session, &[root, locked, private]);
        assert_eq!(photo_of(&thumbs, root), Some(visible));
        assert_eq!(thumbs[&locked], None);
        assert_eq!(thumbs[&private], None);

        session.unlock(AlbumRef::Tree(locked));
        let thumbs = resolve_both(&fx, &session, &[root, locked]);
        assert_eq!(photo_of(&thumbs, root), Some(hidden_star));
        assert_eq!(photo_of(&thumbs, locked), Some(hidden_star));

        let owner_session = Session::new(Actor::User { id: owner });
        let thumbs = resolve_both(&fx, &owner_session, &[private]);
        assert!(thumbs[&private].is_some());
    }

    #[test]
    fn cover_of_inaccessible_album_is_withheld() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let private = fx.album(None, "Private", owner);
        let cover = fx.photo(Some(private), owner, "cover", false, 1);
        fx.set_cover(private, cover);

        let thumbs = resolve_both(&fx, &Session::anonymous(), &[private]);
        assert_eq!(thumbs[&private], None);
    }

    #[test]
    fn tag_album_thumb_requires_all_tags() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let album = fx.public_album(None, "Zoo", owner);
        fx.tagged_photo(Some(album), owner, "cat only", &["cat"]);
        let both = fx.tagged_photo(Some(album), owner, "cat and dog", &["cat", "dog"]);
        let tag_album = fx.tag_album("Pets", owner, &["cat", "dog"], true);
        let untagged = fx.tag_album("Nothing", owner, &[], true);

        let session = Session::anonymous();
        let resolver = ThumbResolver::new(&fx.conn, &session, newest_first(), ThumbStrategy::Correlated);
        let thumbs = resolver.resolve_tag_albums(&[tag_album, untagged]).unwrap();
        assert_eq!(photo_of(&thumbs, tag_album), Some(both));
        assert_eq!(thumbs[&untagged], None);
    }

    #[test]
    fn public_album_below_locked_one_does_not_leak_upwards() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let root = fx.public_album(None, "Root", owner);
        let locked = fx.protected_album(Some(root), "Locked", owner, "pw");
        let inner = fx.public_album(Some(locked), "Inner", owner);
        let hidden = fx.tagged_photo(Some(inner), owner, "behind the lock", &["cat"]);
        fx.conn.execute("UPDATE photos SET is_starred = 1 WHERE id = ?1", [hidden]).unwrap();
        let tag_album = fx.tag_album("Cats", owner, &["cat"], true);

        let mut session = Session::anonymous();
        let thumbs = resolve_both(&fx, &session, &[root, locked, inner]);
        assert_eq!(thumbs[&root], None);
        assert_eq!(thumbs[&locked], None);
        // Opened directly, the inner album shows its own photo.
        assert_eq!(photo_of(&thumbs, inner), Some(hidden));

        let shown = fx.photo(Some(root), owner, "shown", false, 1);
        let thumbs = resolve_both(&fx, &session, &[root]);
        assert_eq!(photo_of(&thumbs, root), Some(shown));

        let resolver = ThumbResolver::new(&fx.conn, &session, newest_first(), ThumbStrategy::Correlated);
        assert_eq!(resolver.resolve_tag_albums(&[tag_album]).unwrap()[&tag_album], None);

        session.unlock(AlbumRef::Tree(locked));
        let thumbs = resolve_both(&fx, &session, &[root]);
        assert_eq!(photo_of(&thumbs, root), Some(hidden));
    }
}
