//! Password unlock of protected albums.
//!
//! Unlock state is kept only in the [`Session`]; nothing is persisted.

use crate::access::AccessFilter;
use crate::albums::{find_album, find_tag_album};
use crate::error::{Error, Result};
use crate::hashing::verify_password;
use crate::query::QueryBuilder;
use crate::session::{AlbumRef, Session};
use rusqlite::Connection;

/// Unlocks `album` when `password` matches, together with every other
/// unlockable album sharing that password.
///
/// Returns `Ok(false)` for a wrong password or an album that is not both
/// public and password protected.
pub fn unlock(conn: &Connection, session: &mut Session, album: AlbumRef, password: &str) -> Result<bool> {
    let (is_public, hash) = match album {
        AlbumRef::Tree(id) => {
            let album = find_album(conn, id)?.ok_or_else(|| Error::NotFound(format!("album {id}")))?;
            (album.is_public, album.password)
        }
        AlbumRef::Tag(id) => {
            let album = find_tag_album(conn, id)?.ok_or_else(|| Error::NotFound(format!("tag album {id}")))?;
            (album.is_public, album.password)
        }
    };

    let Some(hash) = hash.filter(|_| is_public) else {
        log::debug!("{album:?} is not password protected");
        return Ok(false);
    };
    if !verify_password(password, &hash) {
        log::info!("Wrong password for {album:?}");
        return Ok(false);
    }

    session.unlock(album);
    let mut unlocked = 1;
    for (candidate, candidate_hash) in unlockable_albums(conn)? {
        if candidate == album || session.is_unlocked(candidate) {
            continue;
        }
        if verify_password(password, &candidate_hash) {
            session.unlock(candidate);
            unlocked += 1;
        }
    }

    log::info!("Unlocked {unlocked} album(s) starting from {album:?}");
    Ok(true)
}

/// Every public password-protected album with its hash.
fn unlockable_albums(conn: &Connection) -> Result<Vec<(AlbumRef, String)>> {
    let mut trees = QueryBuilder::new("SELECT a.id, a.password FROM albums a WHERE ");
    trees.push_filter(&AccessFilter::album_unlockable("a"));
    let mut out = trees.query_map(conn, |row| Ok((AlbumRef::Tree(row.get(0)?), row.get::<_, String>(1)?)))?;

    let mut tags = QueryBuilder::new("SELECT ta.id, ta.password FROM tag_albums ta WHERE ");
    tags.push_filter(&AccessFilter::album_unlockable("ta"));
    out.extend(tags.query_map(conn, |row| Ok((AlbumRef::Tag(row.get(0)?), row.get::<_, String>(1)?)))?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::albums::set_protection;
    use crate::hashing::hash_password;
    use crate::testing::Fixture;
    use rusqlite::params;

    #[test]
    fn correct_password_unlocks_album_and_siblings() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let first = fx.protected_album(None, "First", owner, "shared");
        let second = fx.protected_album(None, "Second", owner, "shared");
        let other = fx.protected_album(None, "Other", owner, "different");
        let tag = fx.tag_album("Tagged", owner, &["x"], true);
        fx.conn
            .execute(
                "UPDATE tag_albums SET password = ?1 WHERE id = ?2",
                params![hash_password("shared").unwrap(), tag],
            )
            .unwrap();

        let mut session = Session::anonymous();
        assert!(unlock(&fx.conn, &mut session, AlbumRef::Tree(first), "shared").unwrap());
        assert!(session.is_unlocked(AlbumRef::Tree(first)));
        assert!(session.is_unlocked(AlbumRef::Tree(second)));
        assert!(session.is_unlocked(AlbumRef::Tag(tag)));
        assert!(!session.is_unlocked(AlbumRef::Tree(other)));
        assert!(AccessFilter::new(&session).is_album_accessible(&fx.conn, second).unwrap());
    }

    #[test]
    fn wrong_password_changes_nothing() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let album = fx.protected_album(None, "Locked", owner, "right");

        let mut session = Session::anonymous();
        assert!(!unlock(&fx.conn, &mut session, AlbumRef::Tree(album), "wrong").unwrap());
        assert!(!session.is_unlocked(AlbumRef::Tree(album)));
    }

    #[test]
    fn unprotected_or_private_albums_are_not_unlockable() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let open = fx.public_album(None, "Open", owner);
        let private = fx.album(None, "Private", owner);
        set_protection(&fx.conn, private, false, Some("pw")).unwrap();

        let mut session = Session::anonymous();
        assert!(!unlock(&fx.conn, &mut session, AlbumRef::Tree(open), "pw").unwrap());
        assert!(!unlock(&fx.conn, &mut session, AlbumRef::Tree(private), "pw").unwrap());
        assert!(!session.is_unlocked(AlbumRef::Tree(private)));
    }

    #[test]
    fn missing_album_is_an_error() {
        let fx = Fixture::new();
        let mut session = Session::anonymous();
        assert!(matches!(
            unlock(&fx.conn, &mut session, AlbumRef::Tree(42), "pw"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            unlock(&fx.conn, &mut session, AlbumRef::Tag(42), "pw"),
            Err(Error::NotFound(_))
        ));
    }
}
