use crate::error::{Error, Result};
use crate::models::{NewPhoto, Photo, SizeVariant, SizeVariantKind, PHOTO_COLUMNS};
use crate::query::{QueryBuilder, SqlFilter};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Trims tags, splits comma lists and drops empties and duplicates.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .flat_map(|t| t.split(','))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Inserts a photo with its tags and size variants.
pub fn add_photo(conn: &Connection, new: &NewPhoto) -> Result<Photo> {
    let created_at = new.created_at.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO photos (album_id, owner_id, title, description, type, is_starred, taken_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new.album_id,
            new.owner_id,
            new.title,
            new.description,
            new.photo_type,
            new.is_starred,
            new.taken_at,
            created_at
        ],
    )?;
    let id = tx.last_insert_rowid();

    for tag in normalize_tags(&new.tags) {
        tx.execute("INSERT INTO photo_tags (photo_id, tag) VALUES (?1, ?2)", params![id, tag])?;
    }
    for variant in &new.size_variants {
        tx.execute(
            "INSERT INTO size_variants (photo_id, kind, path, width, height) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, variant.kind.as_str(), variant.path, variant.width, variant.height],
        )?;
    }
    tx.commit()?;

    get_photo(conn, id)?.ok_or_else(|| Error::NotFound(format!("photo {id}")))
}

pub fn get_photo(conn: &Connection, id: i64) -> Result<Option<Photo>> {
    let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos p WHERE p.id = ?1");
    Ok(conn.query_row(&sql, params![id], Photo::from_row).optional()?)
}

pub fn set_starred(conn: &Connection, id: i64, starred: bool) -> Result<()> {
    let updated = conn.execute("UPDATE photos SET is_starred = ?1 WHERE id = ?2", params![starred, id])?;
    if updated == 0 {
        return Err(Error::NotFound(format!("photo {id}")));
    }
    Ok(())
}

/// Tags of a photo, sorted.
pub fn photo_tags(conn: &Connection, id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM photo_tags WHERE photo_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}

/// One size variant per photo, fetched in a single batch.
pub fn size_variants_for(conn: &Connection, photo_ids: &[i64], kind: SizeVariantKind) -> Result<HashMap<i64, SizeVariant>> {
    let mut out = HashMap::new();
    for chunk in photo_ids.chunks(crate::db::MAX_BATCH_SIZE) {
        let mut query = QueryBuilder::new("SELECT id, photo_id, path, width, height FROM size_variants WHERE kind = ");
        query
            .bind(kind.as_str().to_string())
            .push(" AND ")
            .push_filter(&SqlFilter::in_list("photo_id", chunk));
        let rows = query.query_map(conn, |row| {
            Ok(SizeVariant {
                id: row.get(0)?,
                photo_id: row.get(1)?,
                kind,
                path: row.get(2)?,
                width: row.get(3)?,
                height: row.get(4)?,
            })
        })?;
        for variant in rows {
            out.insert(variant.photo_id, variant);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn tags_are_normalized() {
        let tags = vec!["  cat ".to_string(), "dog,cat".to_string(), "".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["cat", "dog"]);
    }

    #[test]
    fn add_photo_stores_tags_and_variants() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let id = fx.tagged_photo(None, owner, "tagged", &["b", "a"]);
        assert_eq!(photo_tags(&fx.conn, id).unwrap(), vec!["a", "b"]);

        let other = fx.photo_at(None, owner, "file", "/tmp/orig.jpg");
        let variants = size_variants_for(&fx.conn, &[id, other], SizeVariantKind::Original).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[&other].path, "/tmp/orig.jpg");
    }

    #[test]
    fn starring_missing_photo_fails() {
        let fx = Fixture::new();
        let owner = fx.user("alice");
        let id = fx.photo(None, owner, "p", false, 1);
        set_starred(&fx.conn, id, true).unwrap();
        assert!(get_photo(&fx.conn, id).unwrap().unwrap().is_starred);
        assert!(matches!(set_starred(&fx.conn, 999, true), Err(Error::NotFound(_))));
    }
}
