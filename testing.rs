//! Shared fixtures for the unit tests.

use crate::albums;
use crate::db;
use crate::hashing;
use crate::models::{NewAlbum, NewPhoto, NewSizeVariant, NewTagAlbum, SizeVariantKind};
use crate::photos;
use crate::tree;
use rusqlite::{params, Connection};

pub struct Fixture {
    pub conn: Connection,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            conn: db::open_in_memory().unwrap(),
        }
    }

    pub fn user(&self, name: &str) -> i64 {
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", params![name])
            .unwrap();
        self.conn.last_insert_rowid()
    }

    pub fn admin(&self, name: &str) -> i64 {
        self.conn
            .execute("INSERT INTO users (username, may_administrate) VALUES (?1, 1)", params![name])
            .unwrap();
        self.conn.last_insert_rowid()
    }

    fn insert(&self, parent: Option<i64>, title: &str, owner: i64, is_public: bool) -> i64 {
        tree::insert_album(
            &self.conn,
            &NewAlbum {
                parent_id: parent,
                title: title.to_string(),
                is_public,
                owner_id: owner,
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    /// Private album.
    pub fn album(&self, parent: Option<i64>, title: &str, owner: i64) -> i64 {
        self.insert(parent, title, owner, false)
    }

    pub fn public_album(&self, parent: Option<i64>, title: &str, owner: i64) -> i64 {
        self.insert(parent, title, owner, true)
    }

    pub fn protected_album(&self, parent: Option<i64>, title: &str, owner: i64, password: &str) -> i64 {
        let id = self.insert(parent, title, owner, true);
        let hash = hashing::hash_password(password).unwrap();
        self.conn
            .execute("UPDATE albums SET password = ?1 WHERE id = ?2", params![hash, id])
            .unwrap();
        id
    }

    pub fn describe(&self, album: i64, description: &str) {
        self.conn
            .execute("UPDATE albums SET description = ?1 WHERE id = ?2", params![description, album])
            .unwrap();
    }

    pub fn tag_album(&self, title: &str, owner: i64, tags: &[&str], is_public: bool) -> i64 {
        albums::create_tag_album(
            &self.conn,
            &NewTagAlbum {
                title: title.to_string(),
                show_tags: tags.iter().map(|t| t.to_string()).collect(),
                is_public,
                owner_id: owner,
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    pub fn photo(&self, album: Option<i64>, owner: i64, title: &str, starred: bool, created_at: i64) -> i64 {
        self.photo_with(NewPhoto {
            album_id: album,
            owner_id: owner,
            title: title.to_string(),
            photo_type: "image/jpeg".to_string(),
            is_starred: starred,
            created_at: Some(created_at),
            ..Default::default()
        })
    }

    pub fn tagged_photo(&self, album: Option<i64>, owner: i64, title: &str, tags: &[&str]) -> i64 {
        self.photo_with(NewPhoto {
            album_id: album,
            owner_id: owner,
            title: title.to_string(),
            photo_type: "image/png".to_string(),
            created_at: Some(100),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn photo_at(&self, album: Option<i64>, owner: i64, title: &str, original: &str) -> i64 {
        self.photo_with(NewPhoto {
            album_id: album,
            owner_id: owner,
            title: title.to_string(),
            photo_type: "image/jpeg".to_string(),
            created_at: Some(100),
            size_variants: vec![NewSizeVariant {
                kind: SizeVariantKind::Original,
                path: original.to_string(),
                width: 10,
                height: 10,
            }],
            ..Default::default()
        })
    }

    pub fn photo_with(&self, photo: NewPhoto) -> i64 {
        photos::add_photo(&self.conn, &photo).unwrap().id
    }

    pub fn set_cover(&self, album: i64, photo: i64) {
        self.conn
            .execute("UPDATE albums SET cover_id = ?1 WHERE id = ?2", params![photo, album])
            .unwrap();
    }
}
