use crate::error::Error;
use crate::sorting::{parse_sorting, PhotoSorting};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub may_administrate: bool,
}

/// Column list matching [`Album::from_row`]; expects the alias `a`.
pub(crate) const ALBUM_COLUMNS: &str = "a.id, a.parent_id, a._lft, a._rgt, a.cover_id, a.title, a.description, \
     a.license, a.is_public, a.is_downloadable, a.password, a.owner_id, a.sorting_col, a.sorting_order, a.created_at";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Album {
    pub id: i64,
    pub parent_id: Option<i64>,
    #[serde(rename = "_lft")]
    pub lft: i64,
    #[serde(rename = "_rgt")]
    pub rgt: i64,
    pub cover_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub license: String,
    pub is_public: bool,
    pub is_downloadable: bool,
    #[serde(skip)]
    pub password: Option<String>,
    pub owner_id: i64,
    pub photo_sorting: Option<PhotoSorting>,
    pub created_at: i64,
}

impl Album {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let sorting_col: Option<String> = row.get(12)?;
        let sorting_order: Option<String> = row.get(13)?;
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            lft: row.get(2)?,
            rgt: row.get(3)?,
            cover_id: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            license: row.get(7)?,
            is_public: row.get(8)?,
            is_downloadable: row.get(9)?,
            password: row.get(10)?,
            owner_id: row.get(11)?,
            photo_sorting: parse_sorting(sorting_col.as_deref(), sorting_order.as_deref()),
            created_at: row.get(14)?,
        })
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// True when `other` lies strictly inside this album's interval.
    pub fn contains(&self, other: &Album) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    /// The album license, or `default_license` when none is set.
    pub fn effective_license<'a>(&'a self, default_license: &'a str) -> &'a str {
        if self.license.is_empty() || self.license == "none" {
            default_license
        } else {
            &self.license
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAlbum {
    pub parent_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub license: Option<String>,
    pub is_public: bool,
    pub is_downloadable: bool,
    pub owner_id: i64,
}

/// Column list matching [`TagAlbum::from_row`]; expects the alias `ta`.
pub(crate) const TAG_ALBUM_COLUMNS: &str = "ta.id, ta.title, ta.description, ta.is_public, ta.is_downloadable, \
     ta.password, ta.owner_id, ta.created_at, \
     (SELECT GROUP_CONCAT(tat.tag, ',') FROM tag_album_tags tat WHERE tat.tag_album_id = ta.id)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagAlbum {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub show_tags: Vec<String>,
    pub is_public: bool,
    pub is_downloadable: bool,
    #[serde(skip)]
    pub password: Option<String>,
    pub owner_id: i64,
    pub created_at: i64,
}

impl TagAlbum {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags: Option<String> = row.get(8)?;
        let mut show_tags: Vec<String> = tags
            .unwrap_or_default()
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        show_tags.sort();
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            is_public: row.get(3)?,
            is_downloadable: row.get(4)?,
            password: row.get(5)?,
            owner_id: row.get(6)?,
            created_at: row.get(7)?,
            show_tags,
        })
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTagAlbum {
    pub title: String,
    pub description: Option<String>,
    pub show_tags: Vec<String>,
    pub is_public: bool,
    pub is_downloadable: bool,
    pub owner_id: i64,
}

/// Column list matching [`Photo::from_row`]; expects the alias `p`.
pub(crate) const PHOTO_COLUMNS: &str =
    "p.id, p.album_id, p.owner_id, p.title, p.description, p.type, p.is_starred, p.taken_at, p.created_at";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: i64,
    pub album_id: Option<i64>,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub photo_type: String,
    pub is_starred: bool,
    pub taken_at: Option<i64>,
    pub created_at: i64,
}

impl Photo {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            album_id: row.get(1)?,
            owner_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            photo_type: row.get(5)?,
            is_starred: row.get(6)?,
            taken_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub album_id: Option<i64>,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub photo_type: String,
    pub is_starred: bool,
    pub taken_at: Option<i64>,
    /// Defaults to the insertion time.
    pub created_at: Option<i64>,
    pub tags: Vec<String>,
    pub size_variants: Vec<NewSizeVariant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeVariantKind {
    Original,
    Medium2x,
    Medium,
    Small2x,
    Small,
    Thumb2x,
    Thumb,
}

impl SizeVariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeVariantKind::Original => "original",
            SizeVariantKind::Medium2x => "medium2x",
            SizeVariantKind::Medium => "medium",
            SizeVariantKind::Small2x => "small2x",
            SizeVariantKind::Small => "small",
            SizeVariantKind::Thumb2x => "thumb2x",
            SizeVariantKind::Thumb => "thumb",
        }
    }
}

impl fmt::Display for SizeVariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeVariantKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(SizeVariantKind::Original),
            "medium2x" => Ok(SizeVariantKind::Medium2x),
            "medium" => Ok(SizeVariantKind::Medium),
            "small2x" => Ok(SizeVariantKind::Small2x),
            "small" => Ok(SizeVariantKind::Small),
            "thumb2x" => Ok(SizeVariantKind::Thumb2x),
            "thumb" => Ok(SizeVariantKind::Thumb),
            other => Err(Error::InvalidValue(format!("unknown size variant '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeVariant {
    pub id: i64,
    pub photo_id: i64,
    pub kind: SizeVariantKind,
    pub path: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSizeVariant {
    pub kind: SizeVariantKind,
    pub path: String,
    pub width: i64,
    pub height: i64,
}

/// Representative photo of an album; computed on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thumb {
    pub photo_id: i64,
    #[serde(rename = "type")]
    pub photo_type: String,
}
