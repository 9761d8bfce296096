use crate::error::{Error, Result};
use crate::models::User;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub fn find_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, username, may_administrate FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    may_administrate: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Who is asking. Authentication happens outside this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    #[default]
    Anonymous,
    User { id: i64 },
    Admin { id: i64 },
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        if user.may_administrate {
            Actor::Admin { id: user.id }
        } else {
            Actor::User { id: user.id }
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::Anonymous => None,
            Actor::User { id } | Actor::Admin { id } => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin { .. })
    }

    pub fn is_logged_in(&self) -> bool {
        !matches!(self, Actor::Anonymous)
    }

    /// Admins and owners may do anything with a resource.
    pub fn owns(&self, owner_id: i64) -> bool {
        self.is_admin() || self.user_id() == Some(owner_id)
    }
}

/// Identifies an album across the two disjoint id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AlbumRef {
    Tree(i64),
    Tag(i64),
}

/// Per-request context: the actor plus albums unlocked during this session.
///
/// Unlock state is never persisted; the host keeps this object in its own
/// session store between requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    actor: Actor,
    unlocked: HashSet<AlbumRef>,
}

impl Session {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            unlocked: HashSet::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Actor::Anonymous)
    }

    /// Fresh session for a stored user.
    pub fn for_user(conn: &Connection, user_id: i64) -> Result<Self> {
        let user = find_user(conn, user_id)?.ok_or_else(|| Error::NotFound(format!("user {user_id}")))?;
        Ok(Self::new(Actor::from_user(&user)))
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn unlock(&mut self, album: AlbumRef) -> bool {
        self.unlocked.insert(album)
    }

    pub fn is_unlocked(&self, album: AlbumRef) -> bool {
        self.unlocked.contains(&album)
    }

    pub fn clear_unlocks(&mut self) {
        self.unlocked.clear();
    }

    /// Unlocked tree album ids, sorted for stable SQL.
    pub fn unlocked_tree_ids(&self) -> Vec<i64> {
        self.sorted_ids(|r| match r {
            AlbumRef::Tree(id) => Some(*id),
            AlbumRef::Tag(_) => None,
        })
    }

    /// Unlocked tag album ids, sorted for stable SQL.
    pub fn unlocked_tag_ids(&self) -> Vec<i64> {
        self.sorted_ids(|r| match r {
            AlbumRef::Tag(id) => Some(*id),
            AlbumRef::Tree(_) => None,
        })
    }

    fn sorted_ids(&self, pick: impl Fn(&AlbumRef) -> Option<i64>) -> Vec<i64> {
        let mut ids: Vec<i64> = self.unlocked.iter().filter_map(pick).collect();
        ids.sort_unstable();
        ids
    }
}
