//! Nested-set positions of tree albums.
//!
//! Every album owns the interval `[_lft, _rgt]`; descendants lie strictly
//! inside it. Bounds are kept contiguous (`1..=2n`) by every mutation here.

use crate::albums;
use crate::error::{Error, Result};
use crate::models::{Album, NewAlbum};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub lft: i64,
    pub rgt: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum TreeDefect {
    InvertedBounds { id: i64, lft: i64, rgt: i64 },
    DuplicateBound { value: i64 },
    MissingParent { id: i64, parent_id: i64 },
    Overlap { id: i64, other: i64 },
    /// The innermost enclosing interval is not the recorded parent.
    WrongParent { id: i64, parent_id: Option<i64>, enclosing: Option<i64> },
}

/// In-memory copy of the album tree used for repair and validation.
#[derive(Debug, Clone, Default)]
pub struct NestedSet {
    nodes: Vec<TreeNode>,
}

impl NestedSet {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT id, parent_id, _lft, _rgt FROM albums ORDER BY _lft, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(TreeNode {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                lft: row.get(2)?,
                rgt: row.get(3)?,
            })
        })?;
        let mut nodes = Vec::new();
        for node in rows {
            nodes.push(node?);
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Recomputes bounds from parent links.
    ///
    /// Siblings keep their current relative order. Nodes whose parent is
    /// missing, and nodes caught in a parent cycle, become roots.
    pub fn rebuild(&self) -> Vec<TreeNode> {
        let mut ordered = self.nodes.clone();
        ordered.sort_by_key(|n| (n.lft, n.id));
        let known: HashSet<i64> = ordered.iter().map(|n| n.id).collect();

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut roots = Vec::new();
        for node in &ordered {
            match node.parent_id {
                Some(parent) if parent != node.id && known.contains(&parent) => {
                    children.entry(parent).or_default().push(node.id)
                }
                _ => roots.push(node.id),
            }
        }

        let mut bounds: HashMap<i64, (i64, i64)> = HashMap::new();
        let mut counter = 1;
        let mut detached = HashSet::new();
        for root in &roots {
            assign_bounds(*root, &children, &mut bounds, &mut counter);
        }
        for node in &ordered {
            if !bounds.contains_key(&node.id) {
                detached.insert(node.id);
                assign_bounds(node.id, &children, &mut bounds, &mut counter);
            }
        }

        self.nodes
            .iter()
            .map(|node| {
                let (lft, rgt) = bounds[&node.id];
                let parent_id = match node.parent_id {
                    Some(parent) if known.contains(&parent) && !detached.contains(&node.id) && parent != node.id => {
                        Some(parent)
                    }
                    _ => None,
                };
                TreeNode {
                    id: node.id,
                    parent_id,
                    lft,
                    rgt,
                }
            })
            .collect()
    }

    /// Validates the nested-set invariants against the parent links.
    pub fn check(&self) -> Vec<TreeDefect> {
        let mut defects = Vec::new();
        let known: HashSet<i64> = self.nodes.iter().map(|n| n.id).collect();

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.lft >= node.rgt {
                defects.push(TreeDefect::InvertedBounds {
                    id: node.id,
                    lft: node.lft,
                    rgt: node.rgt,
                });
            }
            for value in [node.lft, node.rgt] {
                if !seen.insert(value) {
                    defects.push(TreeDefect::DuplicateBound { value });
                }
            }
            if let Some(parent_id) = node.parent_id {
                if !known.contains(&parent_id) {
                    defects.push(TreeDefect::MissingParent { id: node.id, parent_id });
                }
            }
        }
        if !defects.is_empty() {
            return defects;
        }

        // Sweep by left bound, keeping the chain of open intervals.
        let mut ordered = self.nodes.clone();
        ordered.sort_by_key(|n| n.lft);
        let mut open: Vec<TreeNode> = Vec::new();
        for node in ordered {
            while open.last().map_or(false, |top| top.rgt < node.lft) {
                open.pop();
            }
            let enclosing = open.last().copied();
            if let Some(top) = enclosing {
                if top.rgt < node.rgt {
                    defects.push(TreeDefect::Overlap { id: node.id, other: top.id });
                }
            }
            let enclosing_id = enclosing.map(|n| n.id);
            if enclosing_id != node.parent_id {
                defects.push(TreeDefect::WrongParent {
                    id: node.id,
                    parent_id: node.parent_id,
                    enclosing: enclosing_id,
                });
            }
            open.push(node);
        }
        defects
    }
}

fn assign_bounds(root: i64, children: &HashMap<i64, Vec<i64>>, bounds: &mut HashMap<i64, (i64, i64)>, counter: &mut i64) {
    let mut stack = vec![(root, false)];
    while let Some((id, entered)) = stack.pop() {
        if entered {
            if let Some(entry) = bounds.get_mut(&id) {
                entry.1 = *counter;
            }
            *counter += 1;
            continue;
        }
        if bounds.contains_key(&id) {
            continue;
        }
        bounds.insert(id, (*counter, 0));
        *counter += 1;
        stack.push((id, true));
        if let Some(kids) = children.get(&id) {
            for child in kids.iter().rev() {
                stack.push((*child, false));
            }
        }
    }
}

pub fn load_node(conn: &Connection, id: i64) -> Result<TreeNode> {
    conn.query_row(
        "SELECT id, parent_id, _lft, _rgt FROM albums WHERE id = ?1",
        params![id],
        |row| {
            Ok(TreeNode {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                lft: row.get(2)?,
                rgt: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("album {id}")))
}

fn next_root_position(conn: &Connection) -> Result<i64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(_rgt) FROM albums", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0) + 1)
}

/// Inserts an album as the last child of its parent, or as the last root.
pub fn insert_album(conn: &Connection, new: &NewAlbum) -> Result<Album> {
    let tx = conn.unchecked_transaction()?;
    let lft = match new.parent_id {
        Some(parent_id) => {
            let parent = load_node(&tx, parent_id)?;
            tx.execute("UPDATE albums SET _rgt = _rgt + 2 WHERE _rgt >= ?1", params![parent.rgt])?;
            tx.execute("UPDATE albums SET _lft = _lft + 2 WHERE _lft > ?1", params![parent.rgt])?;
            parent.rgt
        }
        None => next_root_position(&tx)?,
    };
    tx.execute(
        "INSERT INTO albums (parent_id, _lft, _rgt, title, description, license, is_public, is_downloadable, owner_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.parent_id,
            lft,
            lft + 1,
            new.title,
            new.description,
            new.license.as_deref().unwrap_or("none"),
            new.is_public,
            new.is_downloadable,
            new.owner_id
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    log::debug!("Inserted album {id} at [{lft}, {}]", lft + 1);

    albums::find_album(conn, id)?.ok_or_else(|| Error::NotFound(format!("album {id}")))
}

/// Moves a subtree to become the last child of `new_parent` (or the last root).
pub fn move_album(conn: &Connection, id: i64, new_parent: Option<i64>) -> Result<()> {
    let node = load_node(conn, id)?;
    if let Some(parent_id) = new_parent {
        let parent = load_node(conn, parent_id)?;
        if parent.id == node.id || (node.lft < parent.lft && parent.rgt < node.rgt) {
            return Err(Error::InvalidMove(format!(
                "album {id} cannot be moved into its own subtree ({parent_id})"
            )));
        }
    }

    with_tree_repair(conn, "move", |tx| {
        let node = load_node(tx, id)?;
        let target = match new_parent {
            Some(parent_id) => load_node(tx, parent_id)?.rgt,
            None => next_root_position(tx)?,
        };
        let width = node.rgt - node.lft + 1;

        if target > node.rgt {
            let distance = target - node.rgt - 1;
            tx.execute(
                "UPDATE albums SET
                    _lft = CASE WHEN _lft BETWEEN ?1 AND ?2 THEN _lft + ?3
                                WHEN _lft > ?2 AND _lft < ?5 THEN _lft - ?4 ELSE _lft END,
                    _rgt = CASE WHEN _rgt BETWEEN ?1 AND ?2 THEN _rgt + ?3
                                WHEN _rgt > ?2 AND _rgt < ?5 THEN _rgt - ?4 ELSE _rgt END",
                params![node.lft, node.rgt, distance, width, target],
            )?;
        } else {
            let distance = node.lft - target;
            tx.execute(
                "UPDATE albums SET
                    _lft = CASE WHEN _lft BETWEEN ?1 AND ?2 THEN _lft - ?3
                                WHEN _lft >= ?5 AND _lft < ?1 THEN _lft + ?4 ELSE _lft END,
                    _rgt = CASE WHEN _rgt BETWEEN ?1 AND ?2 THEN _rgt - ?3
                                WHEN _rgt >= ?5 AND _rgt < ?1 THEN _rgt + ?4 ELSE _rgt END",
                params![node.lft, node.rgt, distance, width, target],
            )?;
        }
        tx.execute("UPDATE albums SET parent_id = ?1 WHERE id = ?2", params![new_parent, id])?;
        log::debug!("Moved album {id} under {new_parent:?}");
        Ok(())
    })
}

/// Deletes an album, its descendants and every photo they contain.
/// Returns the deleted album ids.
pub fn delete_album(conn: &Connection, id: i64) -> Result<Vec<i64>> {
    load_node(conn, id)?;

    with_tree_repair(conn, "delete", |tx| {
        let node = load_node(tx, id)?;
        let width = node.rgt - node.lft + 1;

        let mut stmt = tx.prepare("SELECT id FROM albums WHERE _lft BETWEEN ?1 AND ?2 ORDER BY _lft")?;
        let ids = stmt
            .query_map(params![node.lft, node.rgt], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        tx.execute(
            "UPDATE albums SET cover_id = NULL WHERE cover_id IN (
                SELECT p.id FROM photos p JOIN albums pa ON pa.id = p.album_id WHERE pa._lft BETWEEN ?1 AND ?2)",
            params![node.lft, node.rgt],
        )?;
        let photos = tx.execute(
            "DELETE FROM photos WHERE album_id IN (SELECT id FROM albums WHERE _lft BETWEEN ?1 AND ?2)",
            params![node.lft, node.rgt],
        )?;
        tx.execute("DELETE FROM albums WHERE _lft BETWEEN ?1 AND ?2", params![node.lft, node.rgt])?;
        tx.execute("UPDATE albums SET _lft = _lft - ?1 WHERE _lft > ?2", params![width, node.rgt])?;
        tx.execute("UPDATE albums SET _rgt = _rgt - ?1 WHERE _rgt > ?2", params![width, node.rgt])?;

        log::info!("Deleted {} album(s) and {photos} photo(s) under album {id}", ids.len());
        Ok(ids)
    })
}

/// Runs a tree mutation in a transaction. On failure the transaction is
/// rolled back, the bounds are rebuilt, and the original error is returned.
fn with_tree_repair<T, F>(conn: &Connection, what: &str, op: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let attempt = || -> Result<T> {
        let tx = conn.unchecked_transaction()?;
        let value = op(&*tx)?;
        tx.commit()?;
        Ok(value)
    };
    match attempt() {
        Ok(value) => Ok(value),
        Err(err) => {
            log::error!("Tree {what} failed: {err}; repairing bounds");
            if let Err(repair_err) = fix_tree(conn) {
                log::error!("Tree repair failed: {repair_err}");
            }
            Err(err)
        }
    }
}

/// Rebuilds all bounds from parent links. Returns the number of rows changed.
pub fn fix_tree(conn: &Connection) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let set = NestedSet::load(&tx)?;
    let rebuilt = set.rebuild();

    let mut changed = 0;
    for (before, after) in set.nodes().iter().zip(rebuilt.iter()) {
        if before != after {
            tx.execute(
                "UPDATE albums SET parent_id = ?1, _lft = ?2, _rgt = ?3 WHERE id = ?4",
                params![after.parent_id, after.lft, after.rgt, after.id],
            )?;
            changed += 1;
        }
    }
    tx.commit()?;

    if changed > 0 {
        log::warn!("Tree repair rewrote {changed} album position(s)");
    }
    Ok(changed)
}

pub fn check_tree(conn: &Connection) -> Result<Vec<TreeDefect>> {
    Ok(NestedSet::load(conn)?.check())
}

/// Ids of the album's descendants, in tree order.
pub fn descendant_ids(conn: &Connection, id: i64, include_self: bool) -> Result<Vec<i64>> {
    let node = load_node(conn, id)?;
    let (lo, hi) = if include_self { (node.lft, node.rgt) } else { (node.lft + 1, node.rgt - 1) };
    let mut stmt = conn.prepare("SELECT id FROM albums WHERE _lft >= ?1 AND _rgt <= ?2 ORDER BY _lft")?;
    let ids = stmt
        .query_map(params![lo, hi], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Ancestor ids, root first.
pub fn ancestor_ids(conn: &Connection, id: i64) -> Result<Vec<i64>> {
    let node = load_node(conn, id)?;
    let mut stmt = conn.prepare("SELECT id FROM albums WHERE _lft < ?1 AND _rgt > ?2 ORDER BY _lft")?;
    let ids = stmt
        .query_map(params![node.lft, node.rgt], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}
