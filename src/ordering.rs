//! Manual display ordering of photos within a folder scope.
//!
//! A scope's rank list is its photos sorted by `(order desc, id desc)`; rank 1
//! is shown first. Every mutation is a small planned change (a swap, or one
//! photo moved past the current extreme) followed by [`renormalize`], which
//! rewrites the scope to exactly `n, n-1, …, 1`. Renormalization repairs
//! duplicates and gaps no matter how they arose, so running it twice is the same
//! as running it once.
//!
//! The engine functions take a `&Connection` and are meant to run inside a single
//! write transaction (see [`crate::db::Database::transaction`]).
//!
//! Renormalization rewrites a whole scope, which assumes scopes stay small
//! (personal galleries, hundreds of photos rather than millions).

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{folders, photos};
use crate::error::GalleryResult;

/// The set of photos sharing a folder, or sharing no folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Folder(i64),
    Ungrouped,
}

impl Scope {
    pub fn of(folder_id: Option<i64>) -> Self {
        match folder_id {
            Some(id) => Scope::Folder(id),
            None => Scope::Ungrouped,
        }
    }

    pub fn folder_id(&self) -> Option<i64> {
        match self {
            Scope::Folder(id) => Some(*id),
            Scope::Ungrouped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Up,
    Down,
    Top,
    Bottom,
}

impl Move {
    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Up => "up",
            Move::Down => "down",
            Move::Top => "top",
            Move::Bottom => "bottom",
        }
    }
}

/// Order updates `(id, new_order)` that carry out `mv` for `photo` before
/// renormalization. `rows` is the scope's `(id, order)` list and includes `photo`.
pub fn plan_move(mv: Move, photo: (i64, i64), rows: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let (id, order) = photo;
    let others = rows.iter().copied().filter(|&(other, _)| other != id);

    match mv {
        Move::Up => {
            // Immediate predecessor: smallest order above ours; on ties, the lowest
            // id ranks last among them
            others
                .filter(|&(_, o)| o > order)
                .min_by_key(|&(other, o)| (o, other))
                .map(|(other, o)| vec![(id, o), (other, order)])
                .unwrap_or_default()
        }
        Move::Down => others
            .filter(|&(_, o)| o < order)
            .max_by_key(|&(other, o)| (o, other))
            .map(|(other, o)| vec![(id, o), (other, order)])
            .unwrap_or_default(),
        Move::Top => {
            let max = rows.iter().map(|&(_, o)| o).max().unwrap_or(order);
            vec![(id, max + 1)]
        }
        Move::Bottom => {
            let min = rows.iter().map(|&(_, o)| o).min().unwrap_or(order);
            vec![(id, min - 1)]
        }
    }
}

/// Canonical orders for a scope: rows ranked by `(order desc, id desc)` and
/// numbered `n` down to `1`. Returns `(id, order)` in rank order.
pub fn canonical_orders(rows: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let n = ranked.len() as i64;
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id, n - i as i64))
        .collect()
}

/// Rewrite a scope to contiguous `n..1`. Only rows whose value changes are
/// written. Returns the number of rows updated.
pub fn renormalize(conn: &Connection, scope: Scope) -> GalleryResult<usize> {
    // Already in rank order, so it lines up with the canonical list
    let rows = photos::scope_orders(conn, scope)?;
    let mut changed = 0;

    for ((id, new_order), &(_, old_order)) in canonical_orders(&rows).into_iter().zip(rows.iter()) {
        if new_order != old_order {
            photos::set_order(conn, id, new_order)?;
            changed += 1;
        }
    }

    debug!(?scope, rows = rows.len(), changed, "Renormalized scope");
    Ok(changed)
}

/// Apply a directional move to one photo and renormalize its scope.
/// Returns the photo's order afterwards.
pub fn apply_move(conn: &Connection, photo_id: i64, mv: Move) -> GalleryResult<i64> {
    let photo = photos::require_photo(conn, photo_id)?;
    let scope = photo.scope();
    let rows = photos::scope_orders(conn, scope)?;

    for (id, order) in plan_move(mv, (photo.id, photo.order), &rows) {
        photos::set_order(conn, id, order)?;
    }
    renormalize(conn, scope)?;

    let moved = photos::require_photo(conn, photo_id)?;
    debug!(photo_id, direction = mv.as_str(), from = photo.order, to = moved.order, "Moved photo");
    Ok(moved.order)
}

/// Put a photo into another scope at its top, then repair both scopes.
pub fn reassign(conn: &Connection, photo_id: i64, folder_id: Option<i64>) -> GalleryResult<()> {
    let photo = photos::require_photo(conn, photo_id)?;
    let from = photo.scope();
    let to = Scope::of(folder_id);
    if from == to {
        return Ok(());
    }

    let order = photos::next_top_order(conn, to)?;
    photos::set_folder(conn, photo_id, folder_id, order)?;
    renormalize(conn, from)?;
    renormalize(conn, to)?;
    Ok(())
}

/// Renormalize every folder scope and the ungrouped scope.
/// Returns the number of scopes visited.
pub fn renormalize_all(conn: &Connection) -> GalleryResult<usize> {
    let mut scopes = vec![Scope::Ungrouped];
    scopes.extend(folders::folder_ids(conn)?.into_iter().map(Scope::Folder));

    for scope in &scopes {
        renormalize(conn, *scope)?;
    }
    Ok(scopes.len())
}
