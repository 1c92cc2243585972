//! Contiguous integer ordering for columns and items.
//!
//! Every function here is pure: it takes a container's entities in display
//! order and returns them with `position == index` (0-based, no gaps, no
//! duplicates). Target indices past either end are clamped to `[0, len]`.

use std::fmt::Debug;

/// An entity ordered by an integer position inside a container
pub trait Positioned: Clone {
    type Id: PartialEq + Clone + Debug;

    fn id(&self) -> &Self::Id;
    fn position(&self) -> usize;
    fn set_position(&mut self, position: usize);
}

/// Sort entities into display order. The sort is stable, so entities that
/// share a position keep their relative input order.
pub fn sorted<T: Positioned>(entities: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut list: Vec<T> = entities.into_iter().collect();
    list.sort_by_key(|e| e.position());
    list
}

/// Rewrite positions so that each entity's position equals its index
pub fn reindex<T: Positioned>(mut list: Vec<T>) -> Vec<T> {
    for (index, entity) in list.iter_mut().enumerate() {
        entity.set_position(index);
    }
    list
}

/// Clamp a requested insertion index into `[0, len]`
pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len)
}

/// Insert an entity at `index` (clamped) and reindex
pub fn insert_at<T: Positioned>(mut list: Vec<T>, entity: T, index: usize) -> Vec<T> {
    let index = clamp_index(index, list.len());
    list.insert(index, entity);
    reindex(list)
}

/// Remove the entity at `index`, closing the gap it leaves behind
pub fn remove_at<T: Positioned>(mut list: Vec<T>, index: usize) -> (Vec<T>, Option<T>) {
    let removed = (index < list.len()).then(|| list.remove(index));
    (reindex(list), removed)
}

/// Remove the entity with `id`, closing the gap it leaves behind
pub fn remove_by<T: Positioned>(list: Vec<T>, id: &T::Id) -> (Vec<T>, Option<T>) {
    match index_of(&list, id) {
        Some(index) => remove_at(list, index),
        None => (reindex(list), None),
    }
}

/// Index of the entity with `id`, if present
pub fn index_of<T: Positioned>(list: &[T], id: &T::Id) -> Option<usize> {
    list.iter().position(|e| e.id() == id)
}

/// Move an entity inside one container: remove it, then insert it at `to`.
///
/// `to` is interpreted against the list with the entity already removed, so
/// moving from `i` to `j` and back from `j` to `i` restores the original order.
/// Returns `None` when `id` is not in the list.
pub fn move_within<T: Positioned>(list: Vec<T>, id: &T::Id, to: usize) -> Option<Vec<T>> {
    let (rest, moved) = remove_by(list, id);
    moved.map(|entity| insert_at(rest, entity, to))
}

/// Move an entity from `source` into `target`.
///
/// With `to = None` the entity is appended to the end of `target`. The caller
/// is responsible for updating the entity's container reference; only
/// positions are rewritten here. Returns `None` when `id` is not in `source`.
pub fn move_between<T: Positioned>(
    source: Vec<T>,
    target: Vec<T>,
    id: &T::Id,
    to: Option<usize>,
) -> Option<(Vec<T>, Vec<T>)> {
    let (source, moved) = remove_by(source, id);
    let moved = moved?;
    let to = to.unwrap_or(target.len());
    Some((source, insert_at(target, moved, to)))
}

/// The position one past the last entity (`max + 1`), or 0 when empty
pub fn tail_position<T: Positioned>(list: &[T]) -> usize {
    list.iter()
        .map(|e| e.position())
        .max()
        .map(|p| p + 1)
        .unwrap_or(0)
}

/// Whether the positions of `list` are exactly `{0, ..., n-1}`
pub fn is_contiguous<T: Positioned>(list: &[T]) -> bool {
    let mut seen = vec![false; list.len()];
    for entity in list {
        match seen.get_mut(entity.position()) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
