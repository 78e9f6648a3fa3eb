//! Ordering primitives for `columnOrder` and `taskOrder`.
//!
//! Order arrays are the only record of display order. Every structural
//! mutation in the stores goes through these helpers so the in-memory and
//! PostgreSQL backends (and the client replica) agree on the exact result
//! of a move, a splice or a cascade.

use std::collections::HashSet;
use uuid::Uuid;

/// Removes every occurrence of `id`, returning the index of the first one.
pub fn remove_id(order: &mut Vec<Uuid>, id: Uuid) -> Option<usize> {
    let first = order.iter().position(|existing| *existing == id)?;
    order.retain(|existing| *existing != id);
    Some(first)
}

/// Clamps a requested position into `[0, len]`; `None` means append.
pub fn clamp_index(requested: Option<usize>, len: usize) -> usize {
    requested.map_or(len, |index| index.min(len))
}

/// Inserts `id` at the clamped position and returns the index used.
///
/// Any existing occurrence is removed first so the array never holds
/// duplicates.
pub fn insert_clamped(order: &mut Vec<Uuid>, id: Uuid, requested: Option<usize>) -> usize {
    remove_id(order, id);
    let index = clamp_index(requested, order.len());
    order.insert(index, id);
    index
}

/// Drops ids that do not resolve, returning how many were dropped. Positions
/// handed to clients index the live ids only, so callers prune before
/// inserting.
pub fn retain_live(order: &mut Vec<Uuid>, live: &HashSet<Uuid>) -> usize {
    let before = order.len();
    order.retain(|id| live.contains(id));
    before - order.len()
}

/// Moves `id` within a single array. The destination index is interpreted
/// against the array after removal, so moving an item onto its own index
/// leaves the array unchanged.
pub fn move_within(order: &mut Vec<Uuid>, id: Uuid, requested: Option<usize>) -> usize {
    insert_clamped(order, id, requested)
}

/// Moves `id` from `source` into `dest`. Returns the index it landed at.
pub fn move_between(
    source: &mut Vec<Uuid>,
    dest: &mut Vec<Uuid>,
    id: Uuid,
    requested: Option<usize>,
) -> usize {
    remove_id(source, id);
    insert_clamped(dest, id, requested)
}

/// Puts `moved` in front of `dest`, keeping the relative order of both
/// sequences. Ids already present in `dest` keep only their new front slot.
pub fn splice_front(dest: &mut Vec<Uuid>, moved: &[Uuid]) {
    let mut spliced: Vec<Uuid> = Vec::with_capacity(moved.len() + dest.len());
    for id in moved {
        if !spliced.contains(id) {
            spliced.push(*id);
        }
    }
    spliced.extend(dest.iter().copied().filter(|id| !moved.contains(id)));
    *dest = spliced;
}

/// Picks the column that inherits the tasks of a deleted column: the next
/// column in `column_order`, otherwise the previous one, otherwise none.
///
/// A column missing from `column_order` falls back to the last listed
/// column so its tasks are still rescued.
pub fn relocation_target(column_order: &[Uuid], deleted: Uuid) -> Option<Uuid> {
    match column_order.iter().position(|id| *id == deleted) {
        Some(index) => column_order[index + 1..]
            .iter()
            .copied()
            .find(|id| *id != deleted)
            .or_else(|| column_order[..index].iter().rev().copied().find(|id| *id != deleted)),
        None => column_order.last().copied(),
    }
}

/// Outcome of planning a column deletion against a project's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    pub target: Option<Uuid>,
    pub column_order: Vec<Uuid>,
}

pub fn plan_column_delete(column_order: &[Uuid], deleted: Uuid) -> CascadePlan {
    let target = relocation_target(column_order, deleted);
    let column_order = column_order
        .iter()
        .copied()
        .filter(|id| *id != deleted)
        .collect();
    CascadePlan {
        target,
        column_order,
    }
}

/// Finds which of the given `(column id, task order)` pairs currently holds
/// `task_id`. The first holder wins; callers strip the id from all others.
pub fn locate<'a, I>(columns: I, task_id: Uuid) -> Option<Uuid>
where
    I: IntoIterator<Item = (Uuid, &'a [Uuid])>,
{
    columns
        .into_iter()
        .find(|(_, order)| order.contains(&task_id))
        .map(|(column_id, _)| column_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_move_between_columns() {
        let t = ids(4);
        let mut a = vec![t[0], t[1], t[2]];
        let mut b = vec![t[3]];

        let index = move_between(&mut a, &mut b, t[1], Some(0));

        assert_eq!(index, 0);
        assert_eq!(a, vec![t[0], t[2]]);
        assert_eq!(b, vec![t[1], t[3]]);
    }

    #[test]
    fn test_move_within_to_own_index_is_noop() {
        let t = ids(3);
        let mut order = t.clone();
        for (index, id) in t.iter().enumerate() {
            assert_eq!(move_within(&mut order, *id, Some(index)), index);
            assert_eq!(order, t);
        }
    }

    #[test]
    fn test_move_within_forward_and_back() {
        let t = ids(4);
        let mut order = t.clone();

        move_within(&mut order, t[0], Some(2));
        assert_eq!(order, vec![t[1], t[2], t[0], t[3]]);

        move_within(&mut order, t[0], Some(0));
        assert_eq!(order, t);
    }

    #[test]
    fn test_index_clamped_to_append() {
        let t = ids(3);
        let mut a = vec![t[0]];
        let mut b = vec![t[1], t[2]];

        assert_eq!(move_between(&mut a, &mut b, t[0], Some(99)), 2);
        assert_eq!(b, vec![t[1], t[2], t[0]]);

        let mut order = t.clone();
        assert_eq!(move_within(&mut order, t[0], None), 2);
        assert_eq!(order, vec![t[1], t[2], t[0]]);
    }

    #[test]
    fn test_insert_never_duplicates() {
        let t = ids(2);
        let mut order = vec![t[0], t[1], t[0]];
        insert_clamped(&mut order, t[0], Some(1));
        assert_eq!(order, vec![t[1], t[0]]);
    }

    #[test]
    fn test_splice_front_preserves_order() {
        let t = ids(4);
        let mut dest = vec![t[2], t[3]];
        splice_front(&mut dest, &[t[0], t[1]]);
        assert_eq!(dest, vec![t[0], t[1], t[2], t[3]]);

        // an id already in dest is not duplicated
        let mut dest = vec![t[2], t[0]];
        splice_front(&mut dest, &[t[0], t[1]]);
        assert_eq!(dest, vec![t[0], t[1], t[2]]);
    }

    #[test]
    fn test_relocation_prefers_successor() {
        let c = ids(3);
        assert_eq!(relocation_target(&c, c[1]), Some(c[2]));
        assert_eq!(relocation_target(&c, c[0]), Some(c[1]));
        assert_eq!(relocation_target(&c, c[2]), Some(c[1]));
        assert_eq!(relocation_target(&c[..1], c[0]), None);
        assert_eq!(relocation_target(&[], c[0]), None);
    }

    #[test]
    fn test_plan_column_delete() {
        let c = ids(3);
        let plan = plan_column_delete(&c, c[1]);
        assert_eq!(plan.target, Some(c[2]));
        assert_eq!(plan.column_order, vec![c[0], c[2]]);

        let plan = plan_column_delete(&c[..1], c[0]);
        assert_eq!(plan.target, None);
        assert!(plan.column_order.is_empty());
    }

    #[test]
    fn test_retain_live_drops_dangling() {
        let t = ids(4);
        let live: HashSet<Uuid> = [t[0], t[2]].into_iter().collect();
        let mut order = vec![t[1], t[0], t[3], t[2]];

        assert_eq!(retain_live(&mut order, &live), 2);
        assert_eq!(order, vec![t[0], t[2]]);
        assert_eq!(retain_live(&mut order, &live), 0);
    }

    #[test]
    fn test_locate() {
        let t = ids(3);
        let c = ids(2);
        let a = vec![t[0]];
        let b = vec![t[1], t[2]];
        let columns = [(c[0], a.as_slice()), (c[1], b.as_slice())];
        assert_eq!(locate(columns, t[2]), Some(c[1]));
        assert_eq!(locate(columns, Uuid::new_v4()), None);
    }
}
