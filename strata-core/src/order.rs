// Ordering stage: a stable sort of roots and every child list by
// (kind rank, name), with the id as the final tie-break.

use std::cmp::Ordering;

use crate::forest::Forest;
use crate::types::{Entity, EntityIdx};

/// Comparison behind both the forest sort and [`is_ordered`].
pub fn compare_entities(a: &Entity, b: &Entity) -> Ordering {
    a.kind
        .rank()
        .cmp(&b.kind.rank())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort the forest in place. Idempotent.
pub fn order_forest(forest: &mut Forest) {
    // Rank every entity once, then sort each list by rank.
    let mut ranked: Vec<EntityIdx> = forest.registry().iter().map(|(idx, _)| idx).collect();
    ranked.sort_by(|a, b| compare_entities(forest.entity(*a), forest.entity(*b)));
    let mut position = vec![0usize; ranked.len()];
    for (pos, idx) in ranked.iter().enumerate() {
        position[idx.0] = pos;
    }

    forest.roots_mut().sort_by_key(|idx| position[idx.0]);
    for children in forest.children_mut() {
        children.sort_by_key(|idx| position[idx.0]);
    }
}

/// Whether the forest already satisfies the ordering.
pub fn is_ordered(forest: &Forest) -> bool {
    let sorted = |list: &[EntityIdx]| {
        list.windows(2).all(|w| {
            compare_entities(forest.entity(w[0]), forest.entity(w[1])) != Ordering::Greater
        })
    };
    sorted(forest.roots())
        && forest
            .registry()
            .iter()
            .all(|(idx, _)| sorted(forest.children(idx)))
}
