// Containment forest: parent/children links over the registry, with orphan
// promotion and a guard against containment cycles.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::warn;

use crate::registry::EntityRegistry;
use crate::resolve::ParentMap;
use crate::types::{Entity, EntityIdx, EntityKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForestStats {
    pub roots: usize,
    /// Non-package entities that ended up at the root.
    pub orphans_promoted: usize,
    /// Parent links dropped because they closed a containment cycle.
    pub broken_cycles: usize,
}

/// A structural defect found by [`Forest::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestViolation {
    /// The entity is not reachable from any root.
    Missing(String),
    /// The entity is reachable along more than one path.
    Duplicated(String),
    /// The containment links form a cycle.
    ContainmentCycle,
}

/// Every registered entity, placed exactly once: as a root or as one
/// parent's child.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    registry: EntityRegistry,
    parent: Vec<Option<EntityIdx>>,
    children: Vec<Vec<EntityIdx>>,
    roots: Vec<EntityIdx>,
}

impl Forest {
    /// Build the forest from proposed parents.
    ///
    /// Links that would make an entity its own ancestor are dropped. Every
    /// parentless entity is promoted to root: packages first, then modules,
    /// classes, methods and fields, each in registration order.
    pub fn build(registry: EntityRegistry, proposed: &ParentMap) -> (Self, ForestStats) {
        let len = registry.len();
        let mut parent: Vec<Option<EntityIdx>> =
            (0..len).map(|i| proposed.get(EntityIdx(i))).collect();
        let mut stats = ForestStats::default();

        for i in 0..len {
            if closes_cycle(&parent, EntityIdx(i)) {
                warn!(
                    id = %registry.entity(EntityIdx(i)).id,
                    "Dropping parent link that closes a containment cycle"
                );
                parent[i] = None;
                stats.broken_cycles += 1;
            }
        }

        let mut children: Vec<Vec<EntityIdx>> = vec![Vec::new(); len];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[p.0].push(EntityIdx(i));
            }
        }

        let mut roots = Vec::new();
        for kind in EntityKind::ALL {
            for &idx in registry.of_kind(kind) {
                if parent[idx.0].is_none() {
                    roots.push(idx);
                    if kind != EntityKind::Package {
                        stats.orphans_promoted += 1;
                    }
                }
            }
        }
        stats.roots = roots.len();

        let forest = Self {
            registry,
            parent,
            children,
            roots,
        };
        (forest, stats)
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn entity(&self, idx: EntityIdx) -> &Entity {
        self.registry.entity(idx)
    }

    pub fn idx(&self, id: &str) -> Option<EntityIdx> {
        self.registry.idx(id)
    }

    pub fn parent(&self, idx: EntityIdx) -> Option<EntityIdx> {
        self.parent.get(idx.0).copied().flatten()
    }

    pub fn parent_id(&self, idx: EntityIdx) -> Option<&str> {
        self.parent(idx).map(|p| self.entity(p).id.as_str())
    }

    pub fn children(&self, idx: EntityIdx) -> &[EntityIdx] {
        self.children
            .get(idx.0)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn roots(&self) -> &[EntityIdx] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Ancestors of `idx`, nearest first.
    pub fn ancestors(&self, idx: EntityIdx) -> impl Iterator<Item = EntityIdx> + '_ {
        std::iter::successors(self.parent(idx), move |&p| self.parent(p))
    }

    /// Lazy pre-order walk over the whole forest in current child order.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// [`walk`](Self::walk), collected.
    pub fn depth_first(&self) -> Vec<EntityIdx> {
        self.walk().collect()
    }

    /// Depth of `idx` in the forest (roots are 0).
    pub fn depth(&self, idx: EntityIdx) -> usize {
        self.ancestors(idx).count()
    }

    /// Containment as a petgraph digraph (parent → child).
    pub fn containment_graph(&self) -> (DiGraph<EntityIdx, ()>, HashMap<EntityIdx, NodeIndex>) {
        let mut graph = DiGraph::with_capacity(self.len(), self.len());
        let mut index = HashMap::with_capacity(self.len());
        for (idx, _) in self.registry.iter() {
            index.insert(idx, graph.add_node(idx));
        }
        for (child, parent) in self.parent.iter().enumerate() {
            if let Some(parent) = parent {
                graph.add_edge(index[parent], index[&EntityIdx(child)], ());
            }
        }
        (graph, index)
    }

    /// Check completeness and acyclicity. Empty when the forest is sound.
    pub fn verify(&self) -> Vec<ForestViolation> {
        let mut violations = Vec::new();

        let (graph, _) = self.containment_graph();
        if petgraph::algo::is_cyclic_directed(&graph) {
            violations.push(ForestViolation::ContainmentCycle);
            return violations;
        }

        let mut seen = HashSet::with_capacity(self.len());
        for idx in self.depth_first() {
            if !seen.insert(idx) {
                violations.push(ForestViolation::Duplicated(self.entity(idx).id.clone()));
            }
        }
        for (idx, entity) in self.registry.iter() {
            if !seen.contains(&idx) {
                violations.push(ForestViolation::Missing(entity.id.clone()));
            }
        }
        violations
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Vec<EntityIdx>] {
        &mut self.children
    }

    pub(crate) fn roots_mut(&mut self) -> &mut Vec<EntityIdx> {
        &mut self.roots
    }
}

/// Pre-order iterator returned by [`Forest::walk`].
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    forest: &'a Forest,
    stack: Vec<EntityIdx>,
}

impl Iterator for Walk<'_> {
    type Item = EntityIdx;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.stack.pop()?;
        self.stack
            .extend(self.forest.children(idx).iter().rev().copied());
        Some(idx)
    }
}

/// Whether following parent links from `start` leads back to `start`.
fn closes_cycle(parent: &[Option<EntityIdx>], start: EntityIdx) -> bool {
    let mut visited = HashSet::new();
    let mut cursor = parent[start.0];
    while let Some(current) = cursor {
        if current == start {
            return true;
        }
        if !visited.insert(current) {
            // A cycle further up that does not include `start`.
            return false;
        }
        cursor = parent[current.0];
    }
    false
}
