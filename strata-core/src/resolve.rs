// Parent resolution: explicit linkage fields, or longest-prefix name matching
// when the source carries no relationship data at all.
//
// A strategy is chosen once per build and only proposes parents. The forest
// builder owns cycle checks and orphan promotion.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{StrategyChoice, TieBreak};
use crate::registry::EntityRegistry;
use crate::types::{EdgeKind, EntityIdx, EntityKind, RelationshipEdge};

/// Separators that end a name segment for prefix matching.
const SEGMENT_SEPARATORS: [char; 3] = ['.', ':', '/'];

/// Proposed parent per entity, indexed by [`EntityIdx`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentMap {
    parents: Vec<Option<EntityIdx>>,
    /// Links or `contains` edges naming an entity that is not registered
    /// (or cannot contain the child).
    pub dangling: usize,
}

impl ParentMap {
    pub fn with_len(len: usize) -> Self {
        Self {
            parents: vec![None; len],
            dangling: 0,
        }
    }

    pub fn get(&self, child: EntityIdx) -> Option<EntityIdx> {
        self.parents.get(child.0).copied().flatten()
    }

    pub fn set(&mut self, child: EntityIdx, parent: EntityIdx) {
        self.parents[child.0] = Some(parent);
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn resolved(&self) -> usize {
        self.parents.iter().filter(|p| p.is_some()).count()
    }
}

/// Capability shared by both parent resolution strategies.
pub trait ResolveParent: std::fmt::Debug {
    /// Human-readable name for logs.
    fn name(&self) -> &'static str;

    /// Propose a parent for every registered entity.
    fn resolve(&self, registry: &EntityRegistry, edges: &[RelationshipEdge]) -> ParentMap;
}

/// Pick the strategy for one build.
///
/// `Auto` falls back to prefix matching only when the source supplied no
/// relationship data whatsoever.
pub fn select_strategy(
    choice: StrategyChoice,
    has_relationship_data: bool,
    tie_break: TieBreak,
) -> Box<dyn ResolveParent> {
    match choice {
        StrategyChoice::Explicit => Box::new(ExplicitLinkage),
        StrategyChoice::Prefix => Box::new(PrefixMatch { tie_break }),
        StrategyChoice::Auto if has_relationship_data => Box::new(ExplicitLinkage),
        StrategyChoice::Auto => Box::new(PrefixMatch { tie_break }),
    }
}

// ── Explicit linkage ───────────────────────────────────────────────

/// Parents from `package_id`/`module_id`/`class_id` fields, then `contains` edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitLinkage;

impl ExplicitLinkage {
    /// Link fields consulted per kind, natural container first.
    fn link_kinds(kind: EntityKind) -> &'static [EntityKind] {
        match kind {
            EntityKind::Package => &[],
            EntityKind::Module => &[EntityKind::Package],
            EntityKind::Class => &[EntityKind::Module, EntityKind::Package],
            EntityKind::Method | EntityKind::Field => &[EntityKind::Class, EntityKind::Module],
        }
    }
}

impl ResolveParent for ExplicitLinkage {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn resolve(&self, registry: &EntityRegistry, edges: &[RelationshipEdge]) -> ParentMap {
        let mut parents = ParentMap::with_len(registry.len());

        for (idx, entity) in registry.iter() {
            for &link_kind in Self::link_kinds(entity.kind) {
                let Some(target_id) = entity.links.for_kind(link_kind) else {
                    continue;
                };
                match registry.idx(target_id) {
                    Some(target) if registry.entity(target).level() < entity.level() => {
                        parents.set(idx, target);
                        break;
                    }
                    _ => {
                        debug!(
                            id = %entity.id,
                            link = %target_id,
                            "Containment link does not resolve"
                        );
                        parents.dangling += 1;
                    }
                }
            }
        }

        // `contains` edges fill in what the fields left open. Sub-packages and
        // nested classes are allowed, so the container may share the child's level.
        for edge in edges.iter().filter(|e| e.kind == EdgeKind::Contains) {
            let (Some(source), Some(target)) =
                (registry.idx(&edge.source), registry.idx(&edge.target))
            else {
                parents.dangling += 1;
                continue;
            };
            if source == target || parents.get(target).is_some() {
                continue;
            }
            if registry.entity(source).level() <= registry.entity(target).level() {
                parents.set(target, source);
            } else {
                parents.dangling += 1;
            }
        }

        parents
    }
}

// ── Prefix matching ────────────────────────────────────────────────

/// Longest matching name prefix among entities one level up.
///
/// When no natural container matches, shallower kinds are tried in turn
/// (a method may land directly in a module).
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixMatch {
    pub tie_break: TieBreak,
}

impl PrefixMatch {
    fn candidate_index(
        registry: &EntityRegistry,
        kind: EntityKind,
    ) -> HashMap<&str, Vec<EntityIdx>> {
        let mut by_name: HashMap<&str, Vec<EntityIdx>> = HashMap::new();
        for &idx in registry.of_kind(kind) {
            by_name
                .entry(registry.entity(idx).name.as_str())
                .or_default()
                .push(idx);
        }
        by_name
    }

    fn pick(&self, registry: &EntityRegistry, tied: &[EntityIdx]) -> Option<EntityIdx> {
        match self.tie_break {
            TieBreak::Registration => tied.first().copied(),
            TieBreak::Alphabetical => tied
                .iter()
                .copied()
                .min_by(|a, b| registry.entity(*a).id.cmp(&registry.entity(*b).id)),
        }
    }
}

impl ResolveParent for PrefixMatch {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn resolve(&self, registry: &EntityRegistry, _edges: &[RelationshipEdge]) -> ParentMap {
        let mut parents = ParentMap::with_len(registry.len());
        let indexes: Vec<HashMap<&str, Vec<EntityIdx>>> = EntityKind::ALL
            .iter()
            .map(|&kind| Self::candidate_index(registry, kind))
            .collect();

        for (idx, entity) in registry.iter() {
            let mut search = entity.kind.parent_kind();
            while let Some(kind) = search {
                let index = &indexes[usize::from(kind.level())];
                let hit = boundary_prefixes(&entity.name)
                    .find_map(|prefix| index.get(prefix))
                    .and_then(|tied| self.pick(registry, tied));
                if let Some(parent) = hit {
                    parents.set(idx, parent);
                    break;
                }
                search = kind.parent_kind();
            }
        }

        parents
    }
}

/// Prefixes of `name` ending on a segment boundary, longest first.
/// The whole name counts as a boundary.
pub fn boundary_prefixes(name: &str) -> impl Iterator<Item = &str> {
    let cuts = name
        .char_indices()
        .filter(|(_, c)| SEGMENT_SEPARATORS.contains(c))
        .map(|(i, _)| i)
        .filter(|&i| i > 0)
        .collect::<Vec<_>>();
    std::iter::once(name).chain(cuts.into_iter().rev().map(move |i| &name[..i]))
}
