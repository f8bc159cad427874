// Level projector: the level- and expansion-bounded view of the forest
// handed to a renderer.
//
// A projection is a pure function of (forest, annotations, edges, options,
// level, expanded set, hidden packages). The only state it feeds back is the
// list of packages it found duplicating the project root at the package
// level; the caller decides where to keep them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::ProjectionSection;
use crate::cycles::CycleAnnotations;
use crate::forest::Forest;
use crate::types::{EdgeKind, EntityIdx, EntityKind, RelationshipEdge, Severity, ViewLevel};

/// Id prefix of synthetic container nodes.
pub const CONTAINER_PREFIX: &str = "container:";
/// Id prefix of the synthetic root-as-module proxy.
pub const ROOT_PROXY_PREFIX: &str = "root:";

/// Knobs for one projector, usually taken from [`StrataConfig`](crate::config::StrataConfig).
#[derive(Debug, Clone, Default)]
pub struct ProjectionOptions {
    /// Declared project root name; packages with this name or id are
    /// replaced by a single proxy at the package level.
    pub root_name: Option<String>,
    pub clustering: bool,
    pub lift_edges: bool,
}

impl ProjectionOptions {
    pub fn new(root_name: Option<String>, section: &ProjectionSection) -> Self {
        Self {
            root_name,
            clustering: section.clustering,
            lift_edges: section.lift_edges,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedNode {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub level: u8,
    /// Nearest visible ancestor, or the root proxy.
    pub parent: Option<String>,
    pub in_cycle: bool,
    pub severity: Option<Severity>,
    /// Has children that are not currently visible.
    pub expandable: bool,
    pub expanded: bool,
    /// Not an analyzed entity (the root proxy).
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub cycle_edge: bool,
    pub severity: Option<Severity>,
}

/// A synthetic box drawn around the visible children of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub id: String,
    /// The node this container stands for.
    pub anchor: String,
    pub name: String,
    pub kind: EntityKind,
    /// Enclosing container, if any.
    pub parent: Option<String>,
    /// Ids of the visible nodes directly inside, in node order.
    pub children: Vec<String>,
    pub in_cycle: bool,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectedView {
    pub level: ViewLevel,
    pub containers: Vec<Container>,
    pub nodes: Vec<ProjectedNode>,
    pub edges: Vec<ProjectedEdge>,
}

impl ProjectedView {
    pub fn node(&self, id: &str) -> Option<&ProjectedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A view plus the root-duplicate packages discovered while building it.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub view: ProjectedView,
    /// Package ids newly found to duplicate the project root.
    pub newly_hidden: Vec<String>,
}

/// Where a forest entity lands in a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Entity(EntityIdx),
    Proxy,
}

pub struct Projector<'a> {
    forest: &'a Forest,
    annotations: &'a CycleAnnotations,
    edges: &'a [RelationshipEdge],
    options: &'a ProjectionOptions,
}

impl std::fmt::Debug for Projector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("entities", &self.forest.len())
            .field("edges", &self.edges.len())
            .field("options", self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Projector<'a> {
    pub fn new(
        forest: &'a Forest,
        annotations: &'a CycleAnnotations,
        edges: &'a [RelationshipEdge],
        options: &'a ProjectionOptions,
    ) -> Self {
        Self {
            forest,
            annotations,
            edges,
            options,
        }
    }

    /// Whether a root package duplicates the declared project root.
    pub fn is_root_duplicate(&self, idx: EntityIdx) -> bool {
        let Some(root) = self.options.root_name.as_deref() else {
            return false;
        };
        let entity = self.forest.entity(idx);
        entity.kind == EntityKind::Package
            && self.forest.parent(idx).is_none()
            && (entity.name == root
                || entity.id == root
                || entity.id.split_once(':').is_some_and(|(_, rest)| rest == root))
    }

    /// Entities visible at `level`, lazily, in forest order.
    ///
    /// Visible means: not hidden, and either shallow enough for the level or
    /// a child of an expanded container.
    pub fn visible_entities<'q>(
        &'q self,
        level: ViewLevel,
        expanded: &'q BTreeSet<String>,
        hidden: &'q BTreeSet<String>,
    ) -> impl Iterator<Item = EntityIdx> + 'q {
        self.forest
            .walk()
            .filter(move |&idx| self.is_visible(idx, level, expanded, hidden))
    }

    fn is_visible(
        &self,
        idx: EntityIdx,
        level: ViewLevel,
        expanded: &BTreeSet<String>,
        hidden: &BTreeSet<String>,
    ) -> bool {
        let entity = self.forest.entity(idx);
        if hidden.contains(&entity.id) {
            return false;
        }
        level.includes(entity.kind)
            || self
                .forest
                .parent_id(idx)
                .is_some_and(|parent| expanded.contains(parent))
    }

    pub fn project(
        &self,
        level: ViewLevel,
        expanded: &BTreeSet<String>,
        hidden: &BTreeSet<String>,
    ) -> Projection {
        let mut hidden_now = hidden.clone();
        let mut newly_hidden = Vec::new();
        if level == ViewLevel::Package {
            for &root in self.forest.roots() {
                let id = &self.forest.entity(root).id;
                if !hidden_now.contains(id) && self.is_root_duplicate(root) {
                    debug!(id = %id, "Package duplicates the project root, hiding it");
                    hidden_now.insert(id.clone());
                    newly_hidden.push(id.clone());
                }
            }
        }

        // The proxy stands in for hidden packages only at the package level.
        let proxy = self.options.root_name.as_deref().filter(|_| {
            level == ViewLevel::Package
                && self
                    .forest
                    .roots()
                    .iter()
                    .any(|&r| hidden_now.contains(&self.forest.entity(r).id))
        });
        let proxy_id = proxy.map(|name| format!("{ROOT_PROXY_PREFIX}{name}"));

        let visible: Vec<EntityIdx> = self.visible_entities(level, expanded, &hidden_now).collect();
        let visible_set: BTreeSet<EntityIdx> = visible.iter().copied().collect();

        // Where each forest entity lands: itself if visible, the proxy if it
        // is a hidden root package at the package level, else nowhere.
        let slot_of = |idx: EntityIdx| -> Option<Slot> {
            if visible_set.contains(&idx) {
                Some(Slot::Entity(idx))
            } else if proxy.is_some() && hidden_now.contains(&self.forest.entity(idx).id) {
                Some(Slot::Proxy)
            } else {
                None
            }
        };
        let nearest_slot = |idx: EntityIdx| -> Option<Slot> {
            std::iter::once(idx)
                .chain(self.forest.ancestors(idx))
                .find_map(&slot_of)
        };
        let slot_id = |slot: Slot| -> String {
            match slot {
                Slot::Entity(idx) => self.forest.entity(idx).id.clone(),
                Slot::Proxy => proxy_id.clone().unwrap_or_default(),
            }
        };

        // ── Nodes ──
        let mut nodes = Vec::with_capacity(visible.len() + 1);
        let mut proxy_emitted = false;
        for idx in self.forest.walk() {
            let slot = slot_of(idx);
            match slot {
                Some(Slot::Proxy) if !proxy_emitted => {
                    proxy_emitted = true;
                    nodes.push(self.proxy_node(proxy.unwrap_or_default(), &hidden_now));
                }
                Some(Slot::Entity(idx)) => {
                    let entity = self.forest.entity(idx);
                    let mark = self.annotations.mark(idx);
                    let children = self.forest.children(idx);
                    nodes.push(ProjectedNode {
                        id: entity.id.clone(),
                        name: entity.name.clone(),
                        kind: entity.kind,
                        level: entity.level(),
                        parent: self.forest.parent(idx).and_then(&nearest_slot).map(&slot_id),
                        in_cycle: mark.is_some(),
                        severity: mark.map(|m| m.severity),
                        expandable: children.iter().any(|c| !visible_set.contains(c)),
                        expanded: expanded.contains(&entity.id),
                        synthetic: false,
                    });
                }
                _ => {}
            }
        }
        let position: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        // ── Edges ──
        let mut merged: HashMap<(usize, usize, EdgeKind), (bool, Option<Severity>)> =
            HashMap::new();
        for edge in self.edges.iter().filter(|e| e.kind.is_dependency()) {
            let (Some(source), Some(target)) =
                (self.forest.idx(&edge.source), self.forest.idx(&edge.target))
            else {
                continue;
            };
            let (from, to) = if self.options.lift_edges {
                (nearest_slot(source), nearest_slot(target))
            } else {
                (slot_of(source), slot_of(target))
            };
            let (Some(from), Some(to)) = (from, to) else {
                continue;
            };
            if from == to {
                continue;
            }
            let (Some(&from_pos), Some(&to_pos)) = (
                position.get(slot_id(from).as_str()),
                position.get(slot_id(to).as_str()),
            ) else {
                continue;
            };
            let mark = self.annotations.edge_mark(source, target);
            let entry = merged.entry((from_pos, to_pos, edge.kind)).or_insert((false, None));
            if let Some(mark) = mark {
                entry.0 = true;
                entry.1 = Some(entry.1.map_or(mark.severity, |s| s.max(mark.severity)));
            }
        }
        let mut keys: Vec<_> = merged.keys().copied().collect();
        keys.sort_unstable();
        let edges = keys
            .into_iter()
            .map(|key| {
                let (cycle_edge, severity) = merged[&key];
                ProjectedEdge {
                    source: nodes[key.0].id.clone(),
                    target: nodes[key.1].id.clone(),
                    kind: key.2,
                    cycle_edge,
                    severity,
                }
            })
            .collect();

        let containers = if self.options.clustering {
            synthesize_containers(&nodes, &position)
        } else {
            Vec::new()
        };

        Projection {
            view: ProjectedView {
                level,
                containers,
                nodes,
                edges,
            },
            newly_hidden,
        }
    }

    fn proxy_node(&self, root_name: &str, hidden: &BTreeSet<String>) -> ProjectedNode {
        let severity = self
            .forest
            .roots()
            .iter()
            .filter(|&&r| hidden.contains(&self.forest.entity(r).id))
            .filter_map(|&r| self.annotations.severity(r))
            .max();
        ProjectedNode {
            id: format!("{ROOT_PROXY_PREFIX}{root_name}"),
            name: root_name.to_string(),
            kind: EntityKind::Module,
            level: 0,
            parent: None,
            in_cycle: severity.is_some(),
            severity,
            expandable: false,
            expanded: false,
            synthetic: true,
        }
    }
}

/// Group every non-package node under a container keyed by its projected
/// parent. Nodes without a parent stay loose; empty containers never appear.
fn synthesize_containers(
    nodes: &[ProjectedNode],
    position: &HashMap<&str, usize>,
) -> Vec<Container> {
    let mut members: HashMap<usize, Vec<String>> = HashMap::new();
    for node in nodes.iter().filter(|n| n.kind != EntityKind::Package) {
        let Some(anchor) = node.parent.as_deref().and_then(|p| position.get(p)) else {
            continue;
        };
        members.entry(*anchor).or_default().push(node.id.clone());
    }

    // Fixed before any member list is moved out, so a child container can
    // still see that its parent's anchor has members.
    let anchored: HashSet<usize> = members.keys().copied().collect();
    let mut anchors: Vec<usize> = anchored.iter().copied().collect();
    anchors.sort_unstable();
    anchors
        .into_iter()
        .map(|anchor| {
            let node = &nodes[anchor];
            let parent = node
                .parent
                .as_deref()
                .and_then(|p| position.get(p))
                .filter(|p| anchored.contains(p))
                .map(|&p| format!("{CONTAINER_PREFIX}{}", nodes[p].id));
            Container {
                id: format!("{CONTAINER_PREFIX}{}", node.id),
                anchor: node.id.clone(),
                name: node.name.clone(),
                kind: node.kind,
                parent,
                children: members.remove(&anchor).unwrap_or_default(),
                in_cycle: node.in_cycle,
                severity: node.severity,
            }
        })
        .collect()
}
