// Ingestion boundary: untyped analysis JSON → typed entity records and edges.
//
// Nothing past this module sees `serde_json::Value`. Records are tolerated
// as loosely as possible (ids may be numbers, names may be missing); a
// record that yields no id at all is kept here as `id: None` so the
// registry can count and drop it.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::IngestError;
use crate::types::{ContainmentLinks, CycleReport, EdgeKind, EntityKind, RelationshipEdge};

/// Keys under which the analysis backend may place relationship records.
const RELATIONSHIP_KEYS: [&str; 3] = ["relationships", "edges", "dependencies"];

/// One upstream record after typing, before registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    /// Resolved as `id ?? <kind>_id ?? name`.
    pub id: Option<String>,
    pub name: Option<String>,
    pub links: ContainmentLinks,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            name: Some(name.into()),
            links: ContainmentLinks::default(),
        }
    }

    #[must_use]
    pub fn in_package(mut self, package_id: impl Into<String>) -> Self {
        self.links.package_id = Some(package_id.into());
        self
    }

    #[must_use]
    pub fn in_module(mut self, module_id: impl Into<String>) -> Self {
        self.links.module_id = Some(module_id.into());
        self
    }

    #[must_use]
    pub fn in_class(mut self, class_id: impl Into<String>) -> Self {
        self.links.class_id = Some(class_id.into());
        self
    }
}

/// A fully typed analysis result, ready for the registry.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    /// Records in kind order (packages first), source order within a kind.
    pub records: Vec<EntityRecord>,
    /// De-duplicated relationship edges, explicit and derived.
    pub edges: Vec<RelationshipEdge>,
    /// Explicit relationship records found in the source (before de-duplication).
    pub relationship_records: usize,
    /// Relationship records skipped for a missing endpoint or an unknown type.
    pub skipped_relationships: usize,
}

impl AnalysisInput {
    pub fn new(records: Vec<EntityRecord>, edges: Vec<RelationshipEdge>) -> Self {
        let relationship_records = edges.len();
        let mut input = Self {
            records,
            edges: Vec::new(),
            relationship_records,
            skipped_relationships: 0,
        };
        input.extend_edges(edges);
        input
    }

    /// Whether the source carries any containment or relationship data.
    ///
    /// Decides between explicit linkage and the prefix-matching fallback.
    pub fn has_relationship_data(&self) -> bool {
        self.relationship_records > 0
            || self.edges.iter().any(|e| e.kind == EdgeKind::Contains)
            || self.records.iter().any(|r| !r.links.is_empty())
    }

    fn extend_edges(&mut self, edges: impl IntoIterator<Item = RelationshipEdge>) {
        let mut seen: HashSet<RelationshipEdge> = self.edges.iter().cloned().collect();
        for edge in edges {
            if seen.insert(edge.clone()) {
                self.edges.push(edge);
            }
        }
    }
}

/// Parse an analysis document (`{packages, modules, classes, methods, fields, relationships}`).
pub fn parse_analysis(json: &str) -> Result<AnalysisInput, IngestError> {
    let value: Value = serde_json::from_str(json)?;
    analysis_from_value(&value)
}

/// Parse a cycle report document (`{cycles: [...]}`).
///
/// A bare array of cycles is accepted as well.
pub fn parse_cycle_report(json: &str) -> Result<CycleReport, IngestError> {
    let value: Value = serde_json::from_str(json)?;
    let report = if value.is_array() {
        CycleReport {
            cycles: serde_json::from_value(value)?,
        }
    } else {
        serde_json::from_value(value)?
    };
    Ok(report)
}

pub fn analysis_from_value(value: &Value) -> Result<AnalysisInput, IngestError> {
    let root = value.as_object().ok_or(IngestError::NotAnObject)?;

    let mut records = Vec::new();
    let mut derived = DerivedEdges::default();

    for kind in EntityKind::ALL {
        for item in collection(root, kind)? {
            let Some(obj) = item.as_object() else {
                // A bare string is an id-only record.
                let id = scalar_string(item);
                match &id {
                    Some(id) => derived.replace(id, Vec::new()),
                    None => debug!(kind = %kind, "Skipping non-object record"),
                }
                records.push(EntityRecord {
                    kind,
                    id,
                    name: None,
                    links: ContainmentLinks::default(),
                });
                continue;
            };
            let record = typed_record(kind, obj);
            if let Some(id) = &record.id {
                let mut edges = Vec::new();
                derive_edges(kind, id, obj, &mut edges);
                derived.replace(id, edges);
            }
            records.push(record);
        }
    }

    let mut explicit = Vec::new();
    let mut relationship_records = 0;
    let mut skipped = 0;
    for key in RELATIONSHIP_KEYS {
        let Some(list) = root.get(key) else { continue };
        let items = list.as_array().ok_or_else(|| IngestError::NotAnArray {
            key: key.to_string(),
        })?;
        for item in items {
            relationship_records += 1;
            match typed_relationship(item) {
                Some(edge) => explicit.push(edge),
                None => {
                    skipped += 1;
                    debug!(record = %item, "Skipping unusable relationship record");
                }
            }
        }
    }

    let mut input = AnalysisInput {
        records,
        edges: Vec::new(),
        relationship_records,
        skipped_relationships: skipped,
    };
    input.extend_edges(explicit);
    input.extend_edges(derived.edges.into_iter().flatten());
    Ok(input)
}

fn collection<'a>(
    root: &'a Map<String, Value>,
    kind: EntityKind,
) -> Result<Vec<&'a Value>, IngestError> {
    let mut keys = vec![kind.collection_key()];
    if kind == EntityKind::Method {
        keys.push("functions");
    }
    let mut items = Vec::new();
    for key in keys {
        match root.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(list)) => items.extend(list.iter()),
            Some(_) => {
                return Err(IngestError::NotAnArray {
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(items)
}

fn typed_record(kind: EntityKind, obj: &Map<String, Value>) -> EntityRecord {
    let name = string_field(obj, "name");
    let id = string_field(obj, "id")
        .or_else(|| string_field(obj, kind.id_field()))
        .or_else(|| name.clone());

    // A record's own kind-specific id field is its id, never a parent link.
    let link = |field_kind: EntityKind| {
        if field_kind == kind {
            None
        } else {
            string_field(obj, field_kind.id_field())
        }
    };

    EntityRecord {
        kind,
        id,
        name,
        links: ContainmentLinks {
            package_id: link(EntityKind::Package),
            module_id: link(EntityKind::Module),
            class_id: link(EntityKind::Class),
        },
    }
}

/// `contains` edges from member arrays and `import` edges from `imports`.
/// Edges derived from member arrays, grouped by the record that declared
/// them. A later record with the same id replaces the earlier one in the
/// registry, so it replaces its derived edges here too.
#[derive(Default)]
struct DerivedEdges {
    slot: HashMap<String, usize>,
    edges: Vec<Vec<RelationshipEdge>>,
}

impl DerivedEdges {
    fn replace(&mut self, id: &str, edges: Vec<RelationshipEdge>) {
        match self.slot.get(id) {
            Some(&slot) => self.edges[slot] = edges,
            None => {
                self.slot.insert(id.to_string(), self.edges.len());
                self.edges.push(edges);
            }
        }
    }
}

fn derive_edges(
    kind: EntityKind,
    id: &str,
    obj: &Map<String, Value>,
    out: &mut Vec<RelationshipEdge>,
) {
    let member_kinds: &[EntityKind] = match kind {
        EntityKind::Package => &[EntityKind::Module],
        EntityKind::Module => &[EntityKind::Class],
        EntityKind::Class => &[EntityKind::Method, EntityKind::Field],
        EntityKind::Method | EntityKind::Field => &[],
    };
    for &member_kind in member_kinds {
        for member in array_field(obj, member_kind.collection_key()) {
            if let Some(member_id) = reference_id(member_kind, member) {
                out.push(RelationshipEdge::new(id, member_id, EdgeKind::Contains));
            }
        }
    }
    for target in array_field(obj, "imports") {
        if let Some(target_id) = reference_id(EntityKind::Module, target) {
            out.push(RelationshipEdge::new(id, target_id, EdgeKind::Import));
        }
    }
}

fn typed_relationship(item: &Value) -> Option<RelationshipEdge> {
    let obj = item.as_object()?;
    let source = string_field(obj, "source").or_else(|| string_field(obj, "from"))?;
    let target = string_field(obj, "target").or_else(|| string_field(obj, "to"))?;
    let kind_name = string_field(obj, "type").or_else(|| string_field(obj, "kind"))?;
    let kind = EdgeKind::from_name(&kind_name)?;
    Some(RelationshipEdge::new(source, target, kind))
}

/// Id of an array member: a bare id, or an object resolved with the record rule.
fn reference_id(kind: EntityKind, value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => typed_record(kind, obj).id,
        other => scalar_string(other),
    }
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(scalar_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
