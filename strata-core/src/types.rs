use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProjectError;

// ── Typed index wrappers ───────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(idx: usize) -> Self {
                Self(idx)
            }
        }
    };
}

typed_id!(EntityIdx);

// ── Entity kinds ───────────────────────────────────────────────────

/// The closed set of program elements the composer arranges into a forest.
///
/// The declaration order is the containment order and doubles as the sort
/// rank used by the ordering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Package,
    Module,
    Class,
    #[serde(alias = "function")]
    Method,
    Field,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::Package,
        Self::Module,
        Self::Class,
        Self::Method,
        Self::Field,
    ];

    /// Fixed depth of this kind in the containment hierarchy (package = 0).
    pub fn level(self) -> u8 {
        match self {
            Self::Package => 0,
            Self::Module => 1,
            Self::Class => 2,
            Self::Method => 3,
            Self::Field => 4,
        }
    }

    /// Sort rank used by the ordering stage. Identical to [`level`](Self::level).
    pub fn rank(self) -> u8 {
        self.level()
    }

    /// The kind that naturally contains this one, if any.
    ///
    /// Methods and fields both live in classes.
    pub fn parent_kind(self) -> Option<Self> {
        match self {
            Self::Package => None,
            Self::Module => Some(Self::Package),
            Self::Class => Some(Self::Module),
            Self::Method | Self::Field => Some(Self::Class),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Module => "module",
            Self::Class => "class",
            Self::Method => "method",
            Self::Field => "field",
        }
    }

    /// Key of the upstream collection holding records of this kind.
    pub fn collection_key(self) -> &'static str {
        match self {
            Self::Package => "packages",
            Self::Module => "modules",
            Self::Class => "classes",
            Self::Method => "methods",
            Self::Field => "fields",
        }
    }

    /// Kind-specific id field (`package_id`, `module_id`, ...).
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Package => "package_id",
            Self::Module => "module_id",
            Self::Class => "class_id",
            Self::Method => "method_id",
            Self::Field => "field_id",
        }
    }

    /// Parse a kind name, accepting `function` as an alias of `method`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "package" => Some(Self::Package),
            "module" => Some(Self::Module),
            "class" => Some(Self::Class),
            "method" | "function" => Some(Self::Method),
            "field" => Some(Self::Field),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entities ───────────────────────────────────────────────────────

/// Explicit containment ids carried by an upstream record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentLinks {
    pub package_id: Option<String>,
    pub module_id: Option<String>,
    pub class_id: Option<String>,
}

impl ContainmentLinks {
    pub fn is_empty(&self) -> bool {
        self.package_id.is_none() && self.module_id.is_none() && self.class_id.is_none()
    }

    /// The link naming an entity of `kind`, if present.
    pub fn for_kind(&self, kind: EntityKind) -> Option<&str> {
        match kind {
            EntityKind::Package => self.package_id.as_deref(),
            EntityKind::Module => self.module_id.as_deref(),
            EntityKind::Class => self.class_id.as_deref(),
            EntityKind::Method | EntityKind::Field => None,
        }
    }
}

/// One analyzed program element. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Display name. Falls back to `id` when the record has none.
    pub name: String,
    pub kind: EntityKind,
    /// Containment ids as supplied upstream. Only the resolver reads these.
    #[serde(default, skip_serializing_if = "ContainmentLinks::is_empty")]
    pub links: ContainmentLinks,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            links: ContainmentLinks::default(),
        }
    }

    #[must_use]
    pub fn with_links(mut self, links: ContainmentLinks) -> Self {
        self.links = links;
        self
    }

    pub fn level(&self) -> u8 {
        self.kind.level()
    }
}

// ── Relationship edges ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Module → Module: one module imports another.
    Import,
    /// Class → Class: subclassing or interface implementation.
    Inheritance,
    /// Class → Class: one class holds another as a member.
    Composition,
    /// Method → Method: one method calls another.
    Call,
    /// Any → Any: an unspecified use.
    Reference,
    /// Container → member. The only kind that informs containment.
    Contains,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Inheritance => "inheritance",
            Self::Composition => "composition",
            Self::Call => "call",
            Self::Reference => "reference",
            Self::Contains => "contains",
        }
    }

    /// Dependency edges are overlaid on the forest; `contains` edges shape it.
    pub fn is_dependency(self) -> bool {
        self != Self::Contains
    }

    /// Parse an upstream relationship type, tolerating common synonyms.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "import" | "imports" => Some(Self::Import),
            "inheritance" | "inherits" | "extends" | "implements" => Some(Self::Inheritance),
            "composition" | "composes" | "aggregation" => Some(Self::Composition),
            "call" | "calls" => Some(Self::Call),
            "reference" | "references" | "uses" => Some(Self::Reference),
            "contains" | "has" | "contain" => Some(Self::Contains),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relationship between two entities, by id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

impl RelationshipEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    pub fn is_self_edge(&self) -> bool {
        self.source == self.target
    }
}

// ── Cycle report ───────────────────────────────────────────────────

/// Cycle severity. Ordered so that `max` picks the badge to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Lenient parse used at the ingestion boundary. Unknown names map to
    /// `Medium`, `critical` maps to `High`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" | "info" => Self::Low,
            "high" | "critical" | "severe" | "major" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map_or_else(Severity::default, Severity::from_name))
}

/// One segment of a cycle path as reported by the cycle detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CyclePath {
    Edge { from: String, to: String },
    Nodes { nodes: Vec<String> },
}

impl CyclePath {
    /// Ordered `(from, to)` pairs described by this path.
    ///
    /// A node list is treated as a closed walk: the last node links back to
    /// the first unless the list already repeats it.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            Self::Edge { from, to } => vec![(from.as_str(), to.as_str())],
            Self::Nodes { nodes } => {
                let mut pairs: Vec<(&str, &str)> = nodes
                    .windows(2)
                    .map(|w| (w[0].as_str(), w[1].as_str()))
                    .collect();
                if let (Some(first), Some(last)) = (nodes.first(), nodes.last()) {
                    if nodes.len() > 1 && first != last {
                        pairs.push((last.as_str(), first.as_str()));
                    }
                }
                pairs
            }
        }
    }
}

/// A set of mutually dependent entities flagged by the cycle detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub paths: Vec<CyclePath>,
}

/// Externally computed dependency-cycle report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    #[serde(default)]
    pub cycles: Vec<Cycle>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

// ── View level ─────────────────────────────────────────────────────

/// Depth of the projected view, from packages only down to fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewLevel {
    #[default]
    Package,
    Module,
    Class,
    Method,
    Field,
}

impl ViewLevel {
    pub const ALL: [Self; 5] = [
        Self::Package,
        Self::Module,
        Self::Class,
        Self::Method,
        Self::Field,
    ];

    pub fn as_u8(self) -> u8 {
        self.kind().level()
    }

    /// The deepest entity kind visible at this level without expansion.
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Package => EntityKind::Package,
            Self::Module => EntityKind::Module,
            Self::Class => EntityKind::Class,
            Self::Method => EntityKind::Method,
            Self::Field => EntityKind::Field,
        }
    }

    pub fn includes(self, kind: EntityKind) -> bool {
        kind.level() <= self.as_u8()
    }
}

impl TryFrom<u8> for ViewLevel {
    type Error = ProjectError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(ProjectError::LevelOutOfRange(value))
    }
}

impl FromStr for ViewLevel {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.trim().parse::<u8>() {
            return Self::try_from(n);
        }
        EntityKind::from_name(s)
            .map(|kind| Self::ALL[usize::from(kind.level())])
            .ok_or_else(|| ProjectError::UnknownLevel(s.to_string()))
    }
}

impl fmt::Display for ViewLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_levels_follow_containment() {
        let levels: Vec<u8> = EntityKind::ALL.iter().map(|k| k.level()).collect();
        assert_eq!(levels, vec![0, 1, 2, 3, 4]);
        assert!(EntityKind::Package < EntityKind::Field);
    }

    #[test]
    fn function_is_method_alias() {
        assert_eq!(EntityKind::from_name("function"), Some(EntityKind::Method));
        assert_eq!(EntityKind::from_name(" Method "), Some(EntityKind::Method));
        let kind: EntityKind = serde_json::from_str("\"function\"").unwrap();
        assert_eq!(kind, EntityKind::Method);
    }

    #[test]
    fn fields_and_methods_share_class_parent() {
        assert_eq!(EntityKind::Method.parent_kind(), Some(EntityKind::Class));
        assert_eq!(EntityKind::Field.parent_kind(), Some(EntityKind::Class));
        assert_eq!(EntityKind::Package.parent_kind(), None);
    }

    #[test]
    fn edge_kind_synonyms() {
        assert_eq!(EdgeKind::from_name("extends"), Some(EdgeKind::Inheritance));
        assert_eq!(EdgeKind::from_name("CALLS"), Some(EdgeKind::Call));
        assert_eq!(EdgeKind::from_name("frobnicates"), None);
        assert!(!EdgeKind::Contains.is_dependency());
        assert!(EdgeKind::Import.is_dependency());
    }

    #[test]
    fn severity_ordering_and_leniency() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::from_name("CRITICAL"), Severity::High);
        assert_eq!(Severity::from_name("whatever"), Severity::Medium);
    }

    #[test]
    fn cycle_report_parses_both_path_shapes() {
        let json = r#"{
            "cycles": [
                {
                    "entities": ["mod:a", "mod:b"],
                    "severity": "high",
                    "paths": [{"from": "mod:a", "to": "mod:b"}, {"nodes": ["mod:b", "mod:a"]}]
                },
                {"entities": ["x"]}
            ]
        }"#;
        let report: CycleReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.cycles[0].severity, Severity::High);
        assert_eq!(report.cycles[1].severity, Severity::Medium);
        assert_eq!(report.cycles[0].paths[0].pairs(), vec![("mod:a", "mod:b")]);
        assert_eq!(
            report.cycles[0].paths[1].pairs(),
            vec![("mod:b", "mod:a"), ("mod:a", "mod:b")]
        );
    }

    #[test]
    fn closed_node_path_does_not_repeat_closing_pair() {
        let path = CyclePath::Nodes {
            nodes: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(path.pairs(), vec![("a", "b"), ("b", "a")]);
    }

    #[test]
    fn view_level_parsing() {
        assert_eq!(ViewLevel::try_from(2).unwrap(), ViewLevel::Class);
        assert!(matches!(
            ViewLevel::try_from(5),
            Err(ProjectError::LevelOutOfRange(5))
        ));
        assert_eq!("module".parse::<ViewLevel>().unwrap(), ViewLevel::Module);
        assert_eq!("function".parse::<ViewLevel>().unwrap(), ViewLevel::Method);
        assert_eq!("4".parse::<ViewLevel>().unwrap(), ViewLevel::Field);
        assert!("galaxy".parse::<ViewLevel>().is_err());
    }

    #[test]
    fn view_level_includes_shallower_kinds() {
        assert!(ViewLevel::Class.includes(EntityKind::Module));
        assert!(ViewLevel::Class.includes(EntityKind::Class));
        assert!(!ViewLevel::Class.includes(EntityKind::Method));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn view_level_u8_roundtrip(n in 0u8..5) {
                let level = ViewLevel::try_from(n).unwrap();
                prop_assert_eq!(level.as_u8(), n);
                prop_assert_eq!(level.kind().level(), n);
            }

            #[test]
            fn view_level_rejects_out_of_range(n in 5u8..) {
                prop_assert!(ViewLevel::try_from(n).is_err());
            }
        }
    }
}
