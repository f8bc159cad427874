// Property tests over randomly generated analyses.

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;
use serde_json::{Value, json};

use strata_core::composer::Composer;
use strata_core::config::StrataConfig;
use strata_core::order::{is_ordered, order_forest};
use strata_core::types::{EntityKind, ViewLevel};
use strata_test::compose;

/// One generated record: kind, optional link to an entity of the parent
/// kind (possibly out of range), and whether to carry a name.
#[derive(Debug, Clone)]
struct GenRecord {
    kind: EntityKind,
    link: Option<usize>,
    named: bool,
}

fn arb_kind() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

fn arb_record() -> impl Strategy<Value = GenRecord> {
    (arb_kind(), prop::option::of(0usize..12), any::<bool>())
        .prop_map(|(kind, link, named)| GenRecord { kind, link, named })
}

fn id_of(kind: EntityKind, i: usize) -> String {
    let prefix = match kind {
        EntityKind::Package => "pkg",
        EntityKind::Module => "mod",
        EntityKind::Class => "cls",
        EntityKind::Method => "fn",
        EntityKind::Field => "fld",
    };
    format!("{prefix}:{}{i}", kind.as_str())
}

/// Analysis JSON plus a cycle report naming a subset of modules by bare id.
fn to_documents(
    records: &[GenRecord],
    edges: &[(usize, usize)],
    cycles: &[Vec<usize>],
) -> (Value, Value) {
    let mut collections: [Vec<Value>; 5] = Default::default();
    let mut all_ids = Vec::new();
    let mut module_ids = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let id = id_of(record.kind, i);
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), json!(id));
        if record.named {
            obj.insert("name".into(), json!(format!("n{}", i % 5)));
        }
        if let (Some(parent_kind), Some(link)) = (record.kind.parent_kind(), record.link) {
            obj.insert(parent_kind.id_field().into(), json!(id_of(parent_kind, link)));
        }
        collections[usize::from(record.kind.level())].push(Value::Object(obj));
        if record.kind == EntityKind::Module {
            module_ids.push(format!("{}{i}", EntityKind::Module.as_str()));
        }
        all_ids.push(id);
    }

    let relationships: Vec<Value> = edges
        .iter()
        .filter(|_| !all_ids.is_empty())
        .map(|&(a, b)| {
            json!({
                "source": all_ids[a % all_ids.len()],
                "target": all_ids[b % all_ids.len()],
                "type": if (a + b) % 2 == 0 { "import" } else { "calls" },
            })
        })
        .collect();

    let mut analysis = serde_json::Map::new();
    for kind in EntityKind::ALL {
        analysis.insert(
            kind.collection_key().into(),
            Value::Array(collections[usize::from(kind.level())].clone()),
        );
    }
    analysis.insert("relationships".into(), Value::Array(relationships));

    let report: Vec<Value> = cycles
        .iter()
        .filter(|_| !module_ids.is_empty())
        .map(|members| {
            let ids: Vec<&String> = members
                .iter()
                .map(|&m| &module_ids[m % module_ids.len()])
                .collect();
            json!({"entities": ids, "severity": "medium"})
        })
        .collect();

    (Value::Object(analysis), json!({ "cycles": report }))
}

fn arb_documents() -> impl Strategy<Value = (Value, Value)> {
    (
        prop::collection::vec(arb_record(), 0..40),
        prop::collection::vec((0usize..64, 0usize..64), 0..30),
        prop::collection::vec(prop::collection::vec(0usize..16, 1..4), 0..4),
    )
        .prop_map(|(records, edges, cycles)| to_documents(&records, &edges, &cycles))
}

fn all_views(composer: &mut Composer) -> Vec<strata_core::project::ProjectedView> {
    ViewLevel::ALL
        .iter()
        .map(|&level| composer.project(level, &BTreeSet::new()))
        .collect()
}

proptest! {
    #[test]
    fn forest_holds_every_entity_exactly_once((analysis, cycles) in arb_documents()) {
        let composer = compose(&analysis, Some(&cycles), &StrataConfig::default());
        let forest = composer.forest();
        prop_assert!(forest.verify().is_empty());
        let walked = forest.depth_first();
        prop_assert_eq!(walked.len(), forest.len());
        let unique: HashSet<_> = walked.iter().collect();
        prop_assert_eq!(unique.len(), forest.len());
    }

    #[test]
    fn ordering_is_idempotent((analysis, _cycles) in arb_documents()) {
        let composer = compose(&analysis, None, &StrataConfig::default());
        prop_assert!(is_ordered(composer.forest()));
        let mut again = composer.forest().clone();
        order_forest(&mut again);
        prop_assert_eq!(again.depth_first(), composer.forest().depth_first());
    }

    #[test]
    fn composition_is_deterministic((analysis, cycles) in arb_documents()) {
        let mut first = compose(&analysis, Some(&cycles), &StrataConfig::default());
        let mut second = compose(&analysis, Some(&cycles), &StrataConfig::default());
        prop_assert_eq!(first.stats(), second.stats());
        prop_assert_eq!(all_views(&mut first), all_views(&mut second));
    }

    #[test]
    fn chunk_size_does_not_change_output(
        (analysis, cycles) in arb_documents(),
        chunk in 1usize..8,
    ) {
        let mut small = StrataConfig::default();
        small.processing.chunk_size = chunk;
        let mut chunked = compose(&analysis, Some(&cycles), &small);
        let mut whole = compose(&analysis, Some(&cycles), &StrataConfig::default());
        prop_assert_eq!(chunked.stats(), whole.stats());
        prop_assert_eq!(all_views(&mut chunked), all_views(&mut whole));
    }

    #[test]
    fn bare_cycle_ids_flag_prefixed_modules((analysis, cycles) in arb_documents()) {
        let composer = compose(&analysis, Some(&cycles), &StrataConfig::default());
        let forest = composer.forest();
        for cycle in cycles["cycles"].as_array().into_iter().flatten() {
            for id in cycle["entities"].as_array().into_iter().flatten().filter_map(Value::as_str) {
                let idx = forest.idx(&format!("mod:{id}"));
                prop_assert!(idx.is_some());
                prop_assert!(composer.annotations().is_in_cycle(idx.unwrap()));
            }
        }
        prop_assert!(composer.annotations().summary.unmatched_ids.is_empty());
    }

    #[test]
    fn projections_are_well_formed((analysis, cycles) in arb_documents()) {
        let mut composer = compose(&analysis, Some(&cycles), &StrataConfig::default());
        for view in all_views(&mut composer) {
            let ids: HashSet<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
            prop_assert_eq!(ids.len(), view.nodes.len());
            for node in &view.nodes {
                prop_assert!(view.level.includes(node.kind));
                if let Some(parent) = &node.parent {
                    prop_assert!(ids.contains(parent.as_str()));
                }
            }
            for edge in &view.edges {
                prop_assert_ne!(&edge.source, &edge.target);
                prop_assert!(ids.contains(edge.source.as_str()));
                prop_assert!(ids.contains(edge.target.as_str()));
            }
            for container in &view.containers {
                prop_assert!(!container.children.is_empty());
            }
        }
    }
}
