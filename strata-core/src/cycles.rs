// Cycle annotation: maps an external cycle report onto forest entities and
// dependency edges.
//
// The cycle detector and the analysis backend do not always agree on id
// format (`mod:a.b` vs `a.b`). Every id, on either side, has up to three
// aliases: the id itself, the id with a kind prefix stripped and the last
// dot-separated segment. An entity matches a report id when any of their
// aliases coincide. `AliasMatching::Tiered` narrows this to the strictest
// alias form that hits anything.
//
// Edge marking is an over-approximation: an edge is a cycle edge when its
// endpoint pair (either direction) appears on a reported path, or when both
// endpoints are flagged independently.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AliasMatching, CyclesSection};
use crate::forest::Forest;
use crate::progress::{Batches, ProgressReporter};
use crate::types::{CycleReport, EntityIdx, Severity};

/// Produces the normalized forms of an id used for matching.
#[derive(Debug, Clone)]
pub struct IdNormalizer {
    prefixes: Vec<String>,
    match_last_segment: bool,
}

impl IdNormalizer {
    pub fn new(settings: &CyclesSection) -> Self {
        // Longest prefix first so `module:` wins over `mod:`-style overlaps.
        let mut prefixes = settings.id_prefixes.clone();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            prefixes,
            match_last_segment: settings.match_last_segment,
        }
    }

    pub fn strip<'a>(&self, id: &'a str) -> &'a str {
        self.prefixes
            .iter()
            .find_map(|p| id.strip_prefix(p.as_str()))
            .unwrap_or(id)
    }

    pub fn last_segment<'a>(&self, id: &'a str) -> &'a str {
        let stripped = self.strip(id);
        stripped.rsplit('.').next().unwrap_or(stripped)
    }

    /// Matching tiers for `id`, strictest first.
    pub fn tiers<'a>(&self, id: &'a str) -> Vec<&'a str> {
        let mut tiers = vec![id, self.strip(id)];
        if self.match_last_segment {
            tiers.push(self.last_segment(id));
        }
        tiers
    }
}

/// Cycle membership of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleMark {
    /// Highest severity among the cycles the entity belongs to.
    pub severity: Severity,
    /// Number of distinct reported cycles the entity was matched in.
    pub cycles: usize,
}

/// Cycle status of one dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeCycleMark {
    pub severity: Severity,
    /// `true` when the pair appears on a reported path, `false` when only
    /// both endpoints are flagged.
    pub on_path: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub cycles: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub entities_flagged: usize,
    /// Report ids that matched no registered entity, sorted.
    pub unmatched_ids: Vec<String>,
}

/// Entity and edge annotations derived from a [`CycleReport`].
#[derive(Debug, Clone, Default)]
pub struct CycleAnnotations {
    marks: Vec<Option<CycleMark>>,
    path_pairs: HashMap<(EntityIdx, EntityIdx), Severity>,
    pub summary: CycleSummary,
}

/// Index from every alias form to the entities carrying it.
struct AliasIndex<'f> {
    normalizer: IdNormalizer,
    matching: AliasMatching,
    tiers: [HashMap<&'f str, Vec<EntityIdx>>; 3],
}

impl<'f> AliasIndex<'f> {
    fn new(forest: &'f Forest, settings: &CyclesSection) -> Self {
        let normalizer = IdNormalizer::new(settings);
        let mut tiers: [HashMap<&'f str, Vec<EntityIdx>>; 3] = Default::default();
        for (idx, entity) in forest.registry().iter() {
            for (tier, key) in normalizer.tiers(&entity.id).into_iter().enumerate() {
                tiers[tier].entry(key).or_default().push(idx);
            }
        }
        Self {
            normalizer,
            matching: settings.matching,
            tiers,
        }
    }

    /// Entities matched by `report_id`, ascending and without duplicates.
    fn lookup(&self, report_id: &str) -> Vec<EntityIdx> {
        let forms = self.normalizer.tiers(report_id);
        match self.matching {
            AliasMatching::Tiered => forms
                .into_iter()
                .enumerate()
                .find_map(|(tier, key)| self.tiers[tier].get(key))
                .cloned()
                .unwrap_or_default(),
            AliasMatching::AnyAlias => {
                let mut hits: Vec<EntityIdx> = forms
                    .iter()
                    .flat_map(|&key| self.tiers.iter().filter_map(move |tier| tier.get(key)))
                    .flatten()
                    .copied()
                    .collect();
                hits.sort_unstable();
                hits.dedup();
                hits
            }
        }
    }
}

impl CycleAnnotations {
    pub fn annotate(
        forest: &Forest,
        report: &CycleReport,
        settings: &CyclesSection,
        chunk_size: usize,
        reporter: &dyn ProgressReporter,
    ) -> Self {
        let index = AliasIndex::new(forest, settings);
        let mut cycle_sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); forest.len()];
        let mut severities: Vec<Option<Severity>> = vec![None; forest.len()];
        let mut path_pairs: HashMap<(EntityIdx, EntityIdx), Severity> = HashMap::new();
        let mut unmatched: BTreeSet<String> = BTreeSet::new();
        let mut summary = CycleSummary {
            cycles: report.cycles.len(),
            ..CycleSummary::default()
        };

        let mut batches =
            Batches::start(reporter, "annotating cycles", report.cycles.len(), chunk_size);
        for (cycle_no, cycle) in report.cycles.iter().enumerate() {
            match cycle.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }

            for report_id in &cycle.entities {
                let hits = index.lookup(report_id);
                if hits.is_empty() {
                    debug!(id = %report_id, "Cycle member matches no entity");
                    unmatched.insert(report_id.clone());
                }
                for &idx in &hits {
                    cycle_sets[idx.0].insert(cycle_no);
                    let current = &mut severities[idx.0];
                    *current = Some(current.map_or(cycle.severity, |s| s.max(cycle.severity)));
                }
            }

            for path in &cycle.paths {
                for (from, to) in path.pairs() {
                    let targets = index.lookup(to);
                    for a in index.lookup(from) {
                        for &b in &targets {
                            if a == b {
                                continue;
                            }
                            let severity =
                                path_pairs.entry(unordered(a, b)).or_insert(cycle.severity);
                            *severity = (*severity).max(cycle.severity);
                        }
                    }
                }
            }
            batches.tick();
        }
        batches.finish();

        let marks: Vec<Option<CycleMark>> = severities
            .into_iter()
            .zip(cycle_sets)
            .map(|(severity, set)| {
                severity.map(|severity| CycleMark {
                    severity,
                    cycles: set.len(),
                })
            })
            .collect();
        summary.entities_flagged = marks.iter().filter(|m| m.is_some()).count();
        summary.unmatched_ids = unmatched.into_iter().collect();

        info!(
            cycles = summary.cycles,
            flagged = summary.entities_flagged,
            unmatched = summary.unmatched_ids.len(),
            "Annotated cycles"
        );

        Self {
            marks,
            path_pairs,
            summary,
        }
    }

    pub fn mark(&self, idx: EntityIdx) -> Option<CycleMark> {
        self.marks.get(idx.0).copied().flatten()
    }

    pub fn is_in_cycle(&self, idx: EntityIdx) -> bool {
        self.mark(idx).is_some()
    }

    pub fn severity(&self, idx: EntityIdx) -> Option<Severity> {
        self.mark(idx).map(|m| m.severity)
    }

    /// Cycle status of a dependency edge between two entities.
    pub fn edge_mark(&self, source: EntityIdx, target: EntityIdx) -> Option<EdgeCycleMark> {
        if source == target {
            return None;
        }
        if let Some(&severity) = self.path_pairs.get(&unordered(source, target)) {
            return Some(EdgeCycleMark {
                severity,
                on_path: true,
            });
        }
        match (self.severity(source), self.severity(target)) {
            (Some(a), Some(b)) => Some(EdgeCycleMark {
                severity: a.min(b),
                on_path: false,
            }),
            _ => None,
        }
    }
}

fn unordered(a: EntityIdx, b: EntityIdx) -> (EntityIdx, EntityIdx) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::ingest::EntityRecord;
    use crate::progress::NoopReporter;
    use crate::registry::EntityRegistry;
    use crate::resolve::{ExplicitLinkage, ResolveParent};
    use crate::types::{Cycle, CyclePath, EntityKind};

    fn forest(records: Vec<EntityRecord>) -> Forest {
        let (registry, _) =
            EntityRegistry::from_records(records, DuplicatePolicy::Overwrite, 64, &NoopReporter)
                .unwrap();
        let parents = ExplicitLinkage.resolve(&registry, &[]);
        Forest::build(registry, &parents).0
    }

    fn annotate(forest: &Forest, cycles: Vec<Cycle>) -> CycleAnnotations {
        CycleAnnotations::annotate(
            forest,
            &CycleReport { cycles },
            &CyclesSection::default(),
            1,
            &NoopReporter,
        )
    }

    fn cycle(entities: &[&str], severity: Severity) -> Cycle {
        Cycle {
            entities: entities.iter().map(ToString::to_string).collect(),
            severity,
            paths: Vec::new(),
        }
    }

    #[test]
    fn normalizer_tiers() {
        let n = IdNormalizer::new(&CyclesSection::default());
        assert_eq!(n.tiers("mod:a.b.c"), vec!["mod:a.b.c", "a.b.c", "c"]);
        assert_eq!(n.strip("module:x"), "x");
        assert_eq!(n.strip("plain"), "plain");
    }

    #[test]
    fn prefixed_report_ids_match_unprefixed_registry() {
        let f = forest(vec![
            EntityRecord::new(EntityKind::Module, "a.b", "a.b"),
            EntityRecord::new(EntityKind::Module, "a.c", "a.c"),
        ]);
        let ann = annotate(&f, vec![cycle(&["mod:a.b", "mod:a.c"], Severity::Low)]);
        assert!(ann.is_in_cycle(f.idx("a.b").unwrap()));
        assert!(ann.is_in_cycle(f.idx("a.c").unwrap()));
        assert!(ann.summary.unmatched_ids.is_empty());
    }

    #[test]
    fn highest_severity_wins() {
        let f = forest(vec![
            EntityRecord::new(EntityKind::Module, "mod:a", "a"),
            EntityRecord::new(EntityKind::Module, "mod:b", "b"),
        ]);
        let ann = annotate(
            &f,
            vec![
                cycle(&["mod:a", "mod:b"], Severity::Low),
                cycle(&["mod:a"], Severity::High),
            ],
        );
        let a = ann.mark(f.idx("mod:a").unwrap()).unwrap();
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.cycles, 2);
        assert_eq!(ann.severity(f.idx("mod:b").unwrap()), Some(Severity::Low));
        assert_eq!(ann.summary.high, 1);
        assert_eq!(ann.summary.low, 1);
        assert_eq!(ann.summary.entities_flagged, 2);
    }

    #[test]
    fn shared_last_segment_flags_every_carrier() {
        let f = forest(vec![
            EntityRecord::new(EntityKind::Module, "mod:x.util", "x.util"),
            EntityRecord::new(EntityKind::Module, "mod:y.util", "y.util"),
            EntityRecord::new(EntityKind::Module, "mod:y.io", "y.io"),
        ]);
        let ann = annotate(&f, vec![cycle(&["x.util"], Severity::Medium)]);
        assert!(ann.is_in_cycle(f.idx("mod:x.util").unwrap()));
        assert!(ann.is_in_cycle(f.idx("mod:y.util").unwrap()));
        assert!(!ann.is_in_cycle(f.idx("mod:y.io").unwrap()));
        assert_eq!(ann.summary.entities_flagged, 2);
    }

    #[test]
    fn bare_entity_id_matches_report_segment() {
        let f = forest(vec![EntityRecord::new(EntityKind::Module, "util", "util")]);
        let ann = annotate(&f, vec![cycle(&["mod:lib.util"], Severity::Low)]);
        assert!(ann.is_in_cycle(f.idx("util").unwrap()));
    }

    #[test]
    fn tiered_matching_stops_at_first_hit() {
        let f = forest(vec![
            EntityRecord::new(EntityKind::Module, "mod:x.util", "x.util"),
            EntityRecord::new(EntityKind::Module, "mod:y.util", "y.util"),
        ]);
        let settings = CyclesSection {
            matching: AliasMatching::Tiered,
            ..CyclesSection::default()
        };
        let report = CycleReport {
            cycles: vec![cycle(&["x.util"], Severity::Medium)],
        };
        let ann = CycleAnnotations::annotate(&f, &report, &settings, 1, &NoopReporter);
        assert!(ann.is_in_cycle(f.idx("mod:x.util").unwrap()));
        assert!(!ann.is_in_cycle(f.idx("mod:y.util").unwrap()));
    }

    #[test]
    fn last_segment_is_the_final_fallback() {
        let f = forest(vec![EntityRecord::new(EntityKind::Class, "cls:app.models.User", "User")]);
        let ann = annotate(&f, vec![cycle(&["User"], Severity::Medium)]);
        assert!(ann.is_in_cycle(f.idx("cls:app.models.User").unwrap()));
    }

    #[test]
    fn unknown_ids_are_ignored_and_reported() {
        let f = forest(vec![EntityRecord::new(EntityKind::Module, "mod:a", "a")]);
        let ann = annotate(&f, vec![cycle(&["mod:ghost", "mod:a"], Severity::Medium)]);
        assert!(ann.is_in_cycle(f.idx("mod:a").unwrap()));
        assert_eq!(ann.summary.unmatched_ids, vec!["mod:ghost".to_string()]);
    }

    #[test]
    fn edges_on_paths_and_between_flagged_endpoints() {
        let f = forest(vec![
            EntityRecord::new(EntityKind::Module, "mod:a", "a"),
            EntityRecord::new(EntityKind::Module, "mod:b", "b"),
            EntityRecord::new(EntityKind::Module, "mod:c", "c"),
            EntityRecord::new(EntityKind::Module, "mod:d", "d"),
        ]);
        let mut with_path = cycle(&["mod:a", "mod:b"], Severity::High);
        with_path.paths = vec![CyclePath::Edge {
            from: "a".into(),
            to: "b".into(),
        }];
        let ann = annotate(
            &f,
            vec![with_path, cycle(&["mod:c", "mod:b"], Severity::Low)],
        );
        let idx = |id: &str| f.idx(id).unwrap();

        let ab = ann.edge_mark(idx("mod:a"), idx("mod:b")).unwrap();
        assert!(ab.on_path);
        assert_eq!(ab.severity, Severity::High);
        let ba = ann.edge_mark(idx("mod:b"), idx("mod:a")).unwrap();
        assert!(ba.on_path);

        let cb = ann.edge_mark(idx("mod:c"), idx("mod:b")).unwrap();
        assert!(!cb.on_path);
        assert_eq!(cb.severity, Severity::Low);

        assert!(ann.edge_mark(idx("mod:a"), idx("mod:d")).is_none());
        assert!(ann.edge_mark(idx("mod:a"), idx("mod:a")).is_none());
    }

    #[test]
    fn empty_report_flags_nothing() {
        let f = forest(vec![EntityRecord::new(EntityKind::Module, "mod:a", "a")]);
        let ann = annotate(&f, Vec::new());
        assert!(!ann.is_in_cycle(f.idx("mod:a").unwrap()));
        assert_eq!(ann.summary, CycleSummary::default());
    }
}
