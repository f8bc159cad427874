// Per-analysis composer: runs the build stages once, then serves projections.
//
// Build: registry → resolve → forest (orphans, containment-cycle guard) →
// order → cycle annotations. Projections are cheap re-runs of the level
// projector over the built forest.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StrataConfig;
use crate::cycles::{CycleAnnotations, CycleSummary};
use crate::error::Result;
use crate::forest::Forest;
use crate::ingest::{self, AnalysisInput};
use crate::order::order_forest;
use crate::progress::ProgressReporter;
use crate::project::{ProjectedView, ProjectionOptions, Projector};
use crate::registry::EntityRegistry;
use crate::resolve::select_strategy;
use crate::types::{CycleReport, RelationshipEdge, ViewLevel};

/// What one build kept, dropped and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub entities: usize,
    /// Records that overwrote an earlier record with the same id.
    pub replaced: usize,
    /// Records dropped for lacking any usable id.
    pub dropped: usize,
    pub edges: usize,
    pub relationship_records: usize,
    pub skipped_relationships: usize,
    /// Name of the parent-resolution strategy used.
    pub strategy: &'static str,
    pub parents_resolved: usize,
    /// Containment links naming an unknown entity.
    pub dangling_links: usize,
    pub roots: usize,
    pub orphans_promoted: usize,
    pub broken_containment_cycles: usize,
    pub cycles: CycleSummary,
}

impl BuildStats {
    /// Whether any input was discarded or repaired on the way in.
    pub fn lost_data(&self) -> bool {
        self.dropped > 0
            || self.skipped_relationships > 0
            || self.dangling_links > 0
            || self.broken_containment_cycles > 0
            || !self.cycles.unmatched_ids.is_empty()
    }

    /// One-line account of discarded or repaired input, `None` when nothing was lost.
    pub fn loss_notice(&self) -> Option<String> {
        let parts: Vec<String> = [
            (self.dropped, "records without an id dropped"),
            (self.skipped_relationships, "relationship records skipped"),
            (self.dangling_links, "containment links dangling"),
            (self.broken_containment_cycles, "containment cycles broken"),
            (self.cycles.unmatched_ids.len(), "cycle ids unmatched"),
        ]
        .into_iter()
        .filter(|&(count, _)| count > 0)
        .map(|(count, what)| format!("{count} {what}"))
        .collect();
        (!parts.is_empty()).then(|| format!("Input degraded: {}", parts.join(", ")))
    }
}

/// Requested depth plus the set of explicitly expanded containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub level: ViewLevel,
    pub expanded: BTreeSet<String>,
}

impl ViewState {
    pub fn new(level: ViewLevel) -> Self {
        Self {
            level,
            expanded: BTreeSet::new(),
        }
    }

    /// Change depth. Expansions never survive a level change.
    pub fn set_level(&mut self, level: ViewLevel) {
        self.level = level;
        self.expanded.clear();
    }

    /// Returns whether `id` is expanded afterwards.
    pub fn toggle_expanded(&mut self, id: &str) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.to_string());
            true
        }
    }

    pub fn expand(&mut self, id: impl Into<String>) {
        self.expanded.insert(id.into());
    }

    pub fn collapse(&mut self, id: &str) {
        self.expanded.remove(id);
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }
}

/// One analysis, composed. Owns everything a projection needs, including
/// the packages hidden as duplicates of the project root.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    forest: Forest,
    edges: Vec<RelationshipEdge>,
    annotations: CycleAnnotations,
    options: ProjectionOptions,
    hidden_packages: BTreeSet<String>,
    view: ViewState,
    stats: BuildStats,
}

impl Composer {
    /// Run every build stage over an already parsed analysis.
    pub fn build(
        input: AnalysisInput,
        report: &CycleReport,
        config: &StrataConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<Self> {
        config.validate()?;
        let chunk_size = config.processing.chunk_size;
        let has_relationship_data = input.has_relationship_data();
        let AnalysisInput {
            records,
            edges,
            relationship_records,
            skipped_relationships,
        } = input;

        let (registry, registry_stats) = EntityRegistry::from_records(
            records,
            config.registry.duplicate_ids,
            chunk_size,
            reporter,
        )?;
        if registry.is_empty() {
            warn!("Analysis contains no entities, the forest will be empty");
        }

        let strategy = select_strategy(
            config.resolver.strategy,
            has_relationship_data,
            config.resolver.tie_break,
        );
        debug!(
            strategy = strategy.name(),
            has_relationship_data,
            "Selected parent resolution strategy"
        );
        let parents = strategy.resolve(&registry, &edges);

        let (mut forest, forest_stats) = Forest::build(registry, &parents);
        order_forest(&mut forest);

        let annotations =
            CycleAnnotations::annotate(&forest, report, &config.cycles, chunk_size, reporter);

        let stats = BuildStats {
            entities: forest.len(),
            replaced: registry_stats.replaced,
            dropped: registry_stats.dropped,
            edges: edges.len(),
            relationship_records,
            skipped_relationships,
            strategy: strategy.name(),
            parents_resolved: parents.resolved(),
            dangling_links: parents.dangling,
            roots: forest_stats.roots,
            orphans_promoted: forest_stats.orphans_promoted,
            broken_containment_cycles: forest_stats.broken_cycles,
            cycles: annotations.summary.clone(),
        };
        info!(
            entities = stats.entities,
            edges = stats.edges,
            roots = stats.roots,
            orphans = stats.orphans_promoted,
            strategy = stats.strategy,
            flagged = stats.cycles.entities_flagged,
            "Composed forest"
        );
        if let Some(notice) = stats.loss_notice() {
            reporter.message(&notice);
        }

        Ok(Self {
            forest,
            edges,
            annotations,
            options: ProjectionOptions::new(config.project.root_name.clone(), &config.projection),
            hidden_packages: BTreeSet::new(),
            view: ViewState::default(),
            stats,
        })
    }

    /// Parse both JSON documents and build. A missing cycle report means no cycles.
    pub fn from_json(
        analysis: &str,
        cycles: Option<&str>,
        config: &StrataConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<Self> {
        let input = ingest::parse_analysis(analysis)?;
        let report = match cycles {
            Some(json) => ingest::parse_cycle_report(json)?,
            None => CycleReport::default(),
        };
        Self::build(input, &report, config, reporter)
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn annotations(&self) -> &CycleAnnotations {
        &self.annotations
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn options(&self) -> &ProjectionOptions {
        &self.options
    }

    /// Packages replaced by the root proxy so far. Sticky for this composer.
    pub fn hidden_packages(&self) -> &BTreeSet<String> {
        &self.hidden_packages
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn view_state_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    pub fn projector(&self) -> Projector<'_> {
        Projector::new(&self.forest, &self.annotations, &self.edges, &self.options)
    }

    /// Project at an explicit level and expansion set.
    ///
    /// Packages found duplicating the project root stay hidden in every
    /// later projection from this composer.
    pub fn project(&mut self, level: ViewLevel, expanded: &BTreeSet<String>) -> ProjectedView {
        let projection = self.projector().project(level, expanded, &self.hidden_packages);
        self.hidden_packages.extend(projection.newly_hidden);
        debug!(
            level = %level,
            nodes = projection.view.nodes.len(),
            edges = projection.view.edges.len(),
            "Projected view"
        );
        projection.view
    }

    /// Project using the current [`ViewState`].
    pub fn project_current(&mut self) -> ProjectedView {
        let ViewState { level, expanded } = self.view.clone();
        self.project(level, &expanded)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::error::{IngestError, StrataError};
    use crate::progress::NoopReporter;

    const ANALYSIS: &str = r#"{
        "packages": [{"id": "pkg:shop", "name": "shop"}, {"id": "pkg:lib", "name": "lib"}],
        "modules": [
            {"id": "mod:shop.cart", "name": "shop.cart", "package_id": "pkg:shop"},
            {"id": "mod:lib.util", "name": "lib.util", "package_id": "pkg:lib"}
        ],
        "classes": [{"id": "cls:Cart", "name": "Cart", "module_id": "mod:shop.cart"}],
        "methods": [{"id": "m:Cart.add", "name": "add", "class_id": "cls:Cart"}],
        "relationships": [
            {"source": "mod:shop.cart", "target": "mod:lib.util", "type": "import"},
            {"source": "mod:lib.util", "target": "mod:shop.cart", "type": "import"}
        ]
    }"#;

    const CYCLES: &str = r#"{"cycles": [
        {"entities": ["shop.cart", "lib.util"], "severity": "high",
         "paths": [{"from": "shop.cart", "to": "lib.util"}]}
    ]}"#;

    fn composer(root: Option<&str>) -> Composer {
        let mut config = StrataConfig::default();
        config.project.root_name = root.map(String::from);
        Composer::from_json(ANALYSIS, Some(CYCLES), &config, &NoopReporter).unwrap()
    }

    #[test]
    fn build_reports_stats() {
        let composer = composer(None);
        let stats = composer.stats();
        assert_eq!(stats.entities, 6);
        assert_eq!(stats.strategy, "explicit");
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.orphans_promoted, 0);
        assert_eq!(stats.cycles.high, 1);
        assert_eq!(stats.cycles.entities_flagged, 2);
        assert!(!stats.lost_data());
        assert_eq!(stats.loss_notice(), None);
    }

    #[derive(Default)]
    struct Messages(Mutex<Vec<String>>);

    impl ProgressReporter for Messages {
        fn start(&self, _task: &str, _total: Option<u64>) {}
        fn advance(&self, _amount: u64) {}
        fn finish(&self) {}
        fn message(&self, msg: &str) {
            self.0.lock().unwrap().push(msg.to_string());
        }
    }

    #[test]
    fn degraded_input_is_announced_once() {
        let reporter = Messages::default();
        let analysis = r#"{"modules": [{"id": "mod:a", "package_id": "pkg:none"}, {"name": ""}]}"#;
        let cycles = r#"{"cycles": [{"entities": ["ghost"], "severity": "low"}]}"#;
        Composer::from_json(analysis, Some(cycles), &StrataConfig::default(), &reporter).unwrap();
        assert_eq!(
            *reporter.0.lock().unwrap(),
            vec![
                "Input degraded: 1 records without an id dropped, \
                 1 containment links dangling, 1 cycle ids unmatched"
                    .to_string()
            ]
        );
    }

    #[test]
    fn module_view_marks_cycle_edges() {
        let mut composer = composer(None);
        let view = composer.project(ViewLevel::Module, &BTreeSet::new());
        assert_eq!(view.edges.len(), 2);
        assert!(view.edges.iter().all(|e| e.cycle_edge));
        assert!(view.node("mod:lib.util").unwrap().in_cycle);
        assert!(!view.node("pkg:lib").unwrap().in_cycle);
    }

    #[test]
    fn hidden_root_package_is_sticky() {
        let mut composer = composer(Some("shop"));
        let modules = composer.project(ViewLevel::Module, &BTreeSet::new());
        assert!(modules.node("pkg:shop").is_some());
        assert!(composer.hidden_packages().is_empty());

        let packages = composer.project(ViewLevel::Package, &BTreeSet::new());
        assert!(packages.node("root:shop").is_some());
        assert!(packages.node("pkg:shop").is_none());

        let modules = composer.project(ViewLevel::Module, &BTreeSet::new());
        assert!(modules.node("pkg:shop").is_none());
        assert!(modules.node("mod:shop.cart").is_some());
        assert!(composer.hidden_packages().contains("pkg:shop"));
    }

    #[test]
    fn hidden_sets_do_not_leak_between_composers() {
        let mut first = composer(Some("shop"));
        let mut second = composer(Some("shop"));
        first.project(ViewLevel::Package, &BTreeSet::new());
        let view = second.project(ViewLevel::Module, &BTreeSet::new());
        assert!(view.node("pkg:shop").is_some());
        assert!(second.hidden_packages().is_empty());
    }

    #[test]
    fn view_state_transitions() {
        let mut state = ViewState::new(ViewLevel::Class);
        assert!(state.toggle_expanded("cls:Cart"));
        state.expand("mod:x");
        assert!(state.is_expanded("mod:x"));
        state.collapse("mod:x");
        assert!(!state.is_expanded("mod:x"));
        assert!(!state.toggle_expanded("cls:Cart"));
        state.expand("cls:Cart");
        state.set_level(ViewLevel::Field);
        assert_eq!(state.level, ViewLevel::Field);
        assert!(state.expanded.is_empty());
    }

    #[test]
    fn project_current_follows_view_state() {
        let mut composer = composer(None);
        composer.view_state_mut().set_level(ViewLevel::Class);
        composer.view_state_mut().expand("cls:Cart");
        let view = composer.project_current();
        assert_eq!(view.level, ViewLevel::Class);
        assert!(view.node("m:Cart.add").is_some());
    }

    #[test]
    fn empty_analysis_degrades_to_empty_view() {
        let mut composer =
            Composer::from_json("{}", None, &StrataConfig::default(), &NoopReporter).unwrap();
        assert!(composer.forest().is_empty());
        let view = composer.project(ViewLevel::Field, &BTreeSet::new());
        assert!(view.is_empty());
        assert!(view.edges.is_empty());
        assert!(view.containers.is_empty());
    }

    #[test]
    fn reject_policy_surfaces_duplicate_ids() {
        let mut config = StrataConfig::default();
        config.registry.duplicate_ids = DuplicatePolicy::Reject;
        let json = r#"{"packages": [{"id": "a"}], "modules": [{"id": "a"}]}"#;
        let err = Composer::from_json(json, None, &config, &NoopReporter).unwrap_err();
        assert!(matches!(err, StrataError::Ingest(IngestError::DuplicateId { .. })));
    }

    #[test]
    fn invalid_config_is_rejected_before_building() {
        let mut config = StrataConfig::default();
        config.processing.chunk_size = 0;
        let err = Composer::from_json(ANALYSIS, None, &config, &NoopReporter).unwrap_err();
        assert!(matches!(err, StrataError::Config(_)));
    }
}
