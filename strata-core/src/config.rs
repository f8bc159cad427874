use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level Strata configuration, matching `strata.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub cycles: CyclesSection,
    #[serde(default)]
    pub projection: ProjectionSection,
    #[serde(default)]
    pub processing: ProcessingSection,
}

impl StrataConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "processing.chunk_size must be at least 1".into(),
            ));
        }
        if self.cycles.id_prefixes.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid(
                "cycles.id_prefixes must not contain empty strings".into(),
            ));
        }
        if self
            .project
            .root_name
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "project.root_name must not be blank".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Declared name of the analyzed project. A top-level package with this
    /// name or id duplicates the implicit project root.
    pub root_name: Option<String>,
}

/// What the registry does when two records resolve to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Last write wins.
    #[default]
    Overwrite,
    /// Fail the build with [`IngestError::DuplicateId`](crate::error::IngestError::DuplicateId).
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySection {
    #[serde(default)]
    pub duplicate_ids: DuplicatePolicy,
}

/// Which parent resolution strategy a build uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Explicit linkage when any relationship data exists, prefix matching otherwise.
    #[default]
    Auto,
    Explicit,
    Prefix,
}

/// Tie-break between equally long prefix matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Smallest candidate id wins.
    #[default]
    Alphabetical,
    /// First registered candidate wins.
    Registration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverSection {
    #[serde(default)]
    pub strategy: StrategyChoice,
    #[serde(default)]
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CyclesSection {
    /// Kind prefixes stripped when normalizing ids (`mod:a.b` → `a.b`).
    pub id_prefixes: Vec<String>,
    /// Also match on the last dot-separated segment of an id.
    pub match_last_segment: bool,
    pub matching: AliasMatching,
}

/// How a cycle-report id is compared against registered entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AliasMatching {
    /// An entity matches when any of its aliases equals any alias of the
    /// report id.
    #[default]
    AnyAlias,
    /// Aliases are tried strictest first; the first form that hits any
    /// entity is the only one used for that report id.
    Tiered,
}

impl Default for CyclesSection {
    fn default() -> Self {
        Self {
            id_prefixes: vec![
                "pkg:".into(),
                "package:".into(),
                "mod:".into(),
                "module:".into(),
                "cls:".into(),
                "class:".into(),
                "method:".into(),
                "meth:".into(),
                "fn:".into(),
                "func:".into(),
                "field:".into(),
                "fld:".into(),
            ],
            match_last_segment: true,
            matching: AliasMatching::AnyAlias,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSection {
    /// Synthesize container nodes around visible children.
    pub clustering: bool,
    /// Re-target edges whose endpoints are hidden to their nearest visible ancestor.
    pub lift_edges: bool,
}

impl Default for ProjectionSection {
    fn default() -> Self {
        Self {
            clustering: true,
            lift_edges: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSection {
    /// Records handled per batch before progress is reported.
    pub chunk_size: usize,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self { chunk_size: 2048 }
    }
}
