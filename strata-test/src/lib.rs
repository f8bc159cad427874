// Integration test utilities and fixture management for Strata.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use strata_core::composer::Composer;
use strata_core::config::StrataConfig;
use strata_core::ingest;
use strata_core::progress::NoopReporter;

/// Analysis, cycle report and config written to a temporary directory, for
/// driving the CLI.
#[derive(Debug)]
pub struct TestAnalysis {
    pub dir: tempfile::TempDir,
}

impl TestAnalysis {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn analysis(&self) -> PathBuf {
        self.dir.path().join("analysis.json")
    }

    pub fn cycles(&self) -> PathBuf {
        self.dir.path().join("cycles.json")
    }

    pub fn config(&self) -> PathBuf {
        self.dir.path().join("strata.toml")
    }

    /// Write the given documents. The config is optional.
    pub fn write(analysis: &Value, cycles: &Value, config: Option<&str>) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let fixture = Self { dir };
        write_file(&fixture.analysis(), &pretty(analysis));
        write_file(&fixture.cycles(), &pretty(cycles));
        if let Some(config) = config {
            write_file(&fixture.config(), config);
        }
        fixture
    }

    /// The shop project: two packages, an import cycle, and a package that
    /// duplicates the declared root `shop`.
    pub fn shop() -> Self {
        Self::write(&shop_analysis(), &shop_cycles(), Some("[project]\nroot_name = \"shop\"\n"))
    }

    /// A file that is not JSON at all.
    pub fn malformed() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let fixture = Self { dir };
        write_file(&fixture.analysis(), "{ \"packages\": [");
        write_file(&fixture.cycles(), "{\"cycles\": []}");
        fixture
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).expect("serialize fixture")
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

// ── Fixture documents ────────────────────────────────────────────

/// Packages `shop` and `lib`, three modules, classes with members, explicit
/// containment ids and dependency relationships.
pub fn shop_analysis() -> Value {
    json!({
        "packages": [
            {"id": "pkg:shop", "name": "shop"},
            {"id": "pkg:lib", "name": "lib"}
        ],
        "modules": [
            {"id": "mod:shop.cart", "name": "shop.cart", "package_id": "pkg:shop"},
            {"id": "mod:shop.checkout", "name": "shop.checkout", "package_id": "pkg:shop"},
            {"id": "mod:lib.util", "name": "lib.util", "package_id": "pkg:lib"}
        ],
        "classes": [
            {"id": "cls:Cart", "name": "Cart", "module_id": "mod:shop.cart"},
            {"id": "cls:Checkout", "name": "Checkout", "module_id": "mod:shop.checkout"},
            {"id": "cls:Fmt", "name": "Fmt", "module_id": "mod:lib.util"}
        ],
        "methods": [
            {"id": "m:Cart.add", "name": "add", "class_id": "cls:Cart"},
            {"id": "m:Cart.total", "name": "total", "class_id": "cls:Cart"},
            {"id": "m:Checkout.pay", "name": "pay", "class_id": "cls:Checkout"},
            {"id": "m:Fmt.money", "name": "money", "class_id": "cls:Fmt"}
        ],
        "fields": [
            {"id": "f:Cart.items", "name": "items", "class_id": "cls:Cart"}
        ],
        "relationships": [
            {"source": "mod:shop.cart", "target": "mod:lib.util", "type": "import"},
            {"source": "mod:lib.util", "target": "mod:shop.cart", "type": "import"},
            {"source": "mod:shop.checkout", "target": "mod:shop.cart", "type": "import"},
            {"source": "m:Checkout.pay", "target": "m:Cart.total", "type": "calls"},
            {"source": "m:Cart.total", "target": "m:Fmt.money", "type": "calls"},
            {"source": "cls:Cart", "target": "cls:Cart", "type": "references"}
        ]
    })
}

/// One high-severity cycle between `shop.cart` and `lib.util`, reported with
/// bare (unprefixed) ids.
pub fn shop_cycles() -> Value {
    json!({
        "cycles": [
            {
                "entities": ["shop.cart", "lib.util"],
                "severity": "high",
                "paths": [{"nodes": ["shop.cart", "lib.util"]}]
            }
        ]
    })
}

/// Records with no containment information at all, named so prefix
/// matching can rebuild the hierarchy.
pub fn prefix_only_analysis() -> Value {
    json!({
        "packages": [{"name": "app"}, {"name": "app.core"}],
        "modules": [{"name": "app.core.io"}, {"name": "app.web"}, {"name": "application"}],
        "classes": [{"name": "app.core.io.Reader"}, {"name": "app.web.Handler"}],
        "methods": [{"name": "app.core.io.Reader.read"}],
        "fields": [{"name": "app.web.Handler.route"}]
    })
}

/// Entities whose containment ids point nowhere.
pub fn orphan_analysis() -> Value {
    json!({
        "packages": [{"id": "pkg:a", "name": "a"}],
        "modules": [{"id": "mod:lost", "name": "lost", "package_id": "pkg:missing"}],
        "classes": [{"id": "cls:Stray", "name": "Stray", "module_id": "mod:missing"}],
        "methods": [{"id": "m:loose", "name": "loose"}],
        "fields": [{"name": ""}]
    })
}

/// A regular synthetic tree: `packages` × `modules` × `classes` × `members`
/// (half methods, half fields), with a ring of module imports.
pub fn synthetic_analysis(
    packages: usize,
    modules: usize,
    classes: usize,
    members: usize,
) -> Value {
    let mut pkgs = Vec::new();
    let mut mods = Vec::new();
    let mut clss = Vec::new();
    let mut methods = Vec::new();
    let mut fields = Vec::new();
    let mut relationships = Vec::new();

    for p in 0..packages {
        let pkg = format!("pkg:p{p}");
        pkgs.push(json!({"id": pkg, "name": format!("p{p}")}));
        for m in 0..modules {
            let module = format!("mod:p{p}.m{m}");
            mods.push(json!({"id": module, "name": format!("p{p}.m{m}"), "package_id": pkg}));
            for c in 0..classes {
                let class = format!("cls:p{p}.m{m}.C{c}");
                clss.push(json!({"id": class, "name": format!("C{c}"), "module_id": module}));
                for k in 0..members {
                    let member = json!({
                        "id": format!("{class}.x{k}"),
                        "name": format!("x{k}"),
                        "class_id": class
                    });
                    if k % 2 == 0 {
                        methods.push(member);
                    } else {
                        fields.push(member);
                    }
                }
            }
        }
    }

    let total = packages * modules;
    for i in 0..total {
        let source = format!("mod:p{}.m{}", i / modules.max(1), i % modules.max(1));
        let j = (i + 1) % total;
        let target = format!("mod:p{}.m{}", j / modules.max(1), j % modules.max(1));
        if source != target {
            relationships.push(json!({"source": source, "target": target, "type": "import"}));
        }
    }

    json!({
        "packages": pkgs,
        "modules": mods,
        "classes": clss,
        "methods": methods,
        "fields": fields,
        "relationships": relationships
    })
}

/// Compose a fixture in memory.
pub fn compose(analysis: &Value, cycles: Option<&Value>, config: &StrataConfig) -> Composer {
    try_compose(analysis, cycles, config).expect("compose fixture")
}

pub fn try_compose(
    analysis: &Value,
    cycles: Option<&Value>,
    config: &StrataConfig,
) -> anyhow::Result<Composer> {
    let input = ingest::analysis_from_value(analysis)?;
    let report = match cycles {
        Some(value) => ingest::parse_cycle_report(&value.to_string())?,
        None => strata_core::types::CycleReport::default(),
    };
    Ok(Composer::build(input, &report, config, &NoopReporter)?)
}

/// Config with the given declared root name.
pub fn config_with_root(root: &str) -> StrataConfig {
    let mut config = StrataConfig::default();
    config.project.root_name = Some(root.to_string());
    config
}
