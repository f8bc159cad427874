use std::collections::{BTreeSet, HashMap};
use std::fmt;

use clap::Args;
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;

use strata_core::project::ProjectedView;
use strata_core::types::ViewLevel;

use super::{Format, InputArgs};

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// View level (0-4 or package, module, class, method, field)
    #[arg(long, default_value = "package")]
    pub level: ViewLevel,

    /// Expand a container past the level cutoff (repeatable)
    #[arg(long = "expand", value_name = "ID")]
    pub expand: Vec<String>,

    /// Output format: text, json, dot
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

pub fn run(args: &ProjectArgs, quiet: bool) -> anyhow::Result<()> {
    let mut composer = args.input.compose(quiet)?;
    let state = composer.view_state_mut();
    state.set_level(args.level);
    for id in &args.expand {
        state.expand(id.clone());
    }
    let view = composer.project_current();

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        Format::Dot => print!("{}", render_dot(&view)),
        Format::Text => print_text(&view),
    }
    Ok(())
}

// ── Text ─────────────────────────────────────────────────────────────

fn print_text(view: &ProjectedView) {
    println!(
        "Level {} ({}): {} nodes, {} edges",
        view.level.as_u8(),
        view.level,
        view.nodes.len(),
        view.edges.len()
    );
    if view.is_empty() {
        return;
    }
    println!();

    let mut depth: HashMap<&str, usize> = HashMap::with_capacity(view.nodes.len());
    for node in &view.nodes {
        // Parents always precede their children in node order.
        let d = node
            .parent
            .as_deref()
            .and_then(|p| depth.get(p))
            .map_or(0, |d| d + 1);
        depth.insert(node.id.as_str(), d);

        let marker = if node.expanded {
            "-"
        } else if node.expandable {
            "+"
        } else {
            " "
        };
        println!(
            "{marker} {}{} {}{}",
            "  ".repeat(d),
            node.kind,
            node.name,
            super::badge(node.severity)
        );
    }

    if !view.edges.is_empty() {
        println!();
        for edge in &view.edges {
            let flag = if edge.cycle_edge { " (cycle)" } else { "" };
            println!("  {} -{}-> {}{flag}", edge.source, edge.kind, edge.target);
        }
    }
}

// ── DOT ──────────────────────────────────────────────────────────────

struct DotNode {
    label: String,
    in_cycle: bool,
    synthetic: bool,
}

impl fmt::Display for DotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

struct DotEdge {
    label: &'static str,
    cycle_edge: bool,
    containment: bool,
}

impl fmt::Display for DotEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

fn render_dot(view: &ProjectedView) -> String {
    let mut graph: DiGraph<DotNode, DotEdge> =
        DiGraph::with_capacity(view.nodes.len(), view.edges.len() + view.nodes.len());
    let mut index = HashMap::with_capacity(view.nodes.len());
    for node in &view.nodes {
        let idx = graph.add_node(DotNode {
            label: format!("{}\n{}", node.name, node.kind),
            in_cycle: node.in_cycle,
            synthetic: node.synthetic,
        });
        index.insert(node.id.as_str(), idx);
    }

    for node in &view.nodes {
        if let Some(parent) = node.parent.as_deref().and_then(|p| index.get(p)) {
            graph.add_edge(
                *parent,
                index[node.id.as_str()],
                DotEdge {
                    label: "contains",
                    cycle_edge: false,
                    containment: true,
                },
            );
        }
    }
    let mut seen = BTreeSet::new();
    for edge in &view.edges {
        let (Some(&from), Some(&to)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if seen.insert((from, to, edge.kind)) {
            graph.add_edge(
                from,
                to,
                DotEdge {
                    label: edge.kind.as_str(),
                    cycle_edge: edge.cycle_edge,
                    containment: false,
                },
            );
        }
    }

    Dot::with_attr_getters(
        &graph,
        &[Config::EdgeNoLabel],
        &|_, edge| {
            let weight = edge.weight();
            if weight.containment {
                "style=dashed, arrowhead=none".to_string()
            } else if weight.cycle_edge {
                "color=red, penwidth=2".to_string()
            } else {
                String::new()
            }
        },
        &|_, (_, node)| {
            let mut attrs = vec!["shape=box"];
            if node.in_cycle {
                attrs.push("color=red");
            }
            if node.synthetic {
                attrs.push("style=dashed");
            }
            attrs.join(", ")
        },
    )
    .to_string()
}
