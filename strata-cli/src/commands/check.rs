use clap::Args;

use strata_core::forest::ForestViolation;

use super::{InputArgs, ReportFormat};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Fail when any input was dropped or repaired
    #[arg(long)]
    pub strict: bool,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

pub fn run(args: &CheckArgs, quiet: bool) -> anyhow::Result<()> {
    let composer = args.input.compose(quiet)?;
    let stats = composer.stats();
    let violations = composer.forest().verify();

    if args.format == ReportFormat::Json {
        let json = serde_json::json!({
            "stats": stats,
            "violations": violations.iter().map(describe).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if !quiet {
        println!("Strata check for {}", args.input.analysis.display());
        println!();
        println!("  Entities:       {:>6}", stats.entities);
        println!(
            "  Roots:          {:>6} ({} orphans promoted)",
            stats.roots, stats.orphans_promoted
        );
        println!("  Edges:          {:>6}", stats.edges);
        println!("  Strategy:       {:>6}", stats.strategy);
        println!(
            "  Parents:        {:>6} resolved, {} dangling",
            stats.parents_resolved, stats.dangling_links
        );
        println!();
        println!("  Dropped records:        {:>6}", stats.dropped);
        println!("  Replaced duplicates:    {:>6}", stats.replaced);
        println!("  Skipped relationships:  {:>6}", stats.skipped_relationships);
        println!("  Broken containment:     {:>6}", stats.broken_containment_cycles);
        println!("  Unmatched cycle ids:    {:>6}", stats.cycles.unmatched_ids.len());
        for violation in &violations {
            println!("  Violation: {}", describe(violation));
        }
    }

    if !violations.is_empty() {
        anyhow::bail!("Check failed: forest has {} structural violations", violations.len());
    }
    if args.strict && stats.lost_data() {
        anyhow::bail!("Check failed: input was dropped or repaired while composing");
    }
    Ok(())
}

fn describe(violation: &ForestViolation) -> String {
    match violation {
        ForestViolation::Missing(id) => format!("{id} is unreachable"),
        ForestViolation::Duplicated(id) => format!("{id} appears more than once"),
        ForestViolation::ContainmentCycle => "containment links form a cycle".to_string(),
    }
}
