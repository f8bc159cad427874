use clap::Args;

use super::{InputArgs, ReportFormat};

#[derive(Args, Debug)]
pub struct CyclesArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

pub fn run(args: &CyclesArgs, quiet: bool) -> anyhow::Result<()> {
    let composer = args.input.compose(quiet)?;
    let forest = composer.forest();
    let annotations = composer.annotations();

    let flagged: Vec<_> = forest
        .walk()
        .filter_map(|idx| annotations.mark(idx).map(|mark| (forest.entity(idx), mark)))
        .collect();

    if args.format == ReportFormat::Json {
        let json = serde_json::json!({
            "summary": annotations.summary,
            "entities": flagged.iter().map(|(entity, mark)| {
                serde_json::json!({
                    "id": entity.id,
                    "name": entity.name,
                    "kind": entity.kind,
                    "severity": mark.severity,
                    "cycles": mark.cycles,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let summary = &annotations.summary;
    println!(
        "{} cycles ({} high, {} medium, {} low), {} entities flagged",
        summary.cycles, summary.high, summary.medium, summary.low, summary.entities_flagged
    );
    if flagged.is_empty() {
        return Ok(());
    }
    println!();
    println!("{:<8} {:<8} {:<50} Cycles", "Severity", "Kind", "Entity");
    println!("{:-<80}", "");
    for (entity, mark) in &flagged {
        println!(
            "{:<8} {:<8} {:<50} {}",
            mark.severity.as_str(),
            entity.kind.as_str(),
            entity.id,
            mark.cycles
        );
    }
    if !summary.unmatched_ids.is_empty() {
        println!();
        println!("Unmatched report ids: {}", summary.unmatched_ids.join(", "));
    }

    Ok(())
}
