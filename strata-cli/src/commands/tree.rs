use clap::Args;

use strata_core::types::ViewLevel;

use super::InputArgs;

#[derive(Args, Debug)]
pub struct TreeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Deepest entity kind to print (0-4 or package, module, class, method, field)
    #[arg(long, default_value = "field")]
    pub depth: ViewLevel,

    /// Include entity ids
    #[arg(long)]
    pub ids: bool,
}

pub fn run(args: &TreeArgs, quiet: bool) -> anyhow::Result<()> {
    let composer = args.input.compose(quiet)?;
    let forest = composer.forest();

    if forest.is_empty() {
        println!("(empty forest)");
        return Ok(());
    }

    for idx in forest.walk() {
        let entity = forest.entity(idx);
        if !args.depth.includes(entity.kind) {
            continue;
        }
        let indent = "  ".repeat(forest.depth(idx));
        let badge = super::badge(composer.annotations().severity(idx));
        if args.ids {
            println!("{indent}{} {} ({}){badge}", entity.kind, entity.name, entity.id);
        } else {
            println!("{indent}{} {}{badge}", entity.kind, entity.name);
        }
    }

    Ok(())
}
