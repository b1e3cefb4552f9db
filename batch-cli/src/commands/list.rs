use crate::commands::CatalogArgs;
use crate::output;

use clap::Args;
use color_eyre::Result;

/// Print the descriptor catalog
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let catalog = args.catalog.load()?;

    output::header(&format!("{} descriptors", catalog.len()));
    for spec in &catalog.descriptors {
        println!("  {:>2}  {}", spec.id, spec.name);
        for group in &spec.groups {
            if group.params.is_empty() {
                println!("        (no parameters)");
                continue;
            }
            for param in &group.params {
                println!("        {} = [{}]", param.name, param.values.join(", "));
            }
        }
        output::dim(&format!("        {} job(s) per image", spec.jobs_per_image()));
    }

    Ok(())
}
