use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use eegseg::recording::Recording;
use eegseg::timeline::{Catalog, Timeline};

#[derive(Parser)]
#[command(name = "timeline", about = "Print the reconstructed condition/event timeline of recordings as JSON")]
struct Args {
    /// Recording files (.safetensors)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Print only the merged condition/event catalog
    #[arg(long)]
    catalog: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Entry {
    file: PathBuf,
    timeline: Timeline,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose > 0 { log::LevelFilter::Debug } else { log::LevelFilter::Warn })
        .format_timestamp(None)
        .init();

    let mut catalog = Catalog::new();
    let mut entries = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        let rec = Recording::load(path)?;
        let timeline = Timeline::reconstruct(&rec.marks, &rec.times)
            .with_context(|| format!("reconstructing timeline of {}", path.display()))?;
        catalog.add(&timeline);
        entries.push(Entry { file: path.clone(), timeline });
    }

    let json = if args.catalog {
        serde_json::to_string_pretty(&catalog)?
    } else {
        serde_json::to_string_pretty(&entries)?
    };
    println!("{json}");
    Ok(())
}
