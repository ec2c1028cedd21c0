use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use eegseg::config::Settings;
use eegseg::pipeline::{run_pipeline, CancelToken};

#[derive(Parser)]
#[command(name = "segment", about = "Cut EEG recordings into condition / event epochs")]
struct Args {
    /// Settings TOML (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (overrides `output.dir` from the settings)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write preprocessed signals
    #[arg(long)]
    save_preprocessed: bool,

    /// Recording files (.safetensors)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = args.output {
        settings.output.dir = dir;
    }
    settings.output.save_preprocessed |= args.save_preprocessed;

    let cancel = CancelToken::new();
    let report = run_pipeline(&args.inputs, &settings, &cancel, &mut |p| {
        eprintln!("[{:>3}%] {} / {}", p.percent(), p.file, p.band);
    });

    println!(
        "{}/{} files processed, {} outputs saved, {} empty, {} skipped → {}",
        report.files_ok,
        report.files_total,
        report.saved,
        report.empty,
        report.skipped,
        settings.output.dir.display()
    );
    for failure in &report.failures {
        eprintln!("failed: {}: {}", failure.file.display(), failure.message);
    }
    if report.any_failed() {
        bail!("{} of {} files failed", report.failures.len(), report.files_total);
    }
    Ok(())
}
