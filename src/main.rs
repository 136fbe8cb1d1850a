// Command-line entry point for Probecraft.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use probecraft::application::{InstrumentJob, InstrumentUsecase};
use probecraft::domain::select::Targets;
use probecraft::infrastructure::{concurrency, unit_loader};
use probecraft::ports::UnitCoverage;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serialized unit file (can specify multiple)
    #[arg(short, long, required = false)]
    input: Vec<PathBuf>,

    /// Folder(s) of serialized units
    #[arg(short = 'd', long, required = false)]
    folder: Vec<PathBuf>,

    /// Coverage JSON from the collector; without it every line counts
    #[arg(short, long)]
    coverage: Option<PathBuf>,

    /// Named-target JSON (line -> identifiers per unit); without it every
    /// eligible expression is probed
    #[arg(short, long)]
    targets: Option<PathBuf>,

    /// Output directory for instrumented sources, line maps, probe reports
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    concurrency::init_thread_pool()?;

    let paths = unit_loader::collect_inputs(&cli.input, &cli.folder)?;
    if paths.is_empty() {
        bail!("provide at least one --input <file> or --folder <dir>");
    }

    let coverage = match &cli.coverage {
        Some(p) => Some(unit_loader::load_coverage(p)?),
        None => None,
    };
    let targets = match &cli.targets {
        Some(p) => Some(unit_loader::load_targets(p)?),
        None => None,
    };

    let mut jobs = Vec::new();
    for path in &paths {
        match unit_loader::load_unit(path) {
            Ok(unit) => {
                let cov = coverage
                    .as_ref()
                    .map(|c| c.for_unit(&unit.path))
                    .unwrap_or(UnitCoverage::Full);
                let tgt = targets
                    .as_ref()
                    .map(|t| t.for_unit(&unit.path))
                    .unwrap_or(Targets::AllEligible);
                jobs.push(InstrumentJob { unit, coverage: cov, targets: tgt });
            }
            Err(e) => eprintln!("[WARN] skipping {}: {:#}", path.display(), e),
        }
    }
    if jobs.is_empty() {
        bail!("no loadable units among {} input file(s)", paths.len());
    }

    let usecase = InstrumentUsecase { out_dir: &cli.output };
    let results = usecase.run(jobs);

    let mut failed = 0usize;
    for (unit, result) in &results {
        match result {
            Ok(o) => println!(
                "Instrumented {}: {} probes, {} line ranges -> {}",
                unit,
                o.probes,
                o.ranges,
                o.instrumented_path.display()
            ),
            Err(e) => {
                failed += 1;
                eprintln!("Error instrumenting {}: {:#}", unit, e);
            }
        }
    }
    println!(
        "Instrumentation completed: {} unit(s), {} failed. Output written to {}",
        results.len(),
        failed,
        cli.output.display()
    );
    if failed == results.len() {
        bail!("all units failed");
    }
    Ok(())
}
