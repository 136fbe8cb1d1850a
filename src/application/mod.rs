// Instrumentation use case. Each unit runs the same pipeline: select probes
// over covered code, rewrite a working copy of the tree, print it, reconcile
// lines, and export the artifacts. Units are independent, so they fan out
// over rayon and one unit's failure never aborts the rest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dashmap::DashMap;
use rayon::prelude::*;

use crate::domain::inject::ProbeInjector;
use crate::domain::line_map::compute_line_mapping;
use crate::domain::printer::{assign_spans, print_unit};
use crate::domain::select::{select, Targets};
use crate::infrastructure::unit_loader::SourceUnit;
use crate::infrastructure::writer;
use crate::ports::report_exporter::ReportExporter;
use crate::ports::{Coverage, UnitCoverage};

/// One unit to instrument, with its own coverage and target set.
pub struct InstrumentJob {
    pub unit: SourceUnit,
    pub coverage: UnitCoverage,
    pub targets: Targets,
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub probes: usize,
    pub ranges: usize,
    pub instrumented_path: PathBuf,
}

pub struct InstrumentUsecase<'a> {
    pub out_dir: &'a Path,
}

impl InstrumentUsecase<'_> {
    /// Instrument every job in parallel. Returns per-unit outcomes keyed by
    /// the unit's source path, sorted for deterministic reporting.
    pub fn run(&self, jobs: Vec<InstrumentJob>) -> Vec<(String, Result<UnitOutcome>)> {
        let results: DashMap<String, Result<UnitOutcome>> = DashMap::new();
        jobs.into_par_iter().for_each(|job| {
            let key = job.unit.path.clone();
            let outcome = self.run_unit(job);
            results.insert(key, outcome);
        });
        let mut out: Vec<_> = results.into_iter().collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn run_unit(&self, job: InstrumentJob) -> Result<UnitOutcome> {
        let InstrumentJob { mut unit, coverage, targets } = job;
        // Programmatically built units arrive without spans; lay them out.
        if !unit.tree.has_spans() {
            assign_spans(&mut unit.tree, unit.root);
        }
        let covered = |span| coverage.is_covered(span);
        let sel = select(&unit.tree, unit.root, &covered, &targets);
        let mut forest = sel.forest;
        let mut injector = ProbeInjector::new(&unit.tree, sel.non_init);
        injector.inject(&mut forest);
        let out = injector.into_tree();

        let printed = print_unit(&out, unit.root);
        let matcher = compute_line_mapping(&out, unit.root, &printed)
            .with_context(|| format!("reconciling lines for {}", unit.path))?;
        let report = ReportExporter::probe_report(&unit.tree, &forest);

        let file = Path::new(&unit.path)
            .file_name()
            .with_context(|| format!("unit path {} has no file name", unit.path))?;
        let stem = Path::new(file).file_stem().unwrap_or(file).to_string_lossy().into_owned();
        let instrumented_path = self.out_dir.join(file);
        writer::write_atomic(&instrumented_path, &printed.text)
            .with_context(|| format!("writing instrumented source for {}", unit.path))?;
        ReportExporter::export_line_map(
            &matcher,
            &self.out_dir.join(format!("{}.linemap.json", stem)),
        )?;
        ReportExporter::export_probe_report(
            &report,
            &self.out_dir.join(format!("{}.probes.json", stem)),
        )?;

        Ok(UnitOutcome { probes: report.len(), ranges: matcher.len(), instrumented_path })
    }
}
