// Input decoding: serialized source units, the coverage file, and the
// optional named-target file, all JSON.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::select::Targets;
use crate::domain::tree::{NodeId, Tree};
use crate::ports::UnitCoverage;

/// One parsed source unit as the parser collaborator serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Original source path; also the key into coverage and target files.
    pub path: String,
    pub root: NodeId,
    pub tree: Tree,
}

pub fn load_unit(path: &Path) -> Result<SourceUnit> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading unit file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding unit {}", path.display()))
}

/// Explicit unit files plus every `.json` found under the given folders.
pub fn collect_inputs(inputs: &[PathBuf], folders: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = inputs.to_vec();
    for folder in folders {
        visit_dir(folder, &mut paths)
            .with_context(|| format!("scanning folder {}", folder.display()))?;
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn visit_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            visit_dir(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Covered lines per unit, as the coverage collector reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageFile {
    pub units: HashMap<String, Vec<u32>>,
}

pub fn load_coverage(path: &Path) -> Result<CoverageFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading coverage file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding coverage {}", path.display()))
}

impl CoverageFile {
    /// A unit missing from the file has no covered lines at all.
    pub fn for_unit(&self, unit: &str) -> UnitCoverage {
        match self.units.get(unit) {
            Some(lines) => UnitCoverage::Lines(lines.iter().copied().collect()),
            None => UnitCoverage::Lines(Default::default()),
        }
    }
}

/// Requested identifiers per unit, keyed by original line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsFile {
    pub units: HashMap<String, HashMap<u32, Vec<String>>>,
}

pub fn load_targets(path: &Path) -> Result<TargetsFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading targets file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding targets {}", path.display()))
}

impl TargetsFile {
    pub fn for_unit(&self, unit: &str) -> Targets {
        match self.units.get(unit) {
            Some(by_line) => Targets::Named(by_line.clone()),
            None => Targets::Named(HashMap::new()),
        }
    }
}
