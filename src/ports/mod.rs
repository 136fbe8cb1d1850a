// Collaborator seams: the coverage predicate supplied by the outside world,
// and the exporters consumed by the downstream execution monitor.

use std::collections::HashSet;

use crate::domain::tree::LineSpan;

pub mod report_exporter;

/// Which original lines were exercised. Selection only probes covered code.
pub trait Coverage {
    fn is_covered(&self, span: LineSpan) -> bool;
}

/// Coverage for one unit: everything when no coverage file was supplied,
/// otherwise the collector's line set.
#[derive(Debug, Clone)]
pub enum UnitCoverage {
    Full,
    Lines(HashSet<u32>),
}

impl Coverage for UnitCoverage {
    fn is_covered(&self, span: LineSpan) -> bool {
        match self {
            UnitCoverage::Full => !span.is_none(),
            UnitCoverage::Lines(lines) => {
                !span.is_none() && (span.start..=span.end).any(|l| lines.contains(&l))
            }
        }
    }
}
