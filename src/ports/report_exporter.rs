// JSON exporters for the execution monitor: the per-unit line table and the
// probe report mapping each synthetic name back to its original target.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::line_map::LineMatcher;
use crate::domain::printer::expr_text;
use crate::domain::probe::ProbeForest;
use crate::domain::tree::Tree;
use crate::infrastructure::writer;

/// One captured expression: the synthetic variable the monitor reads, the
/// original expression text, and the original line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReportRow {
    pub name: String,
    pub target: String,
    pub line: u32,
}

pub struct ReportExporter;

impl ReportExporter {
    /// Rows for every probe that actually materialized. `tree` is the
    /// original unit tree; probe targets are handles into it.
    pub fn probe_report(tree: &Tree, forest: &ProbeForest) -> Vec<ProbeReportRow> {
        forest
            .iter()
            .filter(|(_, p)| p.probe_node.is_some())
            .map(|(_, p)| ProbeReportRow {
                name: p.name.clone(),
                target: expr_text(tree, p.target),
                line: tree.span(p.target).start,
            })
            .collect()
    }

    pub fn export_line_map(matcher: &LineMatcher, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(matcher).context("serializing line map")?;
        writer::write_atomic(path, &json)
    }

    pub fn export_probe_report(rows: &[ProbeReportRow], path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(rows).context("serializing probe report")?;
        writer::write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inject::ProbeInjector;
    use crate::domain::printer::assign_spans;
    use crate::domain::select::{select, Targets};
    use crate::domain::tree::{InfixOp, LineSpan, NodeKind, Prim, Type};

    fn everything(_: LineSpan) -> bool {
        true
    }

    #[test]
    fn report_lists_materialized_probes_with_their_lines() {
        // { int x = a + b; }
        let mut t = Tree::new();
        let a = t.name("a");
        let b = t.name("b");
        let sum = t.add(NodeKind::Infix { op: InfixOp::Plus, left: a, right: b, extended: vec![] });
        let decl = t.var_decl(Type::Primitive(Prim::Int), "x", Some(sum));
        let root = t.block(vec![decl]);
        assign_spans(&mut t, root);

        let sel = select(&t, root, &everything, &Targets::AllEligible);
        let mut forest = sel.forest;
        let mut injector = ProbeInjector::new(&t, sel.non_init);
        injector.inject(&mut forest);

        let rows = ReportExporter::probe_report(&t, &forest);
        assert_eq!(rows.len(), 3, "{:?}", rows);
        assert!(rows.iter().any(|r| r.name == "expr1_line_2" && r.target == "a + b" && r.line == 2));
        assert!(rows.iter().any(|r| r.name == "a_line_2" && r.target == "a"));
        assert!(rows.iter().any(|r| r.name == "b_line_2" && r.target == "b"));
    }

    #[test]
    fn exported_report_reads_back() {
        let rows = vec![ProbeReportRow { name: "a_line_2".into(), target: "a".into(), line: 2 }];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probes.json");
        ReportExporter::export_probe_report(&rows, &path).unwrap();
        let back: Vec<ProbeReportRow> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, rows);
    }
}
