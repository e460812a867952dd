use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunResult;
use crate::diff_output::{ConditionPair, DiffExprTable};

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonSummary {
    pub pair: ConditionPair,
    pub rows: usize,
    pub significant: usize,
}

pub fn summarize_table(table: &DiffExprTable) -> Vec<ComparisonSummary> {
    table
        .comparisons
        .iter()
        .map(|comparison| ComparisonSummary {
            pair: comparison.pair.clone(),
            rows: comparison.records.len(),
            significant: comparison.significant_count(),
        })
        .collect()
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_table(table: &DiffExprTable) -> io::Result<()> {
        Self::print_json(&summarize_table(table))
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}
