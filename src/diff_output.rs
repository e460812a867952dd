use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::str::FromStr;

use camino::Utf8Path;
use serde::Serialize;

use crate::error::DiffExprError;
use crate::platform::DiffExprDataEntry;

// Positional layout of the tool's output. Header names are informational
// only; values are read by position.
pub const DIFF_COLUMNS: [&str; 14] = [
    "test_id",
    "gene_id",
    "gene",
    "locus",
    "sample_1",
    "sample_2",
    "status",
    "value_1",
    "value_2",
    "log2(fold_change)",
    "test_stat",
    "p_value",
    "q_value",
    "significant",
];

const COMPARISON_HEADER: &str = "gene_id\tlog2_fold_change\tp_value\tq_value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Ok,
    NoTest,
    LowData,
    HiData,
    Fail,
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OK" => Ok(TestStatus::Ok),
            "NOTEST" => Ok(TestStatus::NoTest),
            "LOWDATA" => Ok(TestStatus::LowData),
            "HIDATA" => Ok(TestStatus::HiData),
            "FAIL" => Ok(TestStatus::Fail),
            other => Err(format!("unknown test status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConditionPair {
    pub condition_1: String,
    pub condition_2: String,
}

impl fmt::Display for ConditionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~~{}", self.condition_1, self.condition_2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffExpressionRecord {
    pub test_id: String,
    pub gene_id: String,
    pub gene: String,
    pub locus: String,
    pub condition_1: String,
    pub condition_2: String,
    pub status: TestStatus,
    pub value_1: f64,
    pub value_2: f64,
    pub log2_fold_change: f64,
    pub test_stat: f64,
    pub p_value: f64,
    pub q_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub pair: ConditionPair,
    pub records: Vec<DiffExpressionRecord>,
}

impl Comparison {
    pub fn significant_count(&self) -> usize {
        self.records.iter().filter(|record| record.significant).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffExprTable {
    pub comparisons: Vec<Comparison>,
}

impl DiffExprTable {
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.comparisons.iter().map(|c| c.records.len()).sum()
    }

    pub fn comparison(&self, pair: &ConditionPair) -> Option<&Comparison> {
        self.comparisons.iter().find(|c| &c.pair == pair)
    }
}

pub fn parse_diff_file(path: &Utf8Path) -> Result<DiffExprTable, DiffExprError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| DiffExprError::Filesystem(format!("read {path}: {err}")))?;
    parse_diff_text(&content)
}

pub fn parse_diff_text(content: &str) -> Result<DiffExprTable, DiffExprError> {
    let mut table = DiffExprTable::default();
    let mut index: BTreeMap<ConditionPair, usize> = BTreeMap::new();
    let mut seen_header = false;

    for (offset, raw) in content.lines().enumerate() {
        let line_no = offset + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != DIFF_COLUMNS.len() {
            return Err(DiffExprError::Parse {
                line: line_no,
                message: format!(
                    "expected {} columns, found {}",
                    DIFF_COLUMNS.len(),
                    fields.len()
                ),
            });
        }
        if !seen_header {
            seen_header = true;
            continue;
        }

        let record = parse_record(&fields, line_no)?;
        let pair = ConditionPair {
            condition_1: record.condition_1.clone(),
            condition_2: record.condition_2.clone(),
        };
        let slot = *index.entry(pair.clone()).or_insert_with(|| {
            table.comparisons.push(Comparison {
                pair,
                records: Vec::new(),
            });
            table.comparisons.len() - 1
        });
        table.comparisons[slot].records.push(record);
    }

    Ok(table)
}

fn parse_record(fields: &[&str], line: usize) -> Result<DiffExpressionRecord, DiffExprError> {
    let number = |column: usize| parse_value(fields[column], DIFF_COLUMNS[column], line);
    let status = fields[6]
        .parse::<TestStatus>()
        .map_err(|message| DiffExprError::Parse { line, message })?;
    let significant = match fields[13] {
        "yes" => true,
        "no" => false,
        other => {
            return Err(DiffExprError::Parse {
                line,
                message: format!("significant must be yes or no, found {other:?}"),
            });
        }
    };

    Ok(DiffExpressionRecord {
        test_id: fields[0].to_string(),
        gene_id: fields[1].to_string(),
        gene: fields[2].to_string(),
        locus: fields[3].to_string(),
        condition_1: fields[4].to_string(),
        condition_2: fields[5].to_string(),
        status,
        value_1: number(7)?,
        value_2: number(8)?,
        log2_fold_change: number(9)?,
        test_stat: number(10)?,
        p_value: number(11)?,
        q_value: number(12)?,
        significant,
    })
}

fn parse_value(raw: &str, column: &str, line: usize) -> Result<f64, DiffExprError> {
    match raw.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" | "-nan" | "+nan" => Ok(f64::NAN),
        _ => raw.parse::<f64>().map_err(|_| DiffExprError::Parse {
            line,
            message: format!("{column} is not a number: {raw:?}"),
        }),
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if value != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

pub fn write_comparison_files(
    table: &DiffExprTable,
    dir: &Utf8Path,
) -> Result<Vec<DiffExprDataEntry>, DiffExprError> {
    let mut entries = Vec::with_capacity(table.comparisons.len());
    for comparison in &table.comparisons {
        let path = dir.join(format!("{}.tsv", comparison.pair));
        let file = File::create(path.as_std_path())
            .map_err(|err| DiffExprError::Filesystem(format!("create {path}: {err}")))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{COMPARISON_HEADER}")
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        for record in &comparison.records {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                record.gene,
                format_value(record.log2_fold_change),
                format_value(record.p_value),
                format_value(record.q_value)
            )
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;
        }
        out.flush()
            .map_err(|err| DiffExprError::Filesystem(err.to_string()))?;

        entries.push(DiffExprDataEntry {
            condition_mapping: BTreeMap::from([(
                comparison.pair.condition_1.clone(),
                comparison.pair.condition_2.clone(),
            )]),
            diffexpr_filepath: path.to_string(),
            delimter: "\t".to_string(),
        });
    }
    Ok(entries)
}
