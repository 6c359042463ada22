/*
 * File: /src/table.rs
 * Created Date: Tuesday, June 16th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Component Tables
//!
//! CSV-backed numeric tables produced by the ICA runs: an S (sources) table
//! and an A (mixing) table per run, kept in 1:1 correspondence by run id.
//! Tables carry a persistent row-label column and one header row; the body
//! is an `Array2<f64>`.
//!
//! Also home to the file naming conventions shared with the upstream
//! producer and downstream clustering consumer. These must be preserved
//! bit-for-bit:
//!
//! - raw per-iteration tables: `proc_tmp_{iter}_{S|A}.csv`
//! - consolidated per-worker tables: `proc_{rank}_{S|A}.csv`
//! - pairwise distance files: `dist_{runA}_{runB}.npz`

use std::fs::File;
use std::path::Path;

use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Which half of an ICA decomposition a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixKind {
    /// S matrix: rows are samples/genes, columns are extracted components.
    Sources,
    /// A matrix: mixing weights.
    Mixing,
}

impl MatrixKind {
    pub const BOTH: [MatrixKind; 2] = [MatrixKind::Sources, MatrixKind::Mixing];

    /// File-name suffix letter (`S` or `A`).
    pub fn suffix(&self) -> &'static str {
        match self {
            MatrixKind::Sources => "S",
            MatrixKind::Mixing => "A",
        }
    }
}

/// `proc_tmp_{iter}_{S|A}.csv`
pub fn raw_file_name(iter: usize, kind: MatrixKind) -> String {
    format!("proc_tmp_{}_{}.csv", iter, kind.suffix())
}

/// `proc_{rank}_{S|A}.csv`
pub fn merged_file_name(rank: usize, kind: MatrixKind) -> String {
    format!("proc_{}_{}.csv", rank, kind.suffix())
}

/// `dist_{runA}_{runB}.npz`
pub fn dist_file_name(run_a: usize, run_b: usize) -> String {
    format!("dist_{}_{}.npz", run_a, run_b)
}

fn parse_kind(segment: &str) -> Option<MatrixKind> {
    match segment {
        "S.csv" => Some(MatrixKind::Sources),
        "A.csv" => Some(MatrixKind::Mixing),
        _ => None,
    }
}

/// Parse `proc_tmp_{iter}_{S|A}.csv` into its iteration and kind.
pub fn parse_raw(name: &str) -> Option<(usize, MatrixKind)> {
    let parts: Vec<&str> = name.split('_').collect();
    match parts.as_slice() {
        ["proc", "tmp", iter, tail] => Some((iter.parse().ok()?, parse_kind(tail)?)),
        _ => None,
    }
}

/// Parse `proc_{id}_{S|A}.csv` into its run id and kind. Rejects raw
/// `proc_tmp_*` names.
pub fn parse_merged(name: &str) -> Option<(usize, MatrixKind)> {
    let parts: Vec<&str> = name.split('_').collect();
    match parts.as_slice() {
        ["proc", id, tail] => Some((id.parse().ok()?, parse_kind(tail)?)),
        _ => None,
    }
}

/// Swap the trailing `_S.csv` / `_A.csv` of any table file name, giving the
/// paired counterpart file. Works for raw and consolidated names alike.
pub fn counterpart_name(name: &str) -> Option<String> {
    if let Some(base) = name.strip_suffix("_S.csv") {
        Some(format!("{}_A.csv", base))
    } else {
        name.strip_suffix("_A.csv")
            .map(|base| format!("{}_S.csv", base))
    }
}

/// A 2D numeric table with a persistent row-label axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTable {
    /// Header of the row-label column (pandas leaves this empty).
    pub index_name: String,
    /// Row labels, one per data row.
    pub index: Vec<String>,
    /// Column names, one per data column.
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

impl ComponentTable {
    pub fn new(
        index_name: String,
        index: Vec<String>,
        columns: Vec<String>,
        data: Array2<f64>,
    ) -> ComponentTable {
        debug_assert_eq!(index.len(), data.nrows());
        debug_assert_eq!(columns.len(), data.ncols());
        ComponentTable {
            index_name,
            index,
            columns,
            data,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }

    /// Read a table from CSV: one header row, leading index column, numeric
    /// values elsewhere.
    pub fn read_csv(path: &Path) -> Result<ComponentTable, PipelineError> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::csv(path, e))?
            .clone();
        if headers.is_empty() {
            return Err(PipelineError::MalformedTable(
                path.to_path_buf(),
                "empty header row".to_string(),
            ));
        }
        let index_name = headers[0].to_string();
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
        let n_cols = columns.len();

        let mut index = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::csv(path, e))?;
            if record.len() != n_cols + 1 {
                return Err(PipelineError::MalformedTable(
                    path.to_path_buf(),
                    format!(
                        "row {} has {} fields, expected {}",
                        index.len() + 1,
                        record.len(),
                        n_cols + 1
                    ),
                ));
            }
            index.push(record[0].to_string());
            for field in record.iter().skip(1) {
                let v: f64 = field.trim().parse().map_err(|_| {
                    PipelineError::MalformedTable(
                        path.to_path_buf(),
                        format!("non-numeric value {:?}", field),
                    )
                })?;
                values.push(v);
            }
        }

        let data = Array2::from_shape_vec((index.len(), n_cols), values).map_err(|e| {
            PipelineError::MalformedTable(path.to_path_buf(), format!("shape error: {}", e))
        })?;
        Ok(ComponentTable {
            index_name,
            index,
            columns,
            data,
        })
    }

    /// Write the table back to CSV in the same layout `read_csv` accepts.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new().from_writer(file);

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.index_name.as_str());
        header.extend(self.columns.iter().map(String::as_str));
        writer
            .write_record(&header)
            .map_err(|e| PipelineError::csv(path, e))?;

        for (label, row) in self.index.iter().zip(self.data.rows()) {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(label.clone());
            record.extend(row.iter().map(|v| format_value(*v)));
            writer
                .write_record(&record)
                .map_err(|e| PipelineError::csv(path, e))?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::io(path, e.into()))?;
        Ok(())
    }

    /// Column-concatenate another table onto this one, keeping this table's
    /// row-label column. The caller is responsible for dropping the other
    /// table's labels; a row-count disagreement is an error.
    pub fn append_columns(&mut self, other: &ComponentTable) -> Result<(), String> {
        if other.num_rows() != self.num_rows() {
            return Err(format!(
                "cannot column-concatenate {} rows onto {} rows",
                other.num_rows(),
                self.num_rows()
            ));
        }
        self.columns.extend(other.columns.iter().cloned());
        self.data = concatenate(Axis(1), &[self.data.view(), other.data.view()])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Multiply every value by `factor` in place.
    pub fn scale(&mut self, factor: f64) {
        self.data *= factor;
    }
}

// Integral values keep one decimal place, matching the upstream producer's
// rendering (`1.0`, not `1`); everything else round-trips through `{}`.
fn format_value(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
