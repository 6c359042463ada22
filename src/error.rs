/*
 * File: /src/error.rs
 * Created Date: Tuesday, June 16th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Pipeline Error Types
//!
//! Error taxonomy for the ensemble post-processing pipeline.
//!
//! Recoverable per-file issues (a single corrupt table) are absorbed inside
//! the responsible phase and never surface here. Everything below either
//! aborts the whole worker group or fails the run before it starts.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use crate::table::MatrixKind;

/// Fatal outcomes of the merge/adjust/rename pipeline and similarity engine.
#[derive(Debug)]
pub enum PipelineError {
    /// Filesystem failure attributed to a specific path.
    Io(PathBuf, std::io::Error),
    /// CSV parse or encode failure attributed to a specific path.
    Csv(PathBuf, csv::Error),
    /// Invalid run configuration, detected before any filesystem work.
    Config(String),
    /// Fewer raw files of one kind than workers: the merge phase cannot
    /// hand every worker a group, so the whole group must stop.
    Shortage {
        kind: MatrixKind,
        found: usize,
        required: usize,
    },
    /// An S table and its paired A table disagree on row count.
    RowCountMismatch {
        run_id: usize,
        s_rows: usize,
        a_rows: usize,
    },
    /// Renumbering would overwrite an existing file.
    RenameCollision { from: PathBuf, to: PathBuf },
    /// A table file exists but cannot be interpreted as a component table.
    MalformedTable(PathBuf, String),
    /// Failure writing or reading a sparse distance archive.
    Npz(PathBuf, String),
    /// Another worker posted a fatal outcome; this worker stopped at the
    /// next barrier without an error of its own.
    Aborted(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Io(path, e) => write!(f, "I/O error on {}: {}", path.display(), e),
            PipelineError::Csv(path, e) => write!(f, "CSV error on {}: {}", path.display(), e),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Shortage {
                kind,
                found,
                required,
            } => write!(
                f,
                "The number of {} files ({}) is less than the number of workers ({}). Aborting.",
                kind.suffix(),
                found,
                required
            ),
            PipelineError::RowCountMismatch {
                run_id,
                s_rows,
                a_rows,
            } => write!(
                f,
                "Row count mismatch for run {}: S has {} rows, A has {} rows",
                run_id, s_rows, a_rows
            ),
            PipelineError::RenameCollision { from, to } => write!(
                f,
                "Rename collision: {} -> {} already exists",
                from.display(),
                to.display()
            ),
            PipelineError::MalformedTable(path, msg) => {
                write!(f, "Malformed table {}: {}", path.display(), msg)
            }
            PipelineError::Npz(path, msg) => {
                write!(f, "Sparse archive error on {}: {}", path.display(), msg)
            }
            PipelineError::Aborted(reason) => write!(f, "Aborted by worker group: {}", reason),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Io(_, e) => Some(e),
            PipelineError::Csv(_, e) => Some(e),
            _ => None,
        }
    }
}

impl PipelineError {
    /// True for outcomes that were caused by another worker's failure
    /// rather than by this worker itself.
    pub fn is_secondary(&self) -> bool {
        matches!(self, PipelineError::Aborted(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, e: std::io::Error) -> Self {
        PipelineError::Io(path.into(), e)
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, e: csv::Error) -> Self {
        PipelineError::Csv(path.into(), e)
    }
}
