/*
 * File: /src/config.rs
 * Created Date: Thursday, June 18th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! Run configuration, built from a raw argument iterator the same way the
//! binary receives it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// What to do with leftover raw files when their count is not divisible by
/// the worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemainderPolicy {
    /// Leave the trailing remainder files untouched (floor-division split).
    LeaveUnmerged,
    /// Fold the remainder into the last worker's group.
    AppendToLast,
}

/// Tunable knobs of the merge/adjust/rename pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    pub remainder_policy: RemainderPolicy,
    /// Tables strictly smaller than this are pruned together with their
    /// paired counterpart.
    pub min_table_bytes: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            remainder_policy: RemainderPolicy::LeaveUnmerged,
            min_table_bytes: 1,
        }
    }
}

pub struct RunConfig {
    out_dir: PathBuf,
    n_workers: usize,
    iterations: usize,
    options: MergeOptions,
}

impl RunConfig {
    /// Constructor from raw arguments.
    ///
    /// # Examples
    /// ```bash
    /// $ cargo run -- /data/ica_out 4 100
    /// ```
    pub fn new(mut args: impl Iterator<Item = String>) -> Result<RunConfig, PipelineError> {
        // args:
        // 0: program name
        // 1: output directory ("" for the current directory)
        // 2: number of workers
        // 3: total number of ICA runs
        args.next();
        let out_dir = args
            .next()
            .ok_or_else(|| PipelineError::Config("missing output directory".to_string()))?;
        let n_workers = args
            .next()
            .ok_or_else(|| PipelineError::Config("missing worker count".to_string()))?
            .parse::<usize>()
            .map_err(|e| PipelineError::Config(format!("bad worker count: {}", e)))?;
        let iterations = args
            .next()
            .ok_or_else(|| PipelineError::Config("missing iteration count".to_string()))?
            .parse::<usize>()
            .map_err(|e| PipelineError::Config(format!("bad iteration count: {}", e)))?;

        let out_dir = if out_dir.is_empty() {
            std::env::current_dir()
                .map_err(|e| PipelineError::Config(format!("cannot resolve cwd: {}", e)))?
        } else {
            PathBuf::from(out_dir)
        };

        Self::with_options(out_dir, n_workers, iterations, MergeOptions::default())
    }

    pub fn with_options(
        out_dir: PathBuf,
        n_workers: usize,
        iterations: usize,
        options: MergeOptions,
    ) -> Result<RunConfig, PipelineError> {
        if n_workers == 0 {
            return Err(PipelineError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(RunConfig {
            out_dir,
            n_workers,
            iterations,
            options,
        })
    }

    pub fn out_dir(&self) -> &PathBuf {
        &self.out_dir
    }

    /// The shared rendezvous directory all per-run tables live in.
    pub fn tmp_dir(&self) -> PathBuf {
        self.out_dir.join("tmp")
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }
}
