/*
 * File: /src/pipeline.rs
 * Created Date: Thursday, July 2nd 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Merge/Adjust/Rename Pipeline
//!
//! Four-phase barrier-synchronized protocol that reshapes the raw per-run
//! tables into the canonical per-worker layout the similarity engine and the
//! downstream clustering consume:
//!
//! 1. **Prune** — the coordinator deletes near-empty tables together with
//!    their paired counterpart.
//! 2. **Merge** — raw `proc_tmp_{iter}_{S|A}.csv` files are partitioned into
//!    `nWorkers` contiguous groups and column-concatenated into one
//!    `proc_{rank}_{S|A}.csv` per worker; the coordinator deletes the merged
//!    raw files after a barrier confirms every worker has written its output.
//! 3. **Adjust** — each worker rescales its own S/A pair by the factor
//!    `sqrt(S.num_rows)`, derived once per pair.
//! 4. **Renumber** — the coordinator renames the surviving consolidated
//!    files to a dense `0..K-1` sequence.
//!
//! Every phase ends in a [`WorkerGroup::sync`]; a fatal condition observed by
//! any worker (a structural shortage, a row-count mismatch, a rename
//! collision) aborts the whole group instead of leaving the others waiting.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};

use crate::config::{MergeOptions, RemainderPolicy};
use crate::error::PipelineError;
use crate::sync::{WorkerGroup, COORDINATOR};
use crate::util::timestamp;
use crate::table::{
    counterpart_name, merged_file_name, parse_merged, parse_raw, ComponentTable, MatrixKind,
};

pub struct MergePipeline {
    tmp_dir: PathBuf,
    n_workers: usize,
    options: MergeOptions,
}

/// How one kind's raw file list is split across workers. Deterministic given
/// the same sorted listing, so every worker and the coordinator derive the
/// identical plan independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePlan {
    pub total: usize,
    /// Count of leading files that get merged (and later deleted).
    pub merged: usize,
    per_worker: usize,
    policy: RemainderPolicy,
    n_workers: usize,
}

impl MergePlan {
    /// Plan the split, or report the structural shortage that makes a split
    /// impossible.
    pub fn build(
        total: usize,
        n_workers: usize,
        policy: RemainderPolicy,
        kind: MatrixKind,
    ) -> Result<MergePlan, PipelineError> {
        if total < n_workers {
            return Err(PipelineError::Shortage {
                kind,
                found: total,
                required: n_workers,
            });
        }
        let remainder = total % n_workers;
        let merged = match policy {
            RemainderPolicy::LeaveUnmerged => total - remainder,
            RemainderPolicy::AppendToLast => total,
        };
        Ok(MergePlan {
            total,
            merged,
            per_worker: total / n_workers,
            policy,
            n_workers,
        })
    }

    /// Index range of the raw files assigned to `rank`.
    pub fn group(&self, rank: usize) -> Range<usize> {
        debug_assert!(rank < self.n_workers);
        let start = rank * self.per_worker;
        let end = if self.policy == RemainderPolicy::AppendToLast && rank == self.n_workers - 1 {
            self.total
        } else {
            start + self.per_worker
        };
        start..end
    }
}

impl MergePipeline {
    pub fn new(tmp_dir: PathBuf, n_workers: usize, options: MergeOptions) -> MergePipeline {
        MergePipeline {
            tmp_dir,
            n_workers,
            options,
        }
    }

    /// Run the full 4-phase protocol as worker `rank` of `group`.
    pub fn run(&self, group: &WorkerGroup, rank: usize) -> Result<(), PipelineError> {
        let start = Instant::now();

        // Phase 1: prune degenerate file pairs. Coordinator only; per-file
        // failures are absorbed.
        if rank == COORDINATOR {
            info!("[{}] Checking and deleting small files", timestamp());
            let removed = self.prune_small_tables();
            if removed > 0 {
                info!("Pruned {} degenerate files", removed);
            }
        }
        group.checkpoint(rank)?;

        // Phase 2: merge raw files into one consolidated file per worker.
        if rank == COORDINATOR {
            info!("[{}] Merging csv files", timestamp());
        }
        let outcome = MatrixKind::BOTH
            .iter()
            .try_for_each(|&kind| self.merge_kind(kind, rank));
        group.sync(rank, outcome)?;

        // Raw-file cleanup is attributable to exactly one worker, and only
        // after the barrier confirms every output was written.
        let outcome = if rank == COORDINATOR {
            MatrixKind::BOTH
                .iter()
                .try_for_each(|&kind| self.delete_merged_raw(kind))
        } else {
            Ok(())
        };
        group.sync(rank, outcome)?;

        // Phase 3: each worker rescales its own S/A pair.
        if rank == COORDINATOR {
            info!("[{}] Adjusting matrices", timestamp());
        }
        let outcome = self.adjust_pair(rank);
        group.sync(rank, outcome)?;

        // Phase 4: dense renumbering of the survivors.
        let outcome = if rank == COORDINATOR {
            self.renumber()
        } else {
            Ok(())
        };
        group.sync(rank, outcome)?;

        if rank == COORDINATOR {
            info!(
                "Merge pipeline completed in {:.2?}",
                start.elapsed()
            );
        }
        Ok(())
    }

    /// Delete every CSV smaller than the viability threshold, together with
    /// its S/A counterpart. Errors here are transient and local: log and
    /// keep going.
    pub fn prune_small_tables(&self) -> usize {
        let entries = match fs::read_dir(&self.tmp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", self.tmp_dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".csv") {
                continue;
            }
            let path = entry.path();
            let size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                // Deleted since listing, possibly as someone's counterpart.
                Err(_) => continue,
            };
            if size >= self.options.min_table_bytes {
                continue;
            }

            warn!("Deleting degenerate table {}", name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to delete {}: {}", path.display(), e);
                continue;
            }
            removed += 1;

            if let Some(partner) = counterpart_name(&name) {
                let partner_path = self.tmp_dir.join(&partner);
                if partner_path.exists() {
                    warn!("Deleting counterpart {}", partner);
                    match fs::remove_file(&partner_path) {
                        Ok(()) => removed += 1,
                        Err(e) => warn!("Failed to delete {}: {}", partner_path.display(), e),
                    }
                }
            }
        }
        removed
    }

    /// Raw files of one kind, sorted ascending by iteration number.
    fn list_raw(&self, kind: MatrixKind) -> Result<Vec<(usize, String)>, PipelineError> {
        let entries = fs::read_dir(&self.tmp_dir)
            .map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((iter, k)) = parse_raw(&name) {
                if k == kind {
                    files.push((iter, name));
                }
            }
        }
        files.sort_by_key(|(iter, _)| *iter);
        Ok(files)
    }

    /// Consolidated files of one kind, sorted ascending by run id.
    fn list_merged(&self, kind: MatrixKind) -> Result<Vec<(usize, String)>, PipelineError> {
        let entries = fs::read_dir(&self.tmp_dir)
            .map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((id, k)) = parse_merged(&name) {
                if k == kind {
                    files.push((id, name));
                }
            }
        }
        files.sort_by_key(|(id, _)| *id);
        Ok(files)
    }

    /// Column-concatenate this worker's group of raw `kind` files into
    /// `proc_{rank}_{kind}.csv`.
    fn merge_kind(&self, kind: MatrixKind, rank: usize) -> Result<(), PipelineError> {
        let files = self.list_raw(kind)?;
        let plan = MergePlan::build(
            files.len(),
            self.n_workers,
            self.options.remainder_policy,
            kind,
        )?;

        // Shortage was ruled out above, so every rank has at least one file.
        let group = &files[plan.group(rank)];
        let (first, rest) = match group.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        let mut merged = ComponentTable::read_csv(&self.tmp_dir.join(&first.1))?;
        for (_, name) in rest {
            let path = self.tmp_dir.join(name);
            let table = ComponentTable::read_csv(&path)?;
            merged
                .append_columns(&table)
                .map_err(|msg| PipelineError::MalformedTable(path, msg))?;
        }

        let out_path = self.tmp_dir.join(merged_file_name(rank, kind));
        merged.write_csv(&out_path)
    }

    /// Delete the raw files covered by the merge plan. Coordinator only,
    /// after the post-merge barrier.
    fn delete_merged_raw(&self, kind: MatrixKind) -> Result<(), PipelineError> {
        let files = self.list_raw(kind)?;
        let plan = MergePlan::build(
            files.len(),
            self.n_workers,
            self.options.remainder_policy,
            kind,
        )?;
        for (_, name) in &files[..plan.merged] {
            let path = self.tmp_dir.join(name);
            fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
        }
        Ok(())
    }

    /// Rescale this worker's consolidated S/A pair: `S /= sqrt(n)`,
    /// `A *= sqrt(n)`, with `n` taken once from the S table of the pair.
    /// Undoes the row-count-dependent normalization applied upstream.
    fn adjust_pair(&self, rank: usize) -> Result<(), PipelineError> {
        let s_path = self.tmp_dir.join(merged_file_name(rank, MatrixKind::Sources));
        let a_path = self.tmp_dir.join(merged_file_name(rank, MatrixKind::Mixing));
        if !s_path.exists() && !a_path.exists() {
            return Ok(());
        }

        let mut s_table = ComponentTable::read_csv(&s_path)?;
        let mut a_table = ComponentTable::read_csv(&a_path)?;
        if s_table.num_rows() != a_table.num_rows() {
            return Err(PipelineError::RowCountMismatch {
                run_id: rank,
                s_rows: s_table.num_rows(),
                a_rows: a_table.num_rows(),
            });
        }

        let factor = (s_table.num_rows() as f64).sqrt();
        s_table.scale(1.0 / factor);
        a_table.scale(factor);
        s_table.write_csv(&s_path)?;
        a_table.write_csv(&a_path)
    }

    /// Rename surviving consolidated files of both kinds to a dense
    /// `0..K-1` sequence, preserving relative order. A pre-existing target
    /// is an invariant violation, never silently overwritten.
    fn renumber(&self) -> Result<(), PipelineError> {
        for kind in MatrixKind::BOTH {
            let files = self.list_merged(kind)?;
            for (next_id, (id, name)) in files.iter().enumerate() {
                if *id == next_id {
                    continue;
                }
                let from = self.tmp_dir.join(name);
                let to = self.tmp_dir.join(merged_file_name(next_id, kind));
                if to.exists() {
                    return Err(PipelineError::RenameCollision { from, to });
                }
                fs::rename(&from, &to).map_err(|e| PipelineError::io(&from, e))?;
            }
        }
        info!("Renaming to sequential order completed");
        Ok(())
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}
