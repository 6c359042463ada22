/*
 * File: /src/worker.rs
 * Created Date: Monday, July 20th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Worker Pool Orchestration
//!
//! Spawns one thread per declared worker and drives each through the
//! merge/adjust/rename pipeline followed by the similarity engine. Workers
//! share nothing but the [`WorkerGroup`] rendezvous and the tmp directory;
//! a fatal outcome in any worker aborts the whole group at the next phase
//! boundary, and the group's joined result surfaces the root cause.

use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::partition::symmetric_blocks;
use crate::pipeline::MergePipeline;
use crate::similarity::SimilarityEngine;
use crate::sync::{WorkerGroup, COORDINATOR};
use crate::util::format_elapsed;

/// Run the full post-processing pipeline with `config.n_workers()` threads.
///
/// Returns `Ok(())` only when every worker completed every phase. On a
/// collective abort the first primary error (not [`PipelineError::Aborted`])
/// is returned.
pub fn run_ensemble(config: &RunConfig) -> Result<(), PipelineError> {
    run_ensemble_with_pool(config, config.n_workers())
}

/// Like [`run_ensemble`], but with an explicit pool size. A pool that
/// disagrees with the declared worker count is a configuration mismatch,
/// detected before any filesystem work.
pub fn run_ensemble_with_pool(config: &RunConfig, pool: usize) -> Result<(), PipelineError> {
    if pool != config.n_workers() {
        return Err(PipelineError::Config(format!(
            "launched worker count ({}) does not match the declared number of workers ({})",
            pool,
            config.n_workers()
        )));
    }

    let n_workers = config.n_workers();
    let group = Arc::new(WorkerGroup::new(n_workers));
    let tmp_dir = config.tmp_dir();
    let start = Instant::now();

    info!(
        "Post-processing {} ICA runs in {} with {} workers ({} block tasks)",
        config.iterations(),
        tmp_dir.display(),
        n_workers,
        symmetric_blocks(n_workers).len()
    );

    let results: Vec<Result<(), PipelineError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..n_workers)
            .map(|rank| {
                let group = Arc::clone(&group);
                let pipeline =
                    MergePipeline::new(tmp_dir.clone(), n_workers, config.options().clone());
                let engine = SimilarityEngine::new(tmp_dir.clone(), n_workers);
                scope.spawn(move || worker_main(rank, &group, &pipeline, &engine))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    collect_group_result(results)?;
    info!("Ensemble post-processing done; {}", format_elapsed(start.elapsed()));
    Ok(())
}

fn worker_main(
    rank: usize,
    group: &WorkerGroup,
    pipeline: &MergePipeline,
    engine: &SimilarityEngine,
) -> Result<(), PipelineError> {
    pipeline.run(group, rank)?;
    engine.run(group, rank)?;
    if rank == COORDINATOR {
        info!("Worker group completed all phases");
    }
    Ok(())
}

/// Reduce per-worker outcomes to one: prefer the primary error over the
/// secondary `Aborted` echoes it caused.
fn collect_group_result(
    results: Vec<Result<(), PipelineError>>,
) -> Result<(), PipelineError> {
    let mut secondary = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_secondary() => secondary = Some(e),
            Err(e) => return Err(e),
        }
    }
    match secondary {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeOptions;
    use std::path::PathBuf;

    #[test]
    fn test_pool_mismatch_is_rejected_before_any_work() {
        let config = RunConfig::with_options(
            PathBuf::from("/nonexistent"),
            4,
            10,
            MergeOptions::default(),
        )
        .unwrap();
        match run_ensemble_with_pool(&config, 3) {
            Err(PipelineError::Config(msg)) => {
                assert!(msg.contains("launched worker count (3)"))
            }
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_collect_prefers_primary_error() {
        let results = vec![
            Ok(()),
            Err(PipelineError::Aborted("echo".to_string())),
            Err(PipelineError::Config("root cause".to_string())),
        ];
        match collect_group_result(results) {
            Err(PipelineError::Config(msg)) => assert_eq!(msg, "root cause"),
            other => panic!("expected primary error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_collect_all_ok() {
        assert!(collect_group_result(vec![Ok(()), Ok(())]).is_ok());
    }
}
