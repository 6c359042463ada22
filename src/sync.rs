/*
 * File: /src/sync.rs
 * Created Date: Monday, June 29th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Worker Group Rendezvous
//!
//! Barrier synchronization plus an explicit abort token for a fixed pool of
//! worker threads. Every phase of the pipeline ends in [`WorkerGroup::sync`]:
//! the worker hands in its phase outcome, waits for the rest of the group,
//! and learns whether anyone posted a fatal outcome.
//!
//! A worker that fails still arrives at the barrier, so barrier counts always
//! match and a single failure can never leave the rest of the group waiting
//! forever. Each rendezvous is two-stage: the first wait publishes every
//! worker's outcome, the second holds the group until everyone has read the
//! verdict, so an abort posted for a later phase can never leak into the
//! current one. The abort reason is reported once, attributed to the
//! coordinator (rank 0).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};

use log::error;

use crate::error::PipelineError;

/// Rank of the coordinator worker, which performs directory-wide
/// bookkeeping (prune, raw-file deletion, renumber) and progress logging.
pub const COORDINATOR: usize = 0;

pub struct WorkerGroup {
    n_workers: usize,
    barrier: Barrier,
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
    reported: AtomicBool,
}

impl WorkerGroup {
    pub fn new(n_workers: usize) -> WorkerGroup {
        WorkerGroup {
            n_workers,
            barrier: Barrier::new(n_workers),
            aborted: AtomicBool::new(false),
            reason: Mutex::new(None),
            reported: AtomicBool::new(false),
        }
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// True once any worker has posted a fatal outcome.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Record a fatal outcome. The first reason wins; later ones are
    /// ignored so the run reports a single root cause.
    fn post_abort(&self, reason: String) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(|p| p.into_inner());
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn abort_reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Phase boundary: hand in this worker's outcome, wait for the whole
    /// group, then check the abort token.
    ///
    /// Returns `Ok(())` only when no worker failed the phase. The detecting
    /// worker gets its own error back; everyone else gets
    /// [`PipelineError::Aborted`] carrying the recorded reason.
    ///
    /// The rendezvous is two-stage. After the first wait every outcome of
    /// this phase is published; the second wait keeps the whole group inside
    /// the phase until everyone has read the verdict. Without it a fast
    /// worker could race ahead, fail the *next* phase, and have its abort
    /// consumed here by workers still leaving this one, stranding the fast
    /// worker at a barrier nobody else will reach.
    pub fn sync(
        &self,
        rank: usize,
        outcome: Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        if let Err(e) = &outcome {
            if !e.is_secondary() {
                self.post_abort(e.to_string());
            }
        }
        self.barrier.wait();
        let verdict = match self.abort_reason() {
            None => outcome,
            Some(reason) => {
                if rank == COORDINATOR && !self.reported.swap(true, Ordering::SeqCst) {
                    error!("{}", reason);
                }
                match outcome {
                    Err(e) => Err(e),
                    Ok(()) => Err(PipelineError::Aborted(reason)),
                }
            }
        };
        self.barrier.wait();
        verdict
    }

    /// A barrier with no outcome to report.
    pub fn checkpoint(&self, rank: usize) -> Result<(), PipelineError> {
        self.sync(rank, Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_all_ok_passes_through() {
        let group = Arc::new(WorkerGroup::new(3));
        let results: Vec<_> = std::thread::scope(|scope| {
            (0..3)
                .map(|rank| {
                    let group = Arc::clone(&group);
                    scope.spawn(move || group.checkpoint(rank))
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert!(results.iter().all(Result::is_ok));
        assert!(!group.is_aborted());
    }

    #[test]
    fn test_single_failure_aborts_everyone_without_hanging() {
        let group = Arc::new(WorkerGroup::new(4));
        let results: Vec<_> = std::thread::scope(|scope| {
            (0..4)
                .map(|rank| {
                    let group = Arc::clone(&group);
                    scope.spawn(move || {
                        let outcome = if rank == 2 {
                            Err(PipelineError::Config("rank 2 blew up".to_string()))
                        } else {
                            Ok(())
                        };
                        group.sync(rank, outcome)
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        assert!(results.iter().all(Result::is_err));
        // The detector keeps its own error; the others see Aborted.
        let mut primary = 0;
        for (rank, result) in results.iter().enumerate() {
            match result.as_ref().unwrap_err() {
                PipelineError::Aborted(reason) => {
                    assert!(reason.contains("rank 2 blew up"), "rank {}: {}", rank, reason)
                }
                _ => primary += 1,
            }
        }
        assert_eq!(primary, 1);
        assert!(group.is_aborted());
    }

    #[test]
    fn test_late_phase_failure_never_leaks_into_earlier_checkpoint() {
        // One rank races through a clean checkpoint and immediately fails
        // the following phase. The checkpoint verdict must stay Ok for every
        // rank, and the failing phase must stop the whole group. Repeated to
        // shake out scheduling orders.
        for _ in 0..200 {
            let group = Arc::new(WorkerGroup::new(4));
            let results: Vec<_> = std::thread::scope(|scope| {
                (0..4)
                    .map(|rank| {
                        let group = Arc::clone(&group);
                        scope.spawn(move || {
                            let first = group.checkpoint(rank);
                            let outcome = if rank == 3 {
                                Err(PipelineError::Config("merge failed".to_string()))
                            } else {
                                std::thread::yield_now();
                                Ok(())
                            };
                            let second = group.sync(rank, outcome);
                            (first, second)
                        })
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .collect()
            });

            for (rank, (first, second)) in results.iter().enumerate() {
                assert!(first.is_ok(), "rank {} aborted at the clean checkpoint", rank);
                assert!(second.is_err(), "rank {} missed the abort", rank);
            }
            let primaries = results
                .iter()
                .filter(|(_, second)| {
                    !second.as_ref().unwrap_err().is_secondary()
                })
                .count();
            assert_eq!(primaries, 1);
        }
    }

    #[test]
    fn test_first_abort_reason_wins() {
        let group = WorkerGroup::new(1);
        let first = group.sync(0, Err(PipelineError::Config("first".to_string())));
        assert!(first.is_err());
        let second = group.checkpoint(0);
        match second {
            Err(PipelineError::Aborted(reason)) => assert_eq!(reason, "Configuration error: first"),
            other => panic!("expected Aborted, got {:?}", other),
        }
    }
}
