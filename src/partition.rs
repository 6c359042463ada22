/*
 * File: /src/partition.rs
 * Created Date: Monday, June 22nd 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Task Partitioner
//!
//! Static, data-independent work assignment. The full task set for `n`
//! workers is the upper-triangular (including diagonal) grid of block pairs
//! `{(i, j) : 0 <= i <= j < n}`, handed out round-robin so that no worker
//! holds more than one task above any other.
//!
//! The same round-robin splitter is reused by the similarity engine on its
//! global file-pair list: one deterministic task list split by worker index,
//! never per-worker rediscovery.

/// One symmetric block-pair task: compute similarity between worker `i`'s
/// components and worker `j`'s components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskBlock {
    pub i: usize,
    pub j: usize,
}

impl TaskBlock {
    pub fn new(i: usize, j: usize) -> TaskBlock {
        debug_assert!(i <= j);
        TaskBlock { i, j }
    }
}

/// The full set of `n * (n + 1) / 2` symmetric block pairs, row-major.
pub fn symmetric_blocks(n_workers: usize) -> Vec<TaskBlock> {
    let mut tasks = Vec::with_capacity(n_workers * (n_workers + 1) / 2);
    for i in 0..n_workers {
        for j in i..n_workers {
            tasks.push(TaskBlock::new(i, j));
        }
    }
    tasks
}

/// Deal `tasks` to `n_workers` buckets round-robin: task `k` goes to worker
/// `k mod n_workers`. Pure; per-worker counts differ by at most one.
pub fn assign_round_robin<T>(tasks: Vec<T>, n_workers: usize) -> Vec<Vec<T>> {
    assert!(n_workers > 0, "cannot assign tasks to zero workers");
    let mut buckets: Vec<Vec<T>> = (0..n_workers).map(|_| Vec::new()).collect();
    for (k, task) in tasks.into_iter().enumerate() {
        buckets[k % n_workers].push(task);
    }
    buckets
}
