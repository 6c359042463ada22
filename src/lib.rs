/*
 * File: /src/lib.rs
 * Created Date: Monday, June 15th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # ica_ensemble
//!
//! Distributed post-processing for an ensemble of Independent Component
//! Analysis runs. Every run produces an S (sources) and A (mixing) table of
//! the same dataset in arbitrary component order and sign; this crate
//! reshapes the per-run partial tables into a canonical per-worker layout
//! and computes the thresholded pairwise similarity matrices the downstream
//! clustering consumes.
//!
//! Stages, all executed by a fixed pool of barrier-synchronized workers
//! over a shared `tmp` directory:
//!
//! - [`partition`] — static round-robin task assignment
//! - [`pipeline`] — prune / merge / adjust / renumber protocol
//! - [`similarity`] — sparse pairwise distance computation
//! - [`worker`] — the pool driver ([`worker::run_ensemble`])

pub mod config;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod similarity;
pub mod sync;
pub mod table;
pub mod util;
pub mod worker;

pub use config::{MergeOptions, RemainderPolicy, RunConfig};
pub use error::PipelineError;
pub use worker::run_ensemble;
