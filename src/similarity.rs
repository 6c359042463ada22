/*
 * File: /src/similarity.rs
 * Created Date: Monday, July 13th 2026
 * -----
 * HISTORY:
 * Date      		By   	Comments
 * ----------		------	---------------------------------------------------------
 */
//! # Pairwise Similarity Engine
//!
//! Computes `D = |S1ᵀ · S2|` for every ordered pair of consolidated S
//! tables (self-pairs included), zeroes entries below the sparsification
//! threshold, clips the rest to `[0, 1]`, and persists each result as a
//! sparse coordinate-list `.npz` keyed by the two run identifiers.
//!
//! The pair list is built once from the globally shared file set, sorted by
//! run id, and split round-robin across workers by pair index. Recomputing a
//! pair overwrites its file with identical content given identical inputs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use ndarray::{array, Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement};
use rayon::prelude::*;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PipelineError;
use crate::partition::assign_round_robin;
use crate::sync::{WorkerGroup, COORDINATOR};
use crate::table::{dist_file_name, parse_merged, ComponentTable, MatrixKind};
use crate::util::{format_elapsed, timestamp};

/// Absolute-correlation cutoff below which similarity entries are zeroed
/// before persistence. Trades recall of weak matches for sparsity.
pub const SPARSIFY_THRESHOLD: f64 = 0.5;

pub struct SimilarityEngine {
    tmp_dir: PathBuf,
    n_workers: usize,
}

impl SimilarityEngine {
    pub fn new(tmp_dir: PathBuf, n_workers: usize) -> SimilarityEngine {
        SimilarityEngine { tmp_dir, n_workers }
    }

    /// Consolidated S tables, sorted ascending by run id to fix the
    /// canonical pair ordering.
    fn discover_sources(&self) -> Result<Vec<(usize, PathBuf)>, PipelineError> {
        let entries = std::fs::read_dir(&self.tmp_dir)
            .map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.tmp_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((id, MatrixKind::Sources)) = parse_merged(&name) {
                sources.push((id, entry.path()));
            }
        }
        sources.sort_by_key(|(id, _)| *id);
        Ok(sources)
    }

    /// Run this worker's share of the pair grid, then rendezvous with the
    /// group. The coordinator reports completion and elapsed time.
    pub fn run(&self, group: &WorkerGroup, rank: usize) -> Result<(), PipelineError> {
        if rank == COORDINATOR {
            info!("[{}] Computing component distances", timestamp());
        }
        let start = Instant::now();

        let outcome = self.compute_assigned(rank);
        group.sync(rank, outcome)?;

        if rank == COORDINATOR {
            info!("[{}] Distance matrix completed!", timestamp());
            info!("{}", format_elapsed(start.elapsed()));
        }
        Ok(())
    }

    fn compute_assigned(&self, rank: usize) -> Result<(), PipelineError> {
        let sources = self.discover_sources()?;
        let pairs: Vec<(usize, usize)> = (0..sources.len())
            .flat_map(|x| (0..sources.len()).map(move |y| (x, y)))
            .collect();
        let mine = assign_round_robin(pairs, self.n_workers)
            .swap_remove(rank);

        mine.par_iter()
            .try_for_each(|&(x, y)| self.process_pair(&sources[x], &sources[y]))
    }

    fn process_pair(
        &self,
        (id_a, path_a): &(usize, PathBuf),
        (id_b, path_b): &(usize, PathBuf),
    ) -> Result<(), PipelineError> {
        let s1 = ComponentTable::read_csv(path_a)?;
        let s2 = ComponentTable::read_csv(path_b)?;
        if s1.num_rows() != s2.num_rows() {
            return Err(PipelineError::MalformedTable(
                path_b.clone(),
                format!(
                    "S tables of runs {} and {} disagree on row count ({} vs {})",
                    id_a,
                    id_b,
                    s1.num_rows(),
                    s2.num_rows()
                ),
            ));
        }

        let dist = distance_matrix(&s1, &s2);
        let out_path = self.tmp_dir.join(dist_file_name(*id_a, *id_b));
        write_sparse_coo(&out_path, &dist)
    }
}

/// `|S1ᵀ · S2|`, thresholded and clipped. Shape: components of `s1` by
/// components of `s2`.
pub fn distance_matrix(s1: &ComponentTable, s2: &ComponentTable) -> Array2<f64> {
    let mut dist = s1.data.t().dot(&s2.data);
    dist.mapv_inplace(|v| {
        let a = v.abs();
        if a < SPARSIFY_THRESHOLD {
            0.0
        } else {
            a.min(1.0)
        }
    });
    dist
}

fn npz_err(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Npz(path.to_path_buf(), e.to_string())
}

/// Persist a thresholded matrix as coordinate-list arrays (`row`, `col`,
/// `data`, `shape`) plus a `format = b"coo"` marker in an `.npz` archive,
/// entries in row-major order. `scipy.sparse.load_npz` refuses archives
/// without the marker, so it is part of the wire contract.
pub fn write_sparse_coo(path: &Path, dense: &Array2<f64>) -> Result<(), PipelineError> {
    let mut rows: Vec<i64> = Vec::new();
    let mut cols: Vec<i64> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for ((i, j), &v) in dense.indexed_iter() {
        if v != 0.0 {
            rows.push(i as i64);
            cols.push(j as i64);
            values.push(v);
        }
    }

    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut npz = NpzWriter::new(file);
    npz.add_array("row", &Array1::from(rows))
        .map_err(|e| npz_err(path, e))?;
    npz.add_array("col", &Array1::from(cols))
        .map_err(|e| npz_err(path, e))?;
    npz.add_array("data", &Array1::from(values))
        .map_err(|e| npz_err(path, e))?;
    npz.add_array(
        "shape",
        &array![dense.nrows() as i64, dense.ncols() as i64],
    )
    .map_err(|e| npz_err(path, e))?;
    npz.finish().map_err(|e| npz_err(path, e))?;
    append_format_marker(path)
}

/// Append the `format.npy` member numpy's sparse loaders require. Written as
/// a zero-dimensional `|S3` byte-string record holding `coo`, which is the
/// exact shape `scipy.sparse.save_npz` emits.
fn append_format_marker(path: &Path) -> Result<(), PipelineError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| PipelineError::io(path, e))?;
    let mut zip = ZipWriter::new_append(file).map_err(|e| npz_err(path, e))?;
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("format.npy", options)
        .map_err(|e| npz_err(path, e))?;
    zip.write_all(&npy_byte_scalar(b"coo"))
        .map_err(|e| PipelineError::io(path, e))?;
    zip.finish().map_err(|e| npz_err(path, e))?;
    Ok(())
}

/// Serialize a byte string as a zero-dimensional `.npy` record (format
/// version 1.0, header padded to a 64-byte boundary).
fn npy_byte_scalar(value: &[u8]) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '|S{}', 'fortran_order': False, 'shape': (), }}",
        value.len()
    )
    .into_bytes();
    let pad = (64 - (10 + header.len() + 1) % 64) % 64;
    header.extend(std::iter::repeat(b' ').take(pad));
    header.push(b'\n');

    let mut out = Vec::with_capacity(10 + header.len() + value.len());
    out.extend_from_slice(b"\x93NUMPY\x01\x00");
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(value);
    out
}

fn entry_1d<T: ReadableElement>(
    npz: &mut NpzReader<File>,
    path: &Path,
    name: &str,
) -> Result<Array1<T>, PipelineError> {
    // Archive entries carry the .npy extension per numpy convention.
    let suffixed = format!("{}.npy", name);
    npz.by_name(&suffixed)
        .or_else(|_| npz.by_name(name))
        .map_err(|e| npz_err(path, e))
}

/// Reconstruct the dense matrix from a coordinate-list `.npz` archive.
pub fn read_sparse_coo(path: &Path) -> Result<Array2<f64>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut npz = NpzReader::new(file).map_err(|e| npz_err(path, e))?;
    let rows: Array1<i64> = entry_1d(&mut npz, path, "row")?;
    let cols: Array1<i64> = entry_1d(&mut npz, path, "col")?;
    let values: Array1<f64> = entry_1d(&mut npz, path, "data")?;
    let shape: Array1<i64> = entry_1d(&mut npz, path, "shape")?;
    if shape.len() != 2 || rows.len() != cols.len() || rows.len() != values.len() {
        return Err(npz_err(path, "inconsistent coordinate arrays"));
    }

    let mut dense = Array2::zeros((shape[0] as usize, shape[1] as usize));
    for ((&i, &j), &v) in rows.iter().zip(cols.iter()).zip(values.iter()) {
        dense[[i as usize, j as usize]] = v;
    }
    Ok(dense)
}
