//! Integration tests for the full post-processing pipeline:
//! prune -> merge -> adjust -> renumber -> pairwise similarity.

use std::path::Path;

use ndarray::Array2;
use tempfile::{tempdir, TempDir};

use ica_ensemble::config::{MergeOptions, RunConfig};
use ica_ensemble::error::PipelineError;
use ica_ensemble::similarity::{read_sparse_coo, SPARSIFY_THRESHOLD};
use ica_ensemble::table::{
    dist_file_name, merged_file_name, raw_file_name, ComponentTable, MatrixKind,
};
use ica_ensemble::worker::run_ensemble;

fn write_table(dir: &Path, name: &str, data: Array2<f64>) {
    let table = ComponentTable::new(
        String::new(),
        (0..data.nrows()).map(|r| format!("g{}", r)).collect(),
        (0..data.ncols()).map(|c| format!("{}", c)).collect(),
        data,
    );
    table.write_csv(&dir.join(name)).unwrap();
}

/// Seed `iterations` raw S/A pairs, every S with `rows` rows and `cols`
/// columns per iteration, returning the run directory.
fn seed_runs(rows: usize, cols: &[usize]) -> (TempDir, std::path::PathBuf) {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = tempdir().unwrap();
    let tmp = out.path().join("tmp");
    std::fs::create_dir(&tmp).unwrap();
    for (iter, &c) in cols.iter().enumerate() {
        write_table(
            &tmp,
            &raw_file_name(iter, MatrixKind::Sources),
            Array2::from_elem((rows, c), (iter + 1) as f64),
        );
        write_table(
            &tmp,
            &raw_file_name(iter, MatrixKind::Mixing),
            Array2::from_elem((rows, c), 0.5),
        );
    }
    (out, tmp)
}

fn config_for(out: &TempDir, n_workers: usize, iterations: usize) -> RunConfig {
    RunConfig::with_options(
        out.path().to_path_buf(),
        n_workers,
        iterations,
        MergeOptions::default(),
    )
    .unwrap()
}

#[test]
fn test_single_worker_end_to_end_merge_and_rescale() {
    // Three raw S files with 10, 12 and 8 components over 30 samples merge
    // into one consolidated file with 30 columns, rescaled by 1/sqrt(30).
    let (out, tmp) = seed_runs(30, &[10, 12, 8]);
    let config = config_for(&out, 1, 3);
    run_ensemble(&config).unwrap();

    let merged =
        ComponentTable::read_csv(&tmp.join(merged_file_name(0, MatrixKind::Sources))).unwrap();
    assert_eq!(merged.num_rows(), 30);
    assert_eq!(merged.num_cols(), 30);

    let factor = (30.0_f64).sqrt();
    // First block came from iteration 0 (raw value 1.0).
    assert!((merged.data[[0, 0]] - 1.0 / factor).abs() < 1e-12);
    // Last block came from iteration 2 (raw value 3.0).
    assert!((merged.data[[0, 29]] - 3.0 / factor).abs() < 1e-12);

    let mixing =
        ComponentTable::read_csv(&tmp.join(merged_file_name(0, MatrixKind::Mixing))).unwrap();
    assert!((mixing.data[[0, 0]] - 0.5 * factor).abs() < 1e-12);

    // The merged raw files are gone.
    for iter in 0..3 {
        assert!(!tmp.join(raw_file_name(iter, MatrixKind::Sources)).exists());
        assert!(!tmp.join(raw_file_name(iter, MatrixKind::Mixing)).exists());
    }
}

#[test]
fn test_multi_worker_run_covers_full_distance_grid() {
    let (out, tmp) = seed_runs(16, &[4, 4, 4, 4]);
    let config = config_for(&out, 2, 4);
    run_ensemble(&config).unwrap();

    // Two consolidated pairs, densely numbered.
    for rank in 0..2 {
        assert!(tmp.join(merged_file_name(rank, MatrixKind::Sources)).exists());
        assert!(tmp.join(merged_file_name(rank, MatrixKind::Mixing)).exists());
    }
    assert!(!tmp.join(merged_file_name(2, MatrixKind::Sources)).exists());

    // dist_{a}_{b}.npz for every ordered pair, with every entry in [0, 1]
    // and nothing alive below the sparsification threshold.
    for a in 0..2 {
        for b in 0..2 {
            let path = tmp.join(dist_file_name(a, b));
            assert!(path.exists(), "missing {}", path.display());
            let dense = read_sparse_coo(&path).unwrap();
            assert_eq!(dense.dim(), (8, 8));
            for &v in dense.iter() {
                assert!((0.0..=1.0).contains(&v));
                assert!(v == 0.0 || v >= SPARSIFY_THRESHOLD);
            }
        }
    }
}

#[test]
fn test_similarity_is_idempotent_across_full_reruns() {
    let (out, tmp) = seed_runs(12, &[3, 3]);
    let config = config_for(&out, 1, 2);
    run_ensemble(&config).unwrap();

    let path = tmp.join(dist_file_name(0, 0));
    let first = std::fs::read(&path).unwrap();

    // Recompute every pair over the unchanged consolidated layout by
    // driving the engine directly through a fresh single-worker group.
    let engine =
        ica_ensemble::similarity::SimilarityEngine::new(tmp.clone(), 1);
    let group = ica_ensemble::sync::WorkerGroup::new(1);
    engine.run(&group, 0).unwrap();

    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_structural_shortage_aborts_every_worker() {
    // Exactly nWorkers - 1 raw pairs: fatal for the whole group.
    let (out, tmp) = seed_runs(8, &[2, 2, 2]);
    let config = config_for(&out, 4, 3);

    match run_ensemble(&config) {
        Err(PipelineError::Shortage {
            kind,
            found,
            required,
        }) => {
            assert_eq!(kind, MatrixKind::Sources);
            assert_eq!(found, 3);
            assert_eq!(required, 4);
        }
        other => panic!("expected Shortage, got {:?}", other.map(|_| ())),
    }

    // No consolidated file of either kind was produced.
    for rank in 0..4 {
        assert!(!tmp.join(merged_file_name(rank, MatrixKind::Sources)).exists());
        assert!(!tmp.join(merged_file_name(rank, MatrixKind::Mixing)).exists());
    }
    // The raw inputs are untouched.
    for iter in 0..3 {
        assert!(tmp.join(raw_file_name(iter, MatrixKind::Sources)).exists());
    }
}

#[test]
fn test_degenerate_pair_is_pruned_before_merging() {
    let (out, tmp) = seed_runs(10, &[3, 3]);
    // A third iteration with an empty S table and a healthy A table.
    std::fs::write(tmp.join(raw_file_name(2, MatrixKind::Sources)), b"").unwrap();
    write_table(
        &tmp,
        &raw_file_name(2, MatrixKind::Mixing),
        Array2::from_elem((10, 3), 9.0),
    );

    let config = config_for(&out, 1, 3);
    run_ensemble(&config).unwrap();

    // The degenerate pair is gone in its entirety; the survivors merged
    // into 3 + 3 = 6 columns.
    let merged =
        ComponentTable::read_csv(&tmp.join(merged_file_name(0, MatrixKind::Sources))).unwrap();
    assert_eq!(merged.num_cols(), 6);
    assert!(!tmp.join(raw_file_name(2, MatrixKind::Mixing)).exists());
}

#[test]
fn test_remainder_files_are_left_unmerged() {
    // Five raw pairs over two workers: the fifth stays behind as raw.
    let (out, tmp) = seed_runs(8, &[2, 2, 2, 2, 2]);
    let config = config_for(&out, 2, 5);
    run_ensemble(&config).unwrap();

    assert!(tmp.join(raw_file_name(4, MatrixKind::Sources)).exists());
    assert!(tmp.join(raw_file_name(4, MatrixKind::Mixing)).exists());
    for iter in 0..4 {
        assert!(!tmp.join(raw_file_name(iter, MatrixKind::Sources)).exists());
    }
    // Each worker merged two files of two columns each.
    for rank in 0..2 {
        let merged =
            ComponentTable::read_csv(&tmp.join(merged_file_name(rank, MatrixKind::Sources)))
                .unwrap();
        assert_eq!(merged.num_cols(), 4);
    }
}
