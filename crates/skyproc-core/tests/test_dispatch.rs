#[allow(dead_code)]
mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use skyproc_core::camera::GenericCamera;
use skyproc_core::detection::Detectors;
use skyproc_core::error::SkyprocError;
use skyproc_core::io::naming::CcdProducts;
use skyproc_core::io::FitsStore;
use skyproc_core::pipeline::ccdproc::{CcdCorrector, MasterFrames};
use skyproc_core::pipeline::config::{CcdProcConfig, PipelineConfig, SciProcConfig};
use skyproc_core::pipeline::dispatch::{
    dispatch, effective_workers, run_ccd_batch, run_sci_batch, CancelToken,
};
use skyproc_core::pipeline::orchestrator::run_pipeline;
use skyproc_core::pipeline::sciproc::{SciTask, ScienceProcessor};
use skyproc_core::pipeline::types::{
    ExposureId, NoOpReporter, Outcome, Provenance, RunReporter, Stage, StageOutput,
};
use tempfile::TempDir;

fn ids(n: usize) -> Vec<(ExposureId, usize)> {
    (0..n)
        .map(|i| (ExposureId::new(format!("exp{i}.fits"), 1), i))
        .collect()
}

fn echo(id: &str, i: usize) -> StageOutput<usize> {
    StageOutput {
        exposure: ExposureId::new(id, 1),
        products: i,
        outcome: Outcome::Persisted,
    }
}

fn corrector(science_dir: PathBuf, provenance: Provenance) -> CcdCorrector {
    let camera = GenericCamera::new(common::camera_config(60000.0)).unwrap();
    CcdCorrector {
        camera: Arc::new(camera),
        det: 1,
        masters: Arc::new(MasterFrames::default()),
        config: CcdProcConfig::default(),
        detectors: Detectors::default(),
        store: Arc::new(FitsStore),
        science_dir: Some(science_dir),
        provenance,
    }
}

fn write_raws(dir: &TempDir, n: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| {
            let mut data = common::noisy_field(24, 24, 150.0, 4.0, 100 + i as u64);
            data[[i, i]] = 0.0;
            common::write_raw(dir.path(), &format!("raw{i}.fits"), &data)
        })
        .collect()
}

#[test]
fn test_effective_workers_clamped() {
    assert_eq!(effective_workers(4, 0), 1);
    assert_eq!(effective_workers(4, 1), 1);
    assert_eq!(effective_workers(1, 10), 1);
    let n = effective_workers(64, 3);
    assert!((1..=3).contains(&n));
    assert!(effective_workers(0, 100) >= 1);
}

#[test]
fn test_dispatch_returns_one_result_per_task_in_order() {
    for workers in [1, 4] {
        let results = dispatch(
            Stage::CcdCorrection,
            ids(12),
            workers,
            &CancelToken::new(),
            &NoOpReporter,
            |i: usize| Ok(echo(&format!("exp{i}.fits"), i * 10)),
        );
        assert_eq!(results.len(), 12);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().products, i * 10);
        }
    }
}

#[test]
fn test_dispatch_captures_errors_and_panics() {
    for workers in [1, 3] {
        let results = dispatch(
            Stage::ScienceProcessing,
            ids(6),
            workers,
            &CancelToken::new(),
            &NoOpReporter,
            |i: usize| {
                if i == 2 {
                    return Err(SkyprocError::Shape("bad geometry".into()));
                }
                if i == 4 {
                    panic!("exploded on {i}");
                }
                Ok(echo(&format!("exp{i}.fits"), i))
            },
        );

        assert_eq!(results.len(), 6);
        let failure = results[2].as_ref().unwrap_err();
        assert_eq!(failure.exposure, ExposureId::new("exp2.fits", 1));
        assert!(failure.cause.contains("bad geometry"));
        let failure = results[4].as_ref().unwrap_err();
        assert_eq!(failure.exposure, ExposureId::new("exp4.fits", 1));
        assert!(failure.cause.contains("exploded on 4"));
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    }
}

#[test]
fn test_cancelled_batch_reports_every_exposure() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let calls = AtomicUsize::new(0);

    let results = dispatch(
        Stage::CcdCorrection,
        ids(5),
        2,
        &cancel,
        &NoOpReporter,
        |i: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(echo("x", i))
        },
    );

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(results
        .iter()
        .all(|r| r.as_ref().unwrap_err().cause == "cancelled"));
}

#[derive(Default)]
struct CountingReporter {
    started: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl RunReporter for CountingReporter {
    fn exposure_started(&self, _exposure: &ExposureId) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn exposure_finished(&self, _exposure: &ExposureId, _outcome: Outcome) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn exposure_failed(&self, _exposure: &ExposureId, _cause: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_reporter_sees_every_exposure() {
    let reporter = CountingReporter::default();
    dispatch(
        Stage::CcdCorrection,
        ids(8),
        4,
        &CancelToken::new(),
        &reporter,
        |i: usize| {
            if i % 3 == 0 {
                Err(SkyprocError::Configuration("no".into()))
            } else {
                Ok(echo("x", i))
            }
        },
    );
    assert_eq!(reporter.started.load(Ordering::SeqCst), 8);
    assert_eq!(reporter.finished.load(Ordering::SeqCst), 5);
    assert_eq!(reporter.failed.load(Ordering::SeqCst), 3);
}

#[test]
fn test_sequential_and_parallel_outputs_identical() {
    let raw_dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 5);
    let provenance = Provenance::now();

    let seq = corrector(out.path().join("seq"), provenance.clone());
    let par = corrector(out.path().join("par"), provenance);
    let cancel = CancelToken::new();
    let seq_results = run_ccd_batch(&seq, &raws, 1, &cancel, &NoOpReporter);
    let par_results = run_ccd_batch(&par, &raws, 4, &cancel, &NoOpReporter);

    for (a, b) in seq_results.iter().zip(&par_results) {
        let a: &CcdProducts = &a.as_ref().unwrap().products;
        let b: &CcdProducts = &b.as_ref().unwrap().products;
        for (pa, pb) in a.all().iter().zip(b.all()) {
            assert_eq!(pa.file_name(), pb.file_name());
            assert_eq!(std::fs::read(pa).unwrap(), std::fs::read(pb).unwrap());
        }
    }
}

#[test]
fn test_rerun_skips_existing_outputs() {
    let raw_dir = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 2);
    let stage = corrector(raw_dir.path().join("out"), Provenance::now());
    let cancel = CancelToken::new();

    let first = run_ccd_batch(&stage, &raws, 2, &cancel, &NoOpReporter);
    let snapshot: Vec<Vec<u8>> = first
        .iter()
        .flat_map(|r| r.as_ref().unwrap().products.all().map(|p| std::fs::read(p).unwrap()))
        .collect();

    let second = run_ccd_batch(&stage, &raws, 2, &cancel, &NoOpReporter);
    for result in &second {
        assert_eq!(result.as_ref().unwrap().outcome, Outcome::SkippedExisting);
    }
    let again: Vec<Vec<u8>> = second
        .iter()
        .flat_map(|r| r.as_ref().unwrap().products.all().map(|p| std::fs::read(p).unwrap()))
        .collect();
    assert_eq!(snapshot, again);
}

#[test]
fn test_missing_raw_is_a_per_exposure_failure() {
    let raw_dir = TempDir::new().unwrap();
    let mut raws = write_raws(&raw_dir, 2);
    raws.insert(1, raw_dir.path().join("missing.fits"));
    let stage = corrector(raw_dir.path().join("out"), Provenance::now());

    let results = run_ccd_batch(&stage, &raws, 3, &CancelToken::new(), &NoOpReporter);
    assert!(results[0].is_ok());
    assert!(results[2].is_ok());
    let failure = results[1].as_ref().unwrap_err();
    assert_eq!(failure.exposure.path, raw_dir.path().join("missing.fits"));
}

#[test]
fn test_airmass_count_must_match() {
    let processor = ScienceProcessor {
        config: SciProcConfig::default(),
        supersky: None,
        detectors: Detectors::default(),
        store: Arc::new(FitsStore),
        provenance: Provenance::now(),
    };
    let tasks = vec![
        SciTask {
            image: "a_det01_proc.fits".into(),
            mask: "a_det01_ccdmask.fits".into(),
            det: 1,
            airmass: None,
        };
        3
    ];

    let err = run_sci_batch(
        &processor,
        tasks,
        Some(&[1.1, 1.2]),
        2,
        &CancelToken::new(),
        &NoOpReporter,
    )
    .unwrap_err();
    assert!(matches!(err, SkyprocError::Configuration(_)));
}

#[test]
fn test_full_run_writes_all_products() {
    let raw_dir = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 3);
    let mut config = PipelineConfig::default();
    config.run.science_dir = Some(raw_dir.path().join("science"));
    config.run.workers = 2;
    config.airmass = Some(vec![1.0, 1.2, 1.4]);
    let camera = Arc::new(GenericCamera::new(common::camera_config(60000.0)).unwrap());

    let report = run_pipeline(
        &config,
        camera.clone(),
        &raws,
        Arc::new(FitsStore),
        Detectors::default(),
        &CancelToken::new(),
        &NoOpReporter,
    )
    .unwrap();

    assert_eq!(report.failures(), 0);
    assert_eq!(report.ccd.len(), 3);
    assert_eq!(report.sci.len(), 3);
    for result in &report.sci {
        let products = &result.as_ref().unwrap().products;
        for path in products.all() {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(products.image.to_string_lossy().ends_with("_det01_sci.fits"));
    }
    assert_eq!(report.sci_tally().persisted, 3);

    // Second run finds everything in place.
    let report = run_pipeline(
        &config,
        camera,
        &raws,
        Arc::new(FitsStore),
        Detectors::default(),
        &CancelToken::new(),
        &NoOpReporter,
    )
    .unwrap();
    assert_eq!(report.ccd_tally().skipped, 3);
    assert_eq!(report.sci_tally().skipped, 3);
}

#[test]
fn test_full_run_rejects_airmass_mismatch() {
    let raw_dir = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 2);
    let config = PipelineConfig {
        airmass: Some(vec![1.0]),
        ..PipelineConfig::default()
    };
    let camera = Arc::new(GenericCamera::new(common::camera_config(60000.0)).unwrap());

    let err = run_pipeline(
        &config,
        camera,
        &raws,
        Arc::new(FitsStore),
        Detectors::default(),
        &CancelToken::new(),
        &NoOpReporter,
    )
    .unwrap_err();
    assert!(matches!(err, SkyprocError::Configuration(_)));
}

#[test]
fn test_cancelled_run_loads_no_calibrations() {
    let raw_dir = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 2);
    let mut config = PipelineConfig::default();
    config.calibrations.bias = Some(raw_dir.path().join("no_such_bias.fits"));
    config.run.science_dir = Some(raw_dir.path().join("science"));
    let camera = Arc::new(GenericCamera::new(common::camera_config(60000.0)).unwrap());
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = run_pipeline(
        &config,
        camera,
        &raws,
        Arc::new(FitsStore),
        Detectors::default(),
        &cancel,
        &NoOpReporter,
    )
    .unwrap();

    assert_eq!(report.ccd.len(), 2);
    assert!(report.sci.is_empty());
    for (result, raw) in report.ccd.iter().zip(&raws) {
        let failure = result.as_ref().unwrap_err();
        assert_eq!(&failure.exposure.path, raw);
        assert_eq!(failure.cause, "cancelled");
    }
    assert!(!raw_dir.path().join("science").exists());
}

#[test]
fn test_science_outputs_identical_across_worker_counts() {
    let raw_dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let raws = write_raws(&raw_dir, 4);
    let provenance = Provenance::now();
    let cancel = CancelToken::new();

    let science = |name: &str, workers: usize| {
        let stage = corrector(out.path().join(name), provenance.clone());
        let tasks: Vec<SciTask> = run_ccd_batch(&stage, &raws, 1, &cancel, &NoOpReporter)
            .into_iter()
            .map(|r| {
                let products = r.unwrap().products;
                SciTask {
                    image: products.image,
                    mask: products.mask,
                    det: 1,
                    airmass: None,
                }
            })
            .collect();
        let processor = ScienceProcessor {
            config: SciProcConfig::default(),
            supersky: None,
            detectors: Detectors::default(),
            store: Arc::new(FitsStore),
            provenance: provenance.clone(),
        };
        let airmass = [1.0, 1.1, 1.2, 1.3];
        run_sci_batch(&processor, tasks, Some(&airmass), workers, &cancel, &NoOpReporter)
            .unwrap()
    };

    let seq = science("seq", 1);
    let par = science("par", 4);
    assert_eq!(seq.len(), 4);
    for (a, b) in seq.iter().zip(&par) {
        let a = &a.as_ref().unwrap().products;
        let b = &b.as_ref().unwrap().products;
        for (pa, pb) in a.all().iter().zip(b.all()) {
            assert_eq!(pa.file_name(), pb.file_name());
            assert_eq!(std::fs::read(pa).unwrap(), std::fs::read(pb).unwrap());
        }
    }
}
