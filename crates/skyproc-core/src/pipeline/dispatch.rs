use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{debug, warn};

use crate::error::{Result, SkyprocError};
use crate::io::naming::{CcdProducts, SciProducts};
use crate::pipeline::ccdproc::CcdCorrector;
use crate::pipeline::sciproc::{SciTask, ScienceProcessor};
use crate::pipeline::types::{
    ExposureFailure, ExposureId, ExposureResult, RunReporter, Stage, StageOutput,
};

/// Cooperative cancellation flag, checked by workers between exposures.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Worker count actually used: `requested` (0 means all cores), capped by
/// the available parallelism and the number of tasks, and at least 1.
pub fn effective_workers(requested: usize, tasks: usize) -> usize {
    let available = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let requested = if requested == 0 { available } else { requested };
    requested.min(available).min(tasks).max(1)
}

/// Run `work` over every task, sequentially for one worker or on a pool of
/// workers draining a shared queue.
///
/// Every task yields exactly one result, in input order. Errors and panics
/// inside `work` become [`ExposureFailure`]s for that exposure only.
pub fn dispatch<T, P, F>(
    stage: Stage,
    tasks: Vec<(ExposureId, T)>,
    workers: usize,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
    work: F,
) -> Vec<ExposureResult<StageOutput<P>>>
where
    T: Send,
    P: Send,
    F: Fn(T) -> Result<StageOutput<P>> + Sync,
{
    let total = tasks.len();
    let workers = effective_workers(workers, total);
    reporter.begin_batch(stage, total);
    debug!(%stage, total, workers, "Dispatching");

    let results = if workers == 1 {
        tasks
            .into_iter()
            .map(|(exposure, task)| run_task(exposure, task, cancel, reporter, &work))
            .collect()
    } else {
        run_pool(tasks, workers, cancel, reporter, &work)
    };

    reporter.finish_batch(stage);
    results
}

fn run_pool<T, P, F>(
    tasks: Vec<(ExposureId, T)>,
    workers: usize,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
    work: &F,
) -> Vec<ExposureResult<StageOutput<P>>>
where
    T: Send,
    P: Send,
    F: Fn(T) -> Result<StageOutput<P>> + Sync,
{
    let ids: Vec<ExposureId> = tasks.iter().map(|(id, _)| id.clone()).collect();

    let (task_tx, task_rx) = unbounded();
    for (index, (exposure, task)) in tasks.into_iter().enumerate() {
        // The receiver is alive, so sending cannot fail.
        let _ = task_tx.send((index, exposure, task));
    }
    drop(task_tx);

    let (result_tx, result_rx) = unbounded();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("skyproc-worker-{worker_id}"))
                .spawn_scoped(scope, move || {
                    debug!(worker_id, "Worker started");
                    while let Ok((index, exposure, task)) = task_rx.recv() {
                        let result = run_task(exposure, task, cancel, reporter, work);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                    debug!(worker_id, "Worker shutting down");
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(worker_id, error = %e, "Failed to spawn worker"),
            }
        }

        if handles.is_empty() {
            warn!("No worker threads available, running on the calling thread");
            while let Ok((index, exposure, task)) = task_rx.recv() {
                let result = run_task(exposure, task, cancel, reporter, work);
                let _ = result_tx.send((index, result));
            }
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.join() {
                warn!(worker_id, "Worker panicked: {}", panic_message(e.as_ref()));
            }
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<ExposureResult<StageOutput<P>>>> =
        std::iter::repeat_with(|| None).take(ids.len()).collect();
    for (index, result) in result_rx.try_iter() {
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .zip(ids)
        .map(|(slot, exposure)| {
            slot.unwrap_or_else(|| {
                let cause = "worker exited before processing this exposure";
                reporter.exposure_failed(&exposure, cause);
                Err(ExposureFailure {
                    exposure,
                    cause: cause.to_string(),
                })
            })
        })
        .collect()
}

fn run_task<T, P, F>(
    exposure: ExposureId,
    task: T,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
    work: &F,
) -> ExposureResult<StageOutput<P>>
where
    F: Fn(T) -> Result<StageOutput<P>>,
{
    if cancel.is_cancelled() {
        let cause = SkyprocError::Cancelled.to_string();
        reporter.exposure_failed(&exposure, &cause);
        return Err(ExposureFailure { exposure, cause });
    }

    reporter.exposure_started(&exposure);
    let cause = match catch_unwind(AssertUnwindSafe(|| work(task))) {
        Ok(Ok(output)) => {
            reporter.exposure_finished(&exposure, output.outcome);
            return Ok(output);
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => SkyprocError::WorkerPanic(panic_message(payload.as_ref())).to_string(),
    };

    reporter.exposure_failed(&exposure, &cause);
    Err(ExposureFailure { exposure, cause })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// CCD-correct a batch of raw frames from one detector.
pub fn run_ccd_batch(
    corrector: &CcdCorrector,
    raws: &[PathBuf],
    workers: usize,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
) -> Vec<ExposureResult<StageOutput<CcdProducts>>> {
    let missing = corrector.masters.missing();
    if !missing.is_empty() {
        warn!(
            det = corrector.det,
            missing = ?missing,
            "Master calibrations not supplied, no correction applied for them"
        );
    }

    let tasks = raws
        .iter()
        .map(|raw| (ExposureId::new(raw, corrector.det), raw.clone()))
        .collect();
    dispatch(
        Stage::CcdCorrection,
        tasks,
        workers,
        cancel,
        reporter,
        |raw: PathBuf| corrector.process_one(&raw),
    )
}

/// Science-process a batch of corrected frames.
///
/// `airmass`, when given, must hold one value per task and overrides any
/// airmass already set on the tasks.
pub fn run_sci_batch(
    processor: &ScienceProcessor,
    mut tasks: Vec<SciTask>,
    airmass: Option<&[f32]>,
    workers: usize,
    cancel: &CancelToken,
    reporter: &dyn RunReporter,
) -> Result<Vec<ExposureResult<StageOutput<SciProducts>>>> {
    if let Some(airmass) = airmass {
        if airmass.len() != tasks.len() {
            return Err(SkyprocError::Configuration(format!(
                "{} airmass values given for {} exposures",
                airmass.len(),
                tasks.len()
            )));
        }
        for (task, &a) in tasks.iter_mut().zip(airmass) {
            task.airmass = Some(a);
        }
    }

    let tasks = tasks
        .into_iter()
        .map(|task| (task.exposure(), task))
        .collect();
    Ok(dispatch(
        Stage::ScienceProcessing,
        tasks,
        workers,
        cancel,
        reporter,
        |task: SciTask| processor.process_one(&task),
    ))
}
