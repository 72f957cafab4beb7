//! Fan-out of region runs over a bounded worker pool.
//!
//! Each [`WorkItem`] owns its parcels and configuration, so workers share
//! nothing. Finished units travel back over a channel and are handed to the
//! caller's callback as they arrive; a failed or panicking unit is logged and
//! the batch carries on.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{error, info};

use crate::config::SuperParcelConfig;
use crate::error::{Result, SuperParcelError};
use crate::parcel::Parcel;
use crate::pipeline::{build_superparcels, SuperParcelOutput};

/// One independent unit: a region, optionally pinned to a single threshold.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub region_code: String,
    pub threshold: Option<f64>,
    pub parcels: Vec<Parcel>,
    pub config: SuperParcelConfig,
}

impl WorkItem {
    /// Runs the unit. A panic inside the pipeline is caught and reported as
    /// [`SuperParcelError::WorkerPanic`] instead of unwinding into the pool.
    pub fn run(self) -> WorkResult {
        let outcome = run_isolated(|| build_superparcels(&self.parcels, &self.region_code, &self.config));
        WorkResult {
            region_code: self.region_code,
            threshold: self.threshold,
            outcome,
        }
    }
}

fn run_isolated<F>(f: F) -> Result<Option<SuperParcelOutput>>
where
    F: FnOnce() -> Result<Option<SuperParcelOutput>>,
{
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(SuperParcelError::WorkerPanic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Debug)]
pub struct WorkResult {
    pub region_code: String,
    pub threshold: Option<f64>,
    pub outcome: Result<Option<SuperParcelOutput>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub produced: usize,
    pub empty: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, result: &WorkResult) {
        match &result.outcome {
            Ok(Some(_)) => self.produced += 1,
            Ok(None) => self.empty += 1,
            Err(e) => {
                self.failed += 1;
                error!(
                    "Work unit {} (threshold {:?}) failed: {}",
                    result.region_code, result.threshold, e
                );
            }
        }
    }
}

/// Splits parcels into work units by region code.
///
/// With fixed thresholds and no area ratio gate each threshold is its own
/// unit; otherwise the whole threshold ladder runs inside one unit per region.
pub fn plan_work_items(parcels: &[Parcel], config: &SuperParcelConfig) -> Vec<WorkItem> {
    let mut by_region: BTreeMap<&str, Vec<Parcel>> = BTreeMap::new();
    for parcel in parcels {
        by_region.entry(parcel.region_code()).or_default().push(parcel.clone());
    }

    let per_threshold = match config.sorted_thresholds() {
        Some(thresholds) if config.area_ratio_gate.is_none() => Some(thresholds),
        _ => None,
    };

    let mut items = Vec::new();
    for (region, region_parcels) in by_region {
        match &per_threshold {
            Some(thresholds) => {
                for &t in thresholds {
                    items.push(WorkItem {
                        region_code: region.to_string(),
                        threshold: Some(t),
                        parcels: region_parcels.clone(),
                        config: config.clone().with_fixed_threshold(t),
                    });
                }
            }
            None => items.push(WorkItem {
                region_code: region.to_string(),
                threshold: None,
                parcels: region_parcels,
                config: config.clone(),
            }),
        }
    }
    items
}

/// Runs every item on at most `max_workers` threads and calls `on_complete`
/// on the calling thread for each result, in completion order.
pub fn run_batch<F>(items: Vec<WorkItem>, max_workers: usize, mut on_complete: F) -> BatchSummary
where
    F: FnMut(WorkResult),
{
    let total = items.len();
    let mut summary = BatchSummary::default();
    if total == 0 {
        return summary;
    }
    let workers = max_workers.clamp(1, total);
    info!("Running {} work units on {} workers", total, workers);

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => {
                let (tx, rx) = crossbeam_channel::unbounded::<WorkResult>();
                for item in items {
                    let tx = tx.clone();
                    pool.spawn(move || {
                        // The receiver outlives every worker.
                        let _ = tx.send(item.run());
                    });
                }
                drop(tx);

                for result in rx {
                    summary.record(&result);
                    on_complete(result);
                }
                info!(
                    "Batch finished: {} produced, {} empty, {} failed",
                    summary.produced, summary.empty, summary.failed
                );
                return summary;
            }
            Err(e) => {
                error!("Could not start worker pool, running sequentially: {}", e);
            }
        }
    }

    for item in items {
        let result = item.run();
        summary.record(&result);
        on_complete(result);
    }
    info!(
        "Batch finished: {} produced, {} empty, {} failed",
        summary.produced, summary.empty, summary.failed
    );
    summary
}
