//! Concurrent import of missing tile layers.

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;
use stargaze_core::{Coordinates, LayerKind, TileCell};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{ClaimGuard, CoverageError, CoverageResolver, ImportClaims, MissingTile};
use crate::importer::{ImportError, LayerPipeline};
use crate::store::{
    IndexError, PoolError, SessionPool, complete_if_covered, layers_present, record_layer,
};

/// A `(tile, layer)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TileLayer {
    /// Geohash of the tile.
    pub geohash: String,
    /// Layer within the tile.
    pub layer: LayerKind,
}

/// A layer that was imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerImport {
    /// Geohash of the tile.
    pub geohash: String,
    /// Imported layer.
    pub layer: LayerKind,
    /// Records written by the importer.
    pub records: usize,
}

/// A layer whose import failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerFailure {
    /// Geohash of the tile.
    pub geohash: String,
    /// Layer that failed.
    pub layer: LayerKind,
    /// Error message including its causes.
    pub error: String,
}

/// Outcome of [`CoverageFiller::ensure_coverage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    /// Layers imported by this call.
    pub imported: Vec<LayerImport>,
    /// Layers left to another import, either in flight or committed since
    /// the missing tiles were resolved.
    pub skipped: Vec<TileLayer>,
    /// Layers that failed and remain missing.
    pub failed: Vec<LayerFailure>,
    /// Tiles that became complete during this call.
    pub completed_tiles: Vec<String>,
}

impl CoverageReport {
    /// Report whether any import failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
enum JobError {
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("import cancelled before it started")]
    Cancelled,
    #[error("no importer is configured for the {0} layer")]
    NoPipeline(LayerKind),
}

struct Job<'a> {
    cell: &'a TileCell,
    layer: LayerKind,
    _claim: ClaimGuard<'a>,
}

enum JobOutcome {
    Imported { records: usize, completed: bool },
    AlreadyRecorded,
    Failed(JobError),
}

/// Imports every missing layer of every tile around a point.
///
/// Each `(tile, layer)` import runs in its own transaction: the pipeline's
/// load, the layer record and, when it was the last missing layer, the tile's
/// completion mark commit together or not at all. Imports run on up to
/// `workers` threads, each holding one pooled session at a time.
pub struct CoverageFiller {
    pool: SessionPool,
    resolver: CoverageResolver,
    pipelines: Vec<Box<dyn LayerPipeline>>,
    claims: Arc<ImportClaims>,
    workers: usize,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for CoverageFiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layers: Vec<LayerKind> = self.pipelines.iter().map(|p| p.layer()).collect();
        f.debug_struct("CoverageFiller")
            .field("pool", &self.pool)
            .field("resolver", &self.resolver)
            .field("pipelines", &layers)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl CoverageFiller {
    /// Fill coverage through `pool` with one pipeline per layer.
    ///
    /// Workers default to the pool's `max_sessions`.
    #[must_use]
    pub fn new(
        pool: SessionPool,
        resolver: CoverageResolver,
        pipelines: Vec<Box<dyn LayerPipeline>>,
    ) -> Self {
        let workers = pool.config().max_sessions;
        Self {
            pool,
            resolver,
            pipelines,
            claims: Arc::new(ImportClaims::default()),
            workers,
            cancellation: None,
        }
    }

    /// Share `claims` with other fillers writing to the same store.
    #[must_use]
    pub fn with_claims(mut self, claims: Arc<ImportClaims>) -> Self {
        self.claims = claims;
        self
    }

    /// Run at most `workers` imports at once. Zero is treated as one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Stop starting new imports once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Resolver used to find missing tiles.
    #[must_use]
    pub const fn resolver(&self) -> &CoverageResolver {
        &self.resolver
    }

    /// Pool the filler draws sessions from.
    #[must_use]
    pub const fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Tiles around `origin` lacking any layer, read through a pooled session.
    pub fn missing(
        &self,
        origin: Coordinates,
        radius_m: f64,
    ) -> Result<Vec<MissingTile>, CoverageError> {
        let session = self.pool.acquire()?;
        self.resolver.missing_layers(&session, origin, radius_m)
    }

    /// Import whatever is missing within `radius_m` metres of `origin`.
    ///
    /// Pairs already claimed by another import are skipped. Any failed pair
    /// turns the result into [`CoverageError::Incomplete`], whose report
    /// still lists what succeeded.
    pub fn ensure_coverage(
        &self,
        origin: Coordinates,
        radius_m: f64,
    ) -> Result<CoverageReport, CoverageError> {
        let missing = self.missing(origin, radius_m)?;
        let mut report = CoverageReport::default();

        let mut jobs = Vec::new();
        for tile in &missing {
            for &layer in &tile.missing_layers {
                match self.claims.try_claim(&tile.cell.geohash, layer) {
                    Some(claim) => jobs.push(Job {
                        cell: &tile.cell,
                        layer,
                        _claim: claim,
                    }),
                    None => report.skipped.push(TileLayer {
                        geohash: tile.cell.geohash.clone(),
                        layer,
                    }),
                }
            }
        }
        log::info!(
            "importing {} layer(s) across {} tile(s) with {} worker(s)",
            jobs.len(),
            missing.len(),
            self.workers.min(jobs.len()).max(1)
        );

        let mut completed = BTreeSet::new();
        for (job, outcome) in jobs.iter().zip(self.run_jobs(&jobs)) {
            match outcome {
                JobOutcome::Imported { records, completed: done } => {
                    if done {
                        completed.insert(job.cell.geohash.clone());
                    }
                    report.imported.push(LayerImport {
                        geohash: job.cell.geohash.clone(),
                        layer: job.layer,
                        records,
                    });
                }
                JobOutcome::AlreadyRecorded => {
                    log::debug!(
                        "{} for {} was recorded by another import",
                        job.layer,
                        job.cell.geohash
                    );
                    report.skipped.push(TileLayer {
                        geohash: job.cell.geohash.clone(),
                        layer: job.layer,
                    });
                }
                JobOutcome::Failed(err) => {
                    let error = describe(&err);
                    log::warn!(
                        "{} import for {} failed: {error}",
                        job.layer,
                        job.cell.geohash
                    );
                    report.failed.push(LayerFailure {
                        geohash: job.cell.geohash.clone(),
                        layer: job.layer,
                        error,
                    });
                }
            }
        }
        report.completed_tiles = completed.into_iter().collect();

        if report.has_failures() {
            Err(CoverageError::Incomplete { report })
        } else {
            Ok(report)
        }
    }

    /// Run `jobs` on the worker threads, returning outcomes in job order.
    fn run_jobs(&self, jobs: &[Job<'_>]) -> Vec<JobOutcome> {
        let next = AtomicUsize::new(0);
        let workers = self.workers.min(jobs.len());
        let mut outcomes: Vec<(usize, JobOutcome)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(job) = jobs.get(index) else {
                                break;
                            };
                            done.push((index, self.run_job(job)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Re-read the index for `job`, which another filler may have completed
    /// between resolution and claiming.
    fn is_recorded(&self, job: &Job<'_>) -> Result<bool, JobError> {
        let session = self.pool.acquire()?;
        Ok(layers_present(&session, &job.cell.geohash)?.contains(&job.layer))
    }

    fn run_job(&self, job: &Job<'_>) -> JobOutcome {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return JobOutcome::Failed(JobError::Cancelled);
        }
        let Some(pipeline) = self.pipelines.iter().find(|p| p.layer() == job.layer) else {
            return JobOutcome::Failed(JobError::NoPipeline(job.layer));
        };
        // The claim is held from here on, so a layer absent now stays ours.
        match self.is_recorded(job) {
            Ok(true) => return JobOutcome::AlreadyRecorded,
            Ok(false) => {}
            Err(err) => return JobOutcome::Failed(err),
        }

        let result = self.pool.session_scope(|tx| -> Result<_, JobError> {
            let records = pipeline.run(&job.cell.bbox, tx)?;
            record_layer(tx, &job.cell.geohash, job.layer)?;
            let completed = complete_if_covered(tx, job.cell)?;
            Ok((records, completed))
        });
        match result {
            Ok((records, completed)) => JobOutcome::Imported { records, completed },
            Err(err) => JobOutcome::Failed(err),
        }
    }
}

/// Render `err` followed by each of its causes.
fn describe(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
