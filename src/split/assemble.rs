//! Parallel region assembly.
//!
//! Fans one stitch task per region out onto the tokio runtime and joins them
//! all. A semaphore bounds how many regions are in flight at once, which also
//! bounds how many region canvases are alive.
//!
//! ```text
//!   regions ──┬─▶ [permit] stitch(1,1) ──┐
//!             ├─▶ [permit] stitch(2,1) ──┤
//!             ├─▶ [permit] stitch(1,2) ──┼──▶ Assembly { images, failures }
//!             └─▶ [permit] stitch(2,2) ──┘
//! ```
//!
//! Regions never see each other: a failed, timed-out or panicking region is
//! recorded in [`Assembly::failures`] and its siblings carry on.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::{RegionError, SplitError};

use super::region::TileRegion;
use super::stitch::StitchedImage;

/// Number of regions stitched at once when nothing else is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// =============================================================================
// Assembly Result
// =============================================================================

/// A region that did not produce an image.
#[derive(Debug, Clone)]
pub struct RegionFailure {
    /// The region that failed
    pub region: TileRegion,

    /// Why it failed
    pub error: RegionError,
}

impl fmt::Display for RegionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "region ({}, {}) {}: {}",
            self.region.column, self.region.row, self.region.tiles, self.error
        )
    }
}

/// Outcome of one assembly run.
#[derive(Debug, Default)]
pub struct Assembly {
    /// Stitched images keyed by identifier
    pub images: HashMap<String, StitchedImage>,

    /// Regions that failed, ordered by row then column
    pub failures: Vec<RegionFailure>,
}

impl Assembly {
    /// Whether every region succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.images.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, identifier: &str) -> Option<&StitchedImage> {
        self.images.get(identifier)
    }

    /// Identifiers of the stitched images, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.images.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

// =============================================================================
// ParallelAssembler
// =============================================================================

/// Runs region stitches concurrently and collects their results.
#[derive(Debug, Clone)]
pub struct ParallelAssembler {
    max_concurrency: usize,
    region_timeout: Option<Duration>,
}

impl Default for ParallelAssembler {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl ParallelAssembler {
    /// Create an assembler running at most `max_concurrency` regions at once.
    ///
    /// A bound of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            region_timeout: None,
        }
    }

    /// Give up on any region that takes longer than `timeout`.
    pub fn with_region_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.region_timeout = timeout;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn region_timeout(&self) -> Option<Duration> {
        self.region_timeout
    }

    /// Stitch every region with `stitch` and wait for all of them.
    ///
    /// Returns once each region has either produced an image or failed.
    ///
    /// # Errors
    ///
    /// Only [`SplitError::NoRegions`]; region failures are reported in the
    /// returned [`Assembly`].
    pub async fn assemble<F, Fut>(
        &self,
        regions: &[TileRegion],
        stitch: F,
    ) -> Result<Assembly, SplitError>
    where
        F: Fn(TileRegion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StitchedImage, RegionError>> + Send + 'static,
    {
        if regions.is_empty() {
            return Err(SplitError::NoRegions);
        }

        let started = Instant::now();
        let limit = Arc::new(Semaphore::new(self.max_concurrency));
        let stitch = Arc::new(stitch);

        let mut tasks = JoinSet::new();

        for &region in regions {
            let limit = Arc::clone(&limit);
            let stitch = Arc::clone(&stitch);
            let timeout = self.region_timeout;

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = limit.acquire_owned().await.ok();
                let handle = tokio::spawn(async move { stitch(region).await });
                (region, run_region(handle, timeout).await)
            });
        }

        let mut assembly = Assembly {
            images: HashMap::with_capacity(regions.len()),
            failures: Vec::new(),
        };

        while let Some(joined) = tasks.join_next().await {
            let (region, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // Only reachable if the runtime is shutting down
                    warn!(error = %e, "Region task did not finish");
                    continue;
                }
            };

            match result {
                Ok(image) => {
                    debug!(
                        column = region.column,
                        row = region.row,
                        identifier = image.identifier(),
                        "Region stitched"
                    );
                    assembly
                        .images
                        .insert(image.identifier().to_string(), image);
                }
                Err(error) => {
                    warn!(
                        column = region.column,
                        row = region.row,
                        tiles = %region.tiles,
                        error = %error,
                        "Region failed"
                    );
                    assembly.failures.push(RegionFailure { region, error });
                }
            }
        }

        assembly
            .failures
            .sort_by_key(|f| (f.region.row, f.region.column));

        info!(
            regions = regions.len(),
            succeeded = assembly.succeeded(),
            failed = assembly.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assembly finished"
        );

        Ok(assembly)
    }
}

/// Await a region's stitch task, aborting it once `timeout` elapses.
///
/// A panic inside the task is reported as [`RegionError::Panicked`].
async fn run_region(
    mut handle: JoinHandle<Result<StitchedImage, RegionError>>,
    timeout: Option<Duration>,
) -> Result<StitchedImage, RegionError> {
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(RegionError::TimedOut {
                    millis: limit.as_millis() as u64,
                });
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| {
        Err(RegionError::Panicked {
            message: panic_message(e),
        })
    })
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
