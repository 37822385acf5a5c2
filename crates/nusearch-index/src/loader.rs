//! Bulk loading into a generation.
//!
//! [`BulkLoader`] drains one lazy package source into a generation with a
//! fixed pool of worker tasks:
//!
//! ```text
//!             ┌──────────────────────┐
//!             │ source (std mutex)   │  each worker claims the next
//!             └──────────┬───────────┘  `batch_size` packages under the lock
//!        ┌───────────┬───┴───────┬───────────┐
//!        ▼           ▼           ▼           ▼
//!    worker 0    worker 1    worker 2    worker 3   bulk_index, retried with
//!        │           │           │           │      a fixed backoff
//!        └───────────┴─────┬─────┴───────────┘
//!                          ▼
//!                  CountdownLatch(4)  ──► refresh ──► count
//! ```
//!
//! The first failure (a batch that exhausted its retries, a non-retryable
//! rejection, or a malformed source record) stops every worker from
//! claiming more work; batches already in flight run to completion and the
//! load returns that first failure.
//!
//! Sources such as [`DumpReader`](crate::source::DumpReader) read files
//! synchronously, so batches are claimed on tokio's blocking pool and the
//! runtime threads stay free while a batch is read.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use backon::{ConstantBuilder, Retryable};
use nusearch_core::{BulkConfig, Error, Result};

use crate::document::Package;
use crate::engine::SearchEngine;
use crate::generation::GenerationName;
use crate::latch::{CountdownLatch, LatchGuard};

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Packages accepted by the engine across all batches.
    pub documents_sent: usize,
    /// Batches indexed.
    pub batches: usize,
    /// Retries performed across all batches.
    pub retries: usize,
    /// Searchable documents reported by the engine after refresh.
    pub document_count: u64,
    /// Wall-clock duration of the load.
    pub elapsed: Duration,
}

/// Loads packages into a generation in parallel batches.
pub struct BulkLoader {
    engine: Arc<dyn SearchEngine>,
    config: BulkConfig,
}

struct Source<I> {
    packages: I,
    next_batch: usize,
}

struct Shared<I> {
    source: Mutex<Source<I>>,
    aborted: AtomicBool,
    failure: Mutex<Option<Error>>,
    documents_sent: AtomicUsize,
    batches: AtomicUsize,
    retries: AtomicUsize,
}

impl<I> Shared<I> {
    fn fail(&self, error: Error) {
        self.aborted.store(true, Ordering::SeqCst);
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl BulkLoader {
    /// Create a loader with the given batching and retry settings.
    pub fn new(engine: Arc<dyn SearchEngine>, config: &BulkConfig) -> Self {
        Self {
            engine,
            config: config.clone(),
        }
    }

    /// Load every package from `source` into `generation`.
    ///
    /// Returns only after every worker has stopped. On success the
    /// generation has been refreshed and its document count read back.
    ///
    /// # Errors
    ///
    /// - `MalformedSource` if the source yields an invalid record
    /// - `Load` if a batch exhausted its retries or was rejected outright
    /// - any error from the final refresh or count
    pub async fn load<S>(&self, generation: &GenerationName, source: S) -> Result<LoadResult>
    where
        S: IntoIterator<Item = Result<Package>>,
        S::IntoIter: Send + 'static,
    {
        let started = Instant::now();
        let parallelism = self.config.parallelism.max(1);

        log::info!(
            "Loading {} (batch size {}, {} workers, {} retries, {:?} backoff)",
            generation,
            self.config.batch_size,
            parallelism,
            self.config.retries,
            self.config.backoff()
        );

        let shared = Arc::new(Shared {
            source: Mutex::new(Source {
                packages: source.into_iter(),
                next_batch: 0,
            }),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            documents_sent: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
        });
        let latch = Arc::new(CountdownLatch::new(parallelism));

        let mut workers = Vec::with_capacity(parallelism);
        for worker in 0..parallelism {
            let guard = LatchGuard::new(Arc::clone(&latch));
            let shared = Arc::clone(&shared);
            let engine = Arc::clone(&self.engine);
            let config = self.config.clone();
            let index = generation.to_string();
            workers.push(tokio::spawn(async move {
                let _guard = guard;
                run_worker(worker, &engine, &index, &config, &shared).await;
            }));
        }

        latch.wait().await;

        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                shared.fail(Error::engine(None, format!("bulk worker stopped: {e}")));
            }
        }

        if let Some(error) = shared.take_failure() {
            log::error!("Load of {generation} aborted: {error}");
            return Err(error);
        }

        self.engine.refresh(generation.as_str()).await?;
        let document_count = self.engine.count(generation.as_str()).await?;

        let result = LoadResult {
            documents_sent: shared.documents_sent.load(Ordering::SeqCst),
            batches: shared.batches.load(Ordering::SeqCst),
            retries: shared.retries.load(Ordering::SeqCst),
            document_count,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Loaded {} documents into {} in {} batches ({} retries, {:.1?})",
            result.document_count,
            generation,
            result.batches,
            result.retries,
            result.elapsed
        );
        Ok(result)
    }
}

/// Claim and submit batches until the source is drained or the load aborts.
async fn run_worker<I>(
    worker: usize,
    engine: &Arc<dyn SearchEngine>,
    index: &str,
    config: &BulkConfig,
    shared: &Arc<Shared<I>>,
) where
    I: Iterator<Item = Result<Package>> + Send + 'static,
{
    loop {
        let Some((sequence, batch)) = claim(shared, config.batch_size.max(1)).await else {
            break;
        };

        log::debug!(
            "Worker {worker} submitting batch {sequence} ({} packages)",
            batch.len()
        );
        match submit(engine, index, config, &batch, shared).await {
            Ok(indexed) => {
                shared.documents_sent.fetch_add(indexed, Ordering::SeqCst);
                shared.batches.fetch_add(1, Ordering::SeqCst);
            }
            Err((attempts, error)) => {
                log::error!("Batch {sequence} failed after {attempts} attempt(s): {error}");
                shared.fail(Error::Load {
                    batch: sequence,
                    attempts,
                    source: Box::new(error),
                });
                break;
            }
        }
    }
}

/// Take the next batch from the shared source on the blocking pool.
async fn claim<I>(shared: &Arc<Shared<I>>, batch_size: usize) -> Option<(usize, Vec<Package>)>
where
    I: Iterator<Item = Result<Package>> + Send + 'static,
{
    let reader = Arc::clone(shared);
    match tokio::task::spawn_blocking(move || read_batch(&reader, batch_size)).await {
        Ok(claimed) => claimed,
        Err(e) => {
            shared.fail(Error::engine(None, format!("source reader stopped: {e}")));
            None
        }
    }
}

/// Read up to `batch_size` packages from the source.
///
/// Returns `None` when the source is exhausted, the load was aborted, or the
/// source yielded an invalid record (which aborts the load).
fn read_batch<I>(shared: &Shared<I>, batch_size: usize) -> Option<(usize, Vec<Package>)>
where
    I: Iterator<Item = Result<Package>>,
{
    let mut source = shared.source.lock().unwrap_or_else(PoisonError::into_inner);
    if shared.is_aborted() {
        return None;
    }

    let mut batch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        match source.packages.next() {
            Some(Ok(package)) => {
                if let Err(e) = package.validate() {
                    shared.fail(e);
                    return None;
                }
                batch.push(package);
            }
            Some(Err(e)) => {
                shared.fail(e);
                return None;
            }
            None => break,
        }
    }

    if batch.is_empty() {
        return None;
    }
    let sequence = source.next_batch;
    source.next_batch += 1;
    Some((sequence, batch))
}

/// Submit one batch, retrying retryable failures with a fixed delay.
async fn submit<I>(
    engine: &Arc<dyn SearchEngine>,
    index: &str,
    config: &BulkConfig,
    batch: &[Package],
    shared: &Shared<I>,
) -> std::result::Result<usize, (usize, Error)> {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let engine = engine.as_ref();

    let result = (move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        engine.bulk_index(index, batch).await
    })
    .retry(
        ConstantBuilder::default()
            .with_delay(config.backoff())
            .with_max_times(config.retries),
    )
    .sleep(tokio::time::sleep)
    .when(|e: &Error| e.is_retryable())
    .notify(|e: &Error, delay: Duration| {
        shared.retries.fetch_add(1, Ordering::SeqCst);
        log::warn!("Bulk request to {index} failed, retrying in {delay:?}: {e}");
    })
    .await;

    result
        .map(|summary| summary.indexed)
        .map_err(|e| (attempts.load(Ordering::SeqCst), e))
}

// ============================================================================
// Tests
// ============================================================================
