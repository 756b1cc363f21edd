//! Fixed-size worker pool for chunk jobs
//!
//! Jobs are self-contained: each owns its buffer and result list, so the
//! pool needs no locking. `run` is a barrier; nothing is returned until every
//! job has finished, been skipped after a stop, or failed.

use super::control::RoundControl;
use crate::core::types::{MemoryError, MemoryResult};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Results of one fan-out, in job order
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// `None` for jobs that failed
    pub results: Vec<Option<R>>,
    pub failed: usize,
}

impl<R> PoolOutcome<R> {
    /// Results of the jobs that completed
    pub fn completed(self) -> impl Iterator<Item = R> {
        self.results.into_iter().flatten()
    }
}

enum JobOutcome<R> {
    Done(R),
    Failed,
    Skipped,
}

/// OS-thread pool shared by every session of a store
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Creates a pool with `threads` workers (0 means one per core)
    pub fn new(threads: usize) -> MemoryResult<Self> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("scan-worker-{}", i))
            .build()
            .map_err(|e| MemoryError::Unknown(format!("failed to start worker pool: {}", e)))?;

        debug!(threads, "Worker pool started");
        Ok(WorkerPool { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `job` over every item and joins.
    ///
    /// Jobs not yet started when `control` stops are skipped and the whole
    /// fan-out reports `Cancelled`/`Timeout`. A panicking job counts as failed
    /// and does not affect the others.
    pub fn run<J, R, F>(
        &self,
        jobs: &[J],
        control: &RoundControl,
        job: F,
    ) -> MemoryResult<PoolOutcome<R>>
    where
        J: Sync,
        R: Send,
        F: Fn(&J) -> R + Sync + Send,
    {
        let outcomes: Vec<JobOutcome<R>> = self.pool.install(|| {
            jobs.par_iter()
                .map(|item| {
                    if control.is_stopped() {
                        return JobOutcome::Skipped;
                    }
                    match panic::catch_unwind(AssertUnwindSafe(|| job(item))) {
                        Ok(result) => JobOutcome::Done(result),
                        Err(_) => JobOutcome::Failed,
                    }
                })
                .collect()
        });

        control.check()?;

        let mut failed = 0;
        let mut skipped = 0;
        let results = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                JobOutcome::Done(result) => Some(result),
                JobOutcome::Failed => {
                    failed += 1;
                    None
                }
                JobOutcome::Skipped => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        if failed > 0 {
            warn!(failed, jobs = jobs.len(), "Scan jobs failed");
        }
        debug_assert_eq!(skipped, 0, "jobs skipped without a stop signal");

        Ok(PoolOutcome { results, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::control::CancelToken;

    #[test]
    fn test_results_keep_job_order() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.threads(), 4);

        let jobs: Vec<u32> = (0..100).collect();
        let outcome = pool.run(&jobs, &RoundControl::unbounded(), |n| n * 2).unwrap();
        assert_eq!(outcome.failed, 0);
        let doubled: Vec<u32> = outcome.completed().collect();
        assert_eq!(doubled, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_is_isolated() {
        let pool = WorkerPool::new(2).unwrap();
        let jobs = vec![1, 2, 3];
        let outcome = pool
            .run(&jobs, &RoundControl::unbounded(), |n| {
                if *n == 2 {
                    panic!("bad chunk");
                }
                *n
            })
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.results, vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_cancelled_fan_out() {
        let pool = WorkerPool::new(2).unwrap();
        let token = CancelToken::new();
        let control = RoundControl::new(token.clone());
        let jobs: Vec<u32> = (0..64).collect();

        let result = pool.run(&jobs, &control, |n| {
            if *n == 0 {
                token.cancel();
            }
            *n
        });
        assert!(matches!(result, Err(MemoryError::Cancelled)));
    }
}
