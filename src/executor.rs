//! Parallel fan-out of ranking units over the session's worker pool.
//!
//! Units only read the graph, the match table and the cache; they return an
//! optional proposal which is collected per unit index so callers see results
//! in unit order regardless of scheduling. Cancellation is cooperative and is
//! polled before each unit starts.

use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::MatchError;

pub type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Cancellation flag and progress sink shared with a batch.
#[derive(Clone, Default)]
pub struct BatchControl {
    cancel: Arc<AtomicBool>,
    progress: Option<Arc<ProgressFn>>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(progress: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            progress: Some(Arc::new(progress)),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn report(&self, fraction: f64) {
        if let Some(progress) = self.progress.as_ref() {
            progress(fraction);
        }
    }
}

impl std::fmt::Debug for BatchControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchControl")
            .field("cancelled", &self.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Runs `unit` for every item on `pool`, keeping the `Some` results keyed by item index.
///
/// A panic inside a unit propagates to the caller and no results are returned.
pub fn run_batch<T, R, F>(
    pool: &ThreadPool,
    items: &[T],
    control: &BatchControl,
    unit: F,
) -> Result<BTreeMap<usize, R>, MatchError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Option<R> + Sync,
{
    let results = Mutex::new(BTreeMap::new());
    let done = AtomicUsize::new(0);
    let total = items.len();
    // report roughly every 0.5%
    let step = (total / 200).max(1);

    let outcome = pool.install(|| {
        items.par_iter().enumerate().try_for_each(|(index, item)| {
            if control.is_cancelled() {
                return Err(MatchError::Cancelled);
            }
            if let Some(result) = unit(item) {
                results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(index, result);
            }
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % step == 0 || finished == total {
                control.report(finished as f64 / total as f64);
            }
            Ok(())
        })
    });

    outcome?;
    Ok(results.into_inner().unwrap_or_else(|e| e.into_inner()))
}

pub fn build_pool(threads: Option<usize>) -> anyhow::Result<ThreadPool> {
    let threads = threads
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("matcher-{i}"))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build worker pool: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_are_keyed_by_unit_index() -> anyhow::Result<()> {
        let pool = build_pool(Some(4))?;
        let items: Vec<u32> = (0..100).collect();
        let results = run_batch(&pool, &items, &BatchControl::new(), |n| (n % 2 == 0).then_some(n * 10))?;
        assert_eq!(results.len(), 50);
        assert_eq!(results.get(&4), Some(&40));
        assert_eq!(results.get(&5), None);
        Ok(())
    }

    #[test]
    fn progress_reaches_completion() -> anyhow::Result<()> {
        let pool = build_pool(Some(2))?;
        let last = Arc::new(Mutex::new(0.0f64));
        let sink = Arc::clone(&last);
        let control = BatchControl::with_progress(move |p| {
            let mut last = sink.lock().expect("progress lock");
            if p > *last {
                *last = p;
            }
        });
        let items = vec![(); 1000];
        run_batch(&pool, &items, &control, |_| Some(()))?;
        assert_eq!(*last.lock().expect("progress lock"), 1.0);
        Ok(())
    }

    #[test]
    fn cancelled_batches_return_an_error() -> anyhow::Result<()> {
        let pool = build_pool(Some(2))?;
        let control = BatchControl::new();
        control.cancel();
        let items = vec![1, 2, 3];
        assert_eq!(run_batch(&pool, &items, &control, |n| Some(*n)), Err(MatchError::Cancelled));
        Ok(())
    }

    #[test]
    #[should_panic(expected = "unit failed")]
    fn unit_panics_abort_the_batch() {
        let pool = build_pool(Some(2)).expect("pool");
        let items = vec![1, 2, 3];
        let _ = run_batch(&pool, &items, &BatchControl::new(), |n| -> Option<i32> {
            if *n == 2 {
                panic!("unit failed");
            }
            Some(*n)
        });
    }
}
