//! Worker-pool job scheduling: single jobs, batched parallel-for, and
//! dependent jobs that enqueue once a prior handle signals.

mod append;

pub use append::AppendBuffer;

use std::ops::Range;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};

type Continuation = Box<dyn FnOnce() + Send>;

struct JobState {
    done: AtomicBool,
    done_tx: Sender<()>,
    continuations: Mutex<Vec<Continuation>>,
}

impl JobState {
    fn new() -> (Arc<Self>, Receiver<()>) {
        let (done_tx, done_rx) = bounded(1);
        (
            Arc::new(Self {
                done: AtomicBool::new(false),
                done_tx,
                continuations: Mutex::new(Vec::new()),
            }),
            done_rx,
        )
    }

    fn finish(&self) {
        let pending = {
            let mut continuations = self.continuations.lock().unwrap();
            self.done.store(true, Ordering::Release);
            std::mem::take(&mut *continuations)
        };
        let _ = self.done_tx.send(());
        for continuation in pending {
            continuation();
        }
    }
}

/// Completion handle for a scheduled job. Dropping the handle detaches the
/// job; it still runs to completion.
pub struct JobHandle {
    state: Arc<JobState>,
    done_rx: Receiver<()>,
}

impl JobHandle {
    /// An already-completed handle, for disabled features.
    pub fn completed() -> Self {
        let (state, done_rx) = JobState::new();
        state.finish();
        Self { state, done_rx }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    /// Block until the job (and everything it fanned out) has finished.
    pub fn complete(self) {
        if !self.is_done() {
            let _ = self.done_rx.recv();
        }
    }
}

/// Thread-pool job system. Work units are scheduled now and completed later;
/// parallel-for splits its item count into one batch per worker, rounded up.
pub struct JobSystem {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
}

impl JobSystem {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("veld-job-{i}"))
            .build()
            .expect("job pool");
        Self {
            pool: Arc::new(pool),
            workers,
        }
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(8);
        Self::new(workers)
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on the pool; the handle signals when it returns.
    pub fn schedule<F>(&self, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (state, done_rx) = JobState::new();
        let job_state = Arc::clone(&state);
        self.pool.spawn(move || {
            job();
            job_state.finish();
        });
        JobHandle { state, done_rx }
    }

    /// Split `item_count` items into per-worker batches and run `job` once
    /// per batch with that batch's index range. The handle signals when the
    /// last batch returns.
    pub fn schedule_parallel<F>(&self, item_count: usize, job: F) -> JobHandle
    where
        F: Fn(Range<usize>) + Send + Sync + 'static,
    {
        if item_count == 0 {
            return JobHandle::completed();
        }

        let (state, done_rx) = JobState::new();
        let batch_size = item_count.div_ceil(self.workers);
        let batch_count = item_count.div_ceil(batch_size);
        // The scheduling thread holds the +1 until its own clone of `job` is
        // gone, so completion implies every clone's captures were dropped
        // and a dependent job can reclaim shared buffers.
        let remaining = Arc::new(AtomicUsize::new(batch_count + 1));
        let job = Arc::new(job);

        for batch in 0..batch_count {
            let start = batch * batch_size;
            let end = (start + batch_size).min(item_count);
            let job = Arc::clone(&job);
            let remaining = Arc::clone(&remaining);
            let job_state = Arc::clone(&state);
            self.pool.spawn(move || {
                job(start..end);
                drop(job);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    job_state.finish();
                }
            });
        }

        drop(job);
        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            state.finish();
        }

        JobHandle { state, done_rx }
    }

    /// Run `job` over disjoint chunks of `data` across the pool and wait for
    /// all of them. Unlike [`schedule_parallel`](Self::schedule_parallel)
    /// this blocks, so the closure may borrow from the caller.
    pub fn run_parallel_chunks<T, F>(&self, data: &mut [T], chunk_len: usize, job: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        use rayon::prelude::*;
        let chunk_len = chunk_len.max(1);
        self.pool.install(|| {
            data.par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(index, chunk)| job(index, chunk));
        });
    }

    /// Enqueue `job` only after `after` signals completion.
    pub fn schedule_after<F>(&self, after: &JobHandle, job: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (state, done_rx) = JobState::new();
        let job_state = Arc::clone(&state);
        let pool = Arc::clone(&self.pool);
        let run = move || {
            pool.spawn(move || {
                job();
                job_state.finish();
            });
        };

        // Holding the lock while checking keeps finish() from racing past
        // an in-flight registration.
        let mut continuations = after.state.continuations.lock().unwrap();
        if after.state.done.load(Ordering::Acquire) {
            drop(continuations);
            run();
        } else {
            continuations.push(Box::new(run));
        }

        JobHandle { state, done_rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn schedule_runs_and_signals() {
        let jobs = JobSystem::new(2);
        let hits = Arc::new(AtomicU32::new(0));
        let h = {
            let hits = Arc::clone(&hits);
            jobs.schedule(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        h.complete();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn parallel_for_touches_every_item_once() {
        let jobs = JobSystem::new(4);
        let counts: Arc<Vec<AtomicU32>> =
            Arc::new((0..1000).map(|_| AtomicU32::new(0)).collect());
        let h = {
            let counts = Arc::clone(&counts);
            jobs.schedule_parallel(1000, move |range| {
                for i in range {
                    counts[i].fetch_add(1, Ordering::Relaxed);
                }
            })
        };
        h.complete();
        assert!(counts.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn zero_items_completes_immediately() {
        let jobs = JobSystem::new(2);
        let h = jobs.schedule_parallel(0, |_| panic!("no batches expected"));
        assert!(h.is_done());
        h.complete();
    }

    #[test]
    fn dependent_job_runs_after_prior() {
        let jobs = JobSystem::new(2);
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let order = Arc::clone(&order);
            jobs.schedule(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                order.lock().unwrap().push("first");
            })
        };
        let second = {
            let order = Arc::clone(&order);
            jobs.schedule_after(&first, move || {
                order.lock().unwrap().push("second");
            })
        };
        second.complete();
        first.complete();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn dependent_on_finished_job_still_runs() {
        let jobs = JobSystem::new(2);
        let first = jobs.schedule(|| {});
        while !first.is_done() {
            thread::yield_now();
        }
        let ran = Arc::new(AtomicBool::new(false));
        let second = {
            let ran = Arc::clone(&ran);
            jobs.schedule_after(&first, move || ran.store(true, Ordering::Release))
        };
        second.complete();
        assert!(ran.load(Ordering::Acquire));
    }
}
