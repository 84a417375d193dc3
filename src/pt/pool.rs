//! Worker pool: per-worker task queues, best-solution slot, and
//! barrier-less termination detection.

use super::error::PtError;
use super::graph::NodeId;
use super::queue::TaskQueue;
use super::types::Sample;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Owns one [`TaskQueue`] per worker thread plus the run-wide counters.
///
/// Worker `i` pops from queue `i` first, then scans `(i + 1) % T`,
/// `(i + 2) % T`, ... so no worker idles while another queue holds work.
/// The pool stops once `finished` reaches `expected` or a node fails.
pub(crate) struct WorkerPool<S> {
    queues: Vec<TaskQueue>,
    next_queue: AtomicUsize,
    expected: AtomicUsize,
    finished: AtomicUsize,
    cycle_index: AtomicUsize,
    best: Mutex<Option<Sample<S>>>,
    fault: Mutex<Option<PtError>>,
    aborted: AtomicBool,
}

impl<S: Send> WorkerPool<S> {
    pub(crate) fn new(threads: usize) -> Self {
        Self {
            queues: (0..threads.max(1)).map(|_| TaskQueue::new()).collect(),
            next_queue: AtomicUsize::new(0),
            expected: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            cycle_index: AtomicUsize::new(0),
            best: Mutex::new(None),
            fault: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    pub(crate) fn threads(&self) -> usize {
        self.queues.len()
    }

    /// Sets how many [`report`](Self::report) calls end the run.
    pub(crate) fn set_expected(&self, total: usize) {
        self.expected.store(total, Ordering::Release);
    }

    /// Enqueues a ready node, round-robin over the worker queues.
    pub(crate) fn submit(&self, node: NodeId) {
        let i = self.next_queue.fetch_add(1, Ordering::Relaxed);
        self.queues[i % self.queues.len()].push(node);
    }

    /// Number of nodes currently waiting in any queue.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.queues.iter().map(TaskQueue::len).sum()
    }

    pub(crate) fn take(&self, worker: usize) -> Option<NodeId> {
        let n = self.queues.len();
        (0..n).find_map(|k| self.queues[(worker + k) % n].pop())
    }

    /// Records that one node finished its cycle budget.
    ///
    /// Chain nodes hand in their best sample, which replaces the global
    /// best when strictly cheaper. Returns whether every expected node
    /// has now finished.
    pub(crate) fn report(&self, sample: Option<Sample<S>>) -> bool {
        {
            let mut best = self.best.lock();
            if let Some(sample) = sample {
                if best.as_ref().is_none_or(|b| sample.cost < b.cost) {
                    *best = Some(sample);
                }
            }
        }
        let done = self.finished.fetch_add(1, Ordering::AcqRel) + 1;
        done >= self.expected.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    /// Raises the shared cycle index to at least `cycle`.
    pub(crate) fn advance_cycle(&self, cycle: usize) {
        self.cycle_index.fetch_max(cycle, Ordering::Relaxed);
    }

    pub(crate) fn cycle_index(&self) -> usize {
        self.cycle_index.load(Ordering::Relaxed)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
            || self.finished.load(Ordering::Acquire) >= self.expected.load(Ordering::Acquire)
    }

    /// Stops the run; the first error wins.
    pub(crate) fn abort(&self, err: PtError) {
        tracing::warn!(error = %err, "aborting parallel tempering run");
        self.fault.lock().get_or_insert(err);
        self.aborted.store(true, Ordering::Release);
    }

    pub(crate) fn take_best(&self) -> Option<Sample<S>> {
        self.best.lock().take()
    }

    /// Spawns the worker threads and blocks until the run is done.
    ///
    /// Every dequeued node is handed to `execute` on the worker that
    /// popped it. Errors and panics from `execute` abort the run and are
    /// returned here once all workers have stopped.
    pub(crate) fn run<F>(&self, execute: F) -> Result<(), PtError>
    where
        F: Fn(NodeId) -> Result<(), PtError> + Sync,
    {
        let threads = self.threads();
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pt-worker-{i}"))
            .build()
            .map_err(|e| PtError::ThreadPool(e.to_string()))?;

        let execute = &execute;
        workers.scope(|scope| {
            for worker in 0..threads {
                scope.spawn(move |_| self.work(worker, execute));
            }
        });

        match self.fault.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn work<F>(&self, worker: usize, execute: &F)
    where
        F: Fn(NodeId) -> Result<(), PtError> + Sync,
    {
        while !self.is_done() {
            let Some(node) = self.take(worker) else {
                std::thread::yield_now();
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| execute(node))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.abort(err),
                Err(payload) => self.abort(PtError::NodePanicked {
                    node,
                    message: panic_message(payload.as_ref()),
                }),
            }
        }
    }
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
