//! Bounded fan-out/fan-in execution of per-file jobs.
//!
//! # Shape
//!
//! ```text
//!   producer thread          rayon pool (N workers)         calling thread
//!  ┌──────────────┐  bounded  ┌──────────────────┐ unbounded ┌────────────┐
//!  │ walker/list  │──────────▶│ job(&descriptor) │──────────▶│  collect   │
//!  └──────────────┘   queue   └──────────────────┘  results  └────────────┘
//! ```
//!
//! - The work queue holds at most `queue_capacity` items. A full queue
//!   suspends the producer, which polls the cancellation token while it waits.
//! - Each worker finishes its current item before taking the next, so at
//!   most `queue_capacity + workers` items are ever in flight.
//! - `collect` runs on the calling thread only. This is the single place
//!   where shared state (e.g. the metadata cache) is written.
//! - Every dispatched item comes back exactly once, either with its result
//!   or as skipped because cancellation was observed before it started.

use std::cell::Cell;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, SendTimeoutError, Sender};

use super::finder::FinderError;
use crate::cancel::CancellationToken;
use crate::scanner::FileDescriptor;

/// How long a blocked producer waits before re-checking cancellation.
pub const PRODUCER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks items between a successful enqueue and the end of their job.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicIsize,
    peak: AtomicIsize,
}

impl InFlightGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneously in-flight items observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        usize::try_from(self.peak.load(Ordering::SeqCst)).unwrap_or(0)
    }
}

/// Producer-side handle to the work queue.
pub struct Feeder<'a> {
    tx: Sender<FileDescriptor>,
    cancel: &'a CancellationToken,
    gauge: &'a InFlightGauge,
    fed: Cell<u64>,
}

impl Feeder<'_> {
    /// Enqueue one item, waiting while the queue is full.
    ///
    /// Returns `false` if the item was not enqueued because the scan was
    /// cancelled; the producer should stop.
    pub fn feed(&self, file: FileDescriptor) -> bool {
        let mut item = file;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(item, PRODUCER_POLL_INTERVAL) {
                Ok(()) => {
                    self.gauge.enter();
                    self.fed.set(self.fed.get() + 1);
                    return true;
                }
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Bookkeeping for one dispatch round.
#[derive(Debug)]
pub struct DispatchOutcome<S> {
    /// Whatever the producer returned.
    pub produced: S,
    /// Items accepted into the work queue.
    pub dispatched: u64,
    /// Items whose job ran.
    pub completed: u64,
    /// Items dequeued after cancellation and dropped without running.
    pub skipped: u64,
    /// Peak in-flight items during this round.
    pub peak_in_flight: usize,
}

/// Bounded worker pool plus queue configuration.
pub struct Scheduler {
    pool: rayon::ThreadPool,
    workers: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::ThreadPool`] if the threads cannot be spawned.
    pub fn new(
        workers: usize,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> Result<Self, FinderError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dupetree-hash-{i}"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            queue_capacity: queue_capacity.max(1),
            cancel,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Run one fan-out/fan-in round.
    ///
    /// `produce` runs on its own thread and feeds items through the
    /// [`Feeder`]. `job` runs on the workers. `collect` receives each
    /// dispatched item with `Some(result)`, or `None` if it was skipped after
    /// cancellation, on the calling thread in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::WorkerPanicked`] if the producer panicked.
    pub fn run<S, R, P, J, C>(
        &self,
        produce: P,
        job: J,
        mut collect: C,
    ) -> Result<DispatchOutcome<S>, FinderError>
    where
        P: FnOnce(&Feeder<'_>) -> S + Send,
        S: Send,
        J: Fn(&FileDescriptor) -> R + Sync,
        R: Send,
        C: FnMut(FileDescriptor, Option<R>),
    {
        let (work_tx, work_rx) = bounded::<FileDescriptor>(self.queue_capacity);
        let (result_tx, result_rx) = unbounded::<(FileDescriptor, Option<R>)>();
        let gauge = InFlightGauge::default();
        let dispatched = AtomicU64::new(0);
        let cancel = &self.cancel;
        let job = &job;

        let mut completed = 0u64;
        let mut skipped = 0u64;

        let produced = std::thread::scope(|scope| {
            let gauge = &gauge;
            let dispatched = &dispatched;

            let producer = scope.spawn(move || {
                let feeder = Feeder {
                    tx: work_tx,
                    cancel,
                    gauge,
                    fed: Cell::new(0),
                };
                let produced = produce(&feeder);
                dispatched.store(feeder.fed.get(), Ordering::SeqCst);
                produced
            });

            self.pool.in_place_scope(|workers| {
                for _ in 0..self.workers {
                    let rx = work_rx.clone();
                    let tx = result_tx.clone();
                    workers.spawn(move |_| {
                        for file in rx.iter() {
                            let outcome = if cancel.is_cancelled() {
                                None
                            } else {
                                Some(job(&file))
                            };
                            gauge.leave();
                            if tx.send((file, outcome)).is_err() {
                                break;
                            }
                        }
                    });
                }
                // Only worker clones may keep the channels alive.
                drop(work_rx);
                drop(result_tx);

                for (file, outcome) in result_rx.iter() {
                    if outcome.is_some() {
                        completed += 1;
                    } else {
                        skipped += 1;
                    }
                    collect(file, outcome);
                }
            });

            producer.join().map_err(|_| FinderError::WorkerPanicked)
        })?;

        let dispatched = dispatched.load(Ordering::SeqCst);
        if completed + skipped != dispatched {
            log::warn!(
                "Dispatch accounting mismatch: {} dispatched, {} returned",
                dispatched,
                completed + skipped
            );
        }

        Ok(DispatchOutcome {
            produced,
            dispatched,
            completed,
            skipped,
            peak_in_flight: gauge.peak(),
        })
    }
}
