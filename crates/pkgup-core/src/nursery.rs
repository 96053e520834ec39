//! Structured concurrency for check tasks.
//!
//! A [`Nursery`] owns a pool of worker threads sized to the hardware and a
//! queue of tasks. `join` drains the queue, joins every worker, and
//! propagates the first failure; a failure also flips the shared
//! [`CancelToken`] so in-flight peers can bail out at their next suspension
//! point instead of burning through more subprocess spawns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::Result;

type Task = Box<dyn FnOnce(&CancelToken) -> Result<()> + Send + 'static>;

/// Cooperative cancellation flag shared by every task in a nursery.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct Shared {
    cancel: CancelToken,
    first_error: Mutex<Option<anyhow::Error>>,
}

pub struct Nursery {
    queue: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl Nursery {
    /// A pool of `min(available_parallelism, cap)` workers, at least one.
    pub fn with_capacity(cap: usize) -> Self {
        let available = thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        let worker_count = cap.clamp(1, available.max(1));

        let (queue, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(Shared {
            cancel: CancelToken::default(),
            first_error: Mutex::new(None),
        });

        let workers = (0..worker_count)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&receiver, &shared))
            })
            .collect();

        Self {
            queue: Some(queue),
            workers,
            shared,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Schedule a task. Tasks starting after a failure observe a cancelled
    /// token and are expected to return without doing work.
    pub fn start_soon(&self, task: impl FnOnce(&CancelToken) -> Result<()> + Send + 'static) {
        if let Some(queue) = &self.queue {
            // Workers only hang up when the nursery is being torn down.
            let _ = queue.send(Box::new(task));
        }
    }

    /// Wait for every task, then report the first failure if any occurred.
    pub fn join(mut self) -> Result<()> {
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        let mut first_error = self
            .shared
            .first_error
            .lock()
            .expect("nursery error slot poisoned");
        match first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Nursery {
    fn drop(&mut self) {
        if self.queue.is_none() && self.workers.is_empty() {
            return;
        }
        self.shared.cancel.cancel();
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Task>>, shared: &Shared) {
    loop {
        let task = {
            let receiver = receiver.lock().expect("nursery queue poisoned");
            receiver.recv()
        };
        let Ok(task) = task else {
            return;
        };
        if let Err(err) = task(&shared.cancel) {
            shared.cancel.cancel();
            let mut first_error = shared
                .first_error
                .lock()
                .expect("nursery error slot poisoned");
            if first_error.is_none() {
                *first_error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn runs_every_task_and_joins() {
        let counter = Arc::new(AtomicUsize::new(0));
        let nursery = Nursery::with_capacity(4);
        for _ in 0..64 {
            let counter = Arc::clone(&counter);
            nursery.start_soon(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }
        nursery.join().expect("join");
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn first_failure_is_propagated() {
        let nursery = Nursery::with_capacity(2);
        nursery.start_soon(|_| Ok(()));
        nursery.start_soon(|_| Err(anyhow!("boom")));
        nursery.start_soon(|_| Ok(()));
        let err = nursery.join().expect_err("failure expected");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn failure_cancels_later_tasks() {
        let observed_cancelled = Arc::new(AtomicUsize::new(0));
        let nursery = Nursery::with_capacity(1);
        nursery.start_soon(|_| Err(anyhow!("first failure")));
        for _ in 0..8 {
            let observed = Arc::clone(&observed_cancelled);
            nursery.start_soon(move |cancel| {
                if cancel.is_cancelled() {
                    observed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                thread::sleep(Duration::from_millis(1));
                Ok(())
            });
        }
        assert!(nursery.join().is_err());
        assert_eq!(observed_cancelled.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn capacity_is_clamped_to_at_least_one_worker() {
        let nursery = Nursery::with_capacity(0);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        nursery.start_soon(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        nursery.join().expect("join");
        assert_eq!(done.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dropping_without_join_reaps_workers() {
        let nursery = Nursery::with_capacity(2);
        nursery.start_soon(|_| Ok(()));
        drop(nursery);
    }
}
