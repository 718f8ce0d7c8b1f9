//! Worker Pool - bounded fan-out for detector fit/score tasks
//!
//! Named threads pulling boxed jobs off one shared channel. Each task's
//! timeout starts when a worker picks it up, so work queued behind a slow
//! task is never charged for the wait. A task that overruns is reported as
//! timed out, its late result is dropped, and a replacement worker is spawned
//! so the pool keeps its size while the stuck thread finishes and retires.
//! Panics are caught per task and never take a worker down.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// What a worker does after finishing a job
enum WorkerControl {
    Continue,
    /// The job overran and a replacement already took this worker's place
    Retire,
}

type Job = Box<dyn FnOnce() -> WorkerControl + Send + 'static>;

/// A unit of work submitted to `run_all`
pub type Task<T> = Box<dyn FnOnce() -> T + Send + 'static>;

#[derive(Debug)]
pub enum TaskOutcome<T> {
    Done(T),
    Panicked(String),
    TimedOut,
}

impl<T> TaskOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done(_))
    }
}

// Task lifecycle, shared between the submitting thread and the worker
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const ABANDONED: u8 = 3;

enum TaskEvent<T> {
    Started(usize),
    Finished(usize, thread::Result<T>),
}

pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    receiver: Arc<Mutex<Receiver<Job>>>,
    size: usize,
    next_id: AtomicUsize,
    replacements: AtomicUsize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();

        let pool = Self {
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            size,
            next_id: AtomicUsize::new(0),
            replacements: AtomicUsize::new(0),
        };
        for _ in 0..size {
            pool.spawn_worker();
        }

        log::debug!("Worker pool started with {} threads", size);
        pool
    }

    fn spawn_worker(&self) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let receiver = Arc::clone(&self.receiver);
        let spawned = thread::Builder::new()
            .name(format!("sentinel-worker-{}", id))
            .spawn(move || loop {
                // Lock only for the dequeue, never while running the job
                let job = receiver.lock().recv();
                match job {
                    Ok(job) => {
                        if let WorkerControl::Retire = job() {
                            log::debug!("Worker {} retired after an overrunning task", id);
                            break;
                        }
                    }
                    Err(_) => break,
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn worker {}: {}", id, e);
        }
    }

    /// min(tasks, cores), overridable by an explicit cap
    pub fn recommended_size(tasks: usize, max_workers: usize) -> usize {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let size = tasks.min(cores).max(1);
        if max_workers > 0 {
            size.min(max_workers)
        } else {
            size
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers spawned to stand in for ones stuck on an overrunning task
    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::Relaxed)
    }

    /// Run every task, returning outcomes in submission order.
    ///
    /// `timeout` applies to each task separately, measured from the moment a
    /// worker starts it.
    pub fn run_all<T: Send + 'static>(&self, tasks: Vec<Task<T>>, timeout: Duration) -> Vec<TaskOutcome<T>> {
        let count = tasks.len();
        let (event_tx, event_rx) = mpsc::channel::<TaskEvent<T>>();
        let mut outcomes: Vec<Option<TaskOutcome<T>>> = (0..count).map(|_| None).collect();
        let states: Vec<Arc<AtomicU8>> = (0..count).map(|_| Arc::new(AtomicU8::new(QUEUED))).collect();

        for (index, task) in tasks.into_iter().enumerate() {
            let event_tx = event_tx.clone();
            let state = Arc::clone(&states[index]);
            let job: Job = Box::new(move || {
                if state
                    .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Given up on before it ever ran
                    return WorkerControl::Continue;
                }
                // Receiver may be gone after a timeout
                let _ = event_tx.send(TaskEvent::Started(index));
                let result = catch_unwind(AssertUnwindSafe(task));
                let _ = event_tx.send(TaskEvent::Finished(index, result));
                match state.compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => WorkerControl::Continue,
                    Err(_) => WorkerControl::Retire,
                }
            });

            let submitted = match &self.sender {
                Some(sender) => sender.send(job).is_ok(),
                None => false,
            };
            if !submitted {
                outcomes[index] = Some(TaskOutcome::Panicked("worker pool is shut down".to_string()));
            }
        }
        drop(event_tx);

        // Tasks run at most one timeout each, at least one at a time
        let stall_deadline = deadline_after(Instant::now(), timeout.saturating_mul(count as u32 + 1));
        let mut started: Vec<Option<Instant>> = vec![None; count];
        let mut pending = outcomes.iter().filter(|o| o.is_none()).count();

        while pending > 0 {
            let now = Instant::now();

            for index in 0..count {
                let Some(begun) = started[index] else { continue };
                if outcomes[index].is_some() || now < deadline_after(begun, timeout) {
                    continue;
                }
                if self.abandon(&states[index]) {
                    outcomes[index] = Some(TaskOutcome::TimedOut);
                    pending -= 1;
                }
            }
            if pending == 0 {
                break;
            }

            if now >= stall_deadline {
                log::warn!("Worker pool stalled with {} tasks outstanding", pending);
                for (index, outcome) in outcomes.iter_mut().enumerate() {
                    if outcome.is_none() {
                        self.abandon(&states[index]);
                        *outcome = Some(TaskOutcome::TimedOut);
                    }
                }
                break;
            }

            let next_deadline = started
                .iter()
                .zip(outcomes.iter())
                .filter_map(|(begun, outcome)| match (begun, outcome) {
                    (Some(begun), None) => Some(deadline_after(*begun, timeout)),
                    _ => None,
                })
                .fold(stall_deadline, Instant::min);

            match event_rx.recv_timeout(next_deadline.saturating_duration_since(now)) {
                Ok(TaskEvent::Started(index)) => started[index] = Some(Instant::now()),
                Ok(TaskEvent::Finished(index, result)) => {
                    if outcomes[index].is_none() {
                        outcomes[index] = Some(match result {
                            Ok(value) => TaskOutcome::Done(value),
                            Err(panic) => TaskOutcome::Panicked(panic_message(&panic)),
                        });
                        pending -= 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or(TaskOutcome::TimedOut))
            .collect()
    }

    /// Give up on a task. False when it already finished and its result is
    /// still in flight.
    fn abandon(&self, state: &AtomicU8) -> bool {
        if state
            .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return true;
        }
        match state.compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                // The stuck worker retires once its task returns
                self.replacements.fetch_add(1, Ordering::Relaxed);
                self.spawn_worker();
                true
            }
            Err(ABANDONED) => true,
            Err(_) => false,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel stops idle workers; a stuck task is left detached
        self.sender.take();
    }
}

/// `from + after`, saturating far in the future instead of overflowing
fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .unwrap_or_else(|| from + Duration::from_secs(u64::from(u32::MAX)))
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_in_submission_order() {
        let pool = WorkerPool::new(3);
        let tasks: Vec<Task<usize>> = (0..6)
            .map(|i| {
                let task: Task<usize> = Box::new(move || {
                    thread::sleep(Duration::from_millis((6 - i as u64) * 5));
                    i * 10
                });
                task
            })
            .collect();

        let outcomes = pool.run_all(tasks, Duration::from_secs(5));
        let values: Vec<usize> = outcomes
            .into_iter()
            .map(|o| match o {
                TaskOutcome::Done(v) => v,
                other => panic!("unexpected outcome {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_panic_is_isolated() {
        let pool = WorkerPool::new(2);
        let tasks: Vec<Task<u32>> = vec![Box::new(|| panic!("boom")), Box::new(|| 7)];
        let outcomes = pool.run_all(tasks, Duration::from_secs(5));
        assert!(matches!(&outcomes[0], TaskOutcome::Panicked(msg) if msg == "boom"));
        assert!(matches!(outcomes[1], TaskOutcome::Done(7)));

        // Pool still usable afterwards
        let again = pool.run_all(vec![Box::new(|| 1u32) as Task<u32>], Duration::from_secs(5));
        assert!(again[0].is_done());
    }

    #[test]
    fn test_overrunning_task_times_out() {
        let pool = WorkerPool::new(2);
        let tasks: Vec<Task<u32>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_millis(500));
                1
            }),
            Box::new(|| 2),
        ];
        let outcomes = pool.run_all(tasks, Duration::from_millis(100));
        assert!(matches!(outcomes[0], TaskOutcome::TimedOut));
        assert!(matches!(outcomes[1], TaskOutcome::Done(2)));
    }

    #[test]
    fn test_queue_wait_does_not_count_against_timeout() {
        // One worker: the second task waits behind the first for ~150 ms
        let pool = WorkerPool::new(1);
        let tasks: Vec<Task<u32>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_millis(150));
                1
            }),
            Box::new(|| {
                thread::sleep(Duration::from_millis(150));
                2
            }),
        ];
        let outcomes = pool.run_all(tasks, Duration::from_millis(250));
        assert!(matches!(outcomes[0], TaskOutcome::Done(1)));
        assert!(matches!(outcomes[1], TaskOutcome::Done(2)));
        assert_eq!(pool.replacements(), 0);
    }

    #[test]
    fn test_fast_task_behind_stuck_task_still_runs() {
        let pool = WorkerPool::new(1);
        let tasks: Vec<Task<u32>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_secs(2));
                1
            }),
            Box::new(|| 2),
        ];
        let outcomes = pool.run_all(tasks, Duration::from_millis(200));
        assert!(matches!(outcomes[0], TaskOutcome::TimedOut));
        assert!(matches!(outcomes[1], TaskOutcome::Done(2)));
        assert_eq!(pool.replacements(), 1);
    }

    #[test]
    fn test_stuck_worker_is_replaced_for_later_calls() {
        let pool = WorkerPool::new(1);
        let first: Vec<Task<u32>> = vec![Box::new(|| {
            thread::sleep(Duration::from_secs(3));
            1
        })];
        let outcomes = pool.run_all(first, Duration::from_millis(200));
        assert!(matches!(outcomes[0], TaskOutcome::TimedOut));

        // The only original worker is still asleep; the replacement serves these
        let second: Vec<Task<u32>> = (0..2)
            .map(|i| {
                let task: Task<u32> = Box::new(move || {
                    thread::sleep(Duration::from_millis(50));
                    i
                });
                task
            })
            .collect();
        let started = Instant::now();
        let outcomes = pool.run_all(second, Duration::from_millis(300));
        assert!(outcomes.iter().all(|o| o.is_done()), "{:?}", outcomes);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pool.replacements(), 1);
    }

    #[test]
    fn test_recommended_size_bounds() {
        assert_eq!(WorkerPool::recommended_size(4, 1), 1);
        assert!(WorkerPool::recommended_size(4, 0) <= 4);
        assert_eq!(WorkerPool::recommended_size(0, 0), 1);
    }
}
