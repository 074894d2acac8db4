//! Worker pool.
//!
//! A fixed set of worker threads, each owning its own FIFO task queue
//! behind a mutex and condition variable. `schedule` round-robins tasks
//! across the workers. Interruption is cooperative: a task receives a
//! [`TaskContext`] and is expected to poll [`TaskContext::interrupted`] at
//! its own checkpoints (the search polls once per enumerated column).
//!
//! `wait` drains: it blocks until every queue is empty and every worker is
//! idle. `interrupt_and_clear` cancels: queued tasks are dropped and the
//! call blocks only until in-flight tasks have returned.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::logging::Logger;

/// Upper bound on worker counts: twice the hardware concurrency.
pub fn max_worker_count() -> usize {
    num_cpus::get().max(1) * 2
}

/// Handed to every task; exposes the owning worker's interrupt flag.
pub struct TaskContext {
    interrupt: Arc<AtomicBool>,
}

impl TaskContext {
    /// True once the worker was interrupted; the task should drop its
    /// in-progress results and return.
    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }
}

/// A queued unit of work. No return value; completion tracking is the
/// scheduler's business (the search counts tasks down on a latch).
pub type Task = Box<dyn FnOnce(&TaskContext) + Send + 'static>;

struct WorkerShared {
    queue: Mutex<VecDeque<Task>>,
    queue_cv: Condvar,
    interrupt: Arc<AtomicBool>,
    shutdown: AtomicBool,
}

struct Worker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

/// Queue/idle accounting shared by all workers of one pool.
#[derive(Default)]
struct PoolState {
    /// Tasks queued but not yet started.
    pending: usize,
    /// Tasks currently executing.
    active: usize,
}

struct PoolShared {
    state: Mutex<PoolState>,
    state_cv: Condvar,
    /// Message of the most recent task panic, if any.
    last_panic: Mutex<Option<String>>,
    logger: Logger,
    name: String,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<Worker>>,
    rotation: AtomicUsize,
}

impl WorkerPool {
    /// Build a pool of `size` workers. The size must be within
    /// `1..=`[`max_worker_count`].
    pub fn new(name: &str, size: usize, logger: Logger) -> Result<Self> {
        let cap = max_worker_count();
        if size == 0 || size > cap {
            return Err(Error::InvalidConfiguration(format!(
                "worker count must be 1..={cap}, got {size}"
            )));
        }

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState::default()),
            state_cv: Condvar::new(),
            last_panic: Mutex::new(None),
            logger,
            name: name.to_string(),
        });
        let workers = (0..size)
            .map(|index| spawn_worker(&shared, index))
            .collect();
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            rotation: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Queue a task on the next worker in round-robin order.
    pub fn schedule(&self, task: Task) {
        let workers = lock(&self.workers);
        debug_assert!(!workers.is_empty());
        let slot = self.rotation.fetch_add(1, Ordering::Relaxed) % workers.len();
        let worker = &workers[slot];

        {
            let mut state = lock(&self.shared.state);
            state.pending += 1;
        }
        let mut queue = lock(&worker.shared.queue);
        queue.push_back(task);
        worker.shared.queue_cv.notify_one();
    }

    /// Block until every queue has drained and every worker is idle.
    pub fn wait(&self) {
        let mut state = lock(&self.shared.state);
        while state.pending > 0 || state.active > 0 {
            state = wait_cv(&self.shared.state_cv, state);
        }
    }

    /// Interrupt all workers: set every interrupt flag, drop queued tasks,
    /// and block until in-flight tasks have returned. Flags are cleared
    /// before returning, so the pool is reusable afterwards.
    pub fn interrupt_and_clear(&self) {
        let workers = lock(&self.workers);
        for worker in workers.iter() {
            worker.shared.interrupt.store(true, Ordering::Release);
            let dropped = {
                let mut queue = lock(&worker.shared.queue);
                let dropped = queue.len();
                queue.clear();
                dropped
            };
            if dropped > 0 {
                let mut state = lock(&self.shared.state);
                state.pending -= dropped;
                self.shared.state_cv.notify_all();
            }
            worker.shared.queue_cv.notify_one();
        }

        // Join current tasks to their next checkpoint.
        {
            let mut state = lock(&self.shared.state);
            while state.active > 0 || state.pending > 0 {
                state = wait_cv(&self.shared.state_cv, state);
            }
        }

        for worker in workers.iter() {
            worker.shared.interrupt.store(false, Ordering::Release);
        }
    }

    /// Change the number of workers, clamped to `1..=`[`max_worker_count`].
    /// Shrinking interrupts the removed workers and drops their queued
    /// tasks; growing spawns fresh ones.
    pub fn resize(&self, new_size: usize) {
        let new_size = new_size.clamp(1, max_worker_count());
        let mut workers = lock(&self.workers);

        while workers.len() > new_size {
            let mut worker = match workers.pop() {
                Some(worker) => worker,
                None => break,
            };
            worker.shared.shutdown.store(true, Ordering::Release);
            worker.shared.interrupt.store(true, Ordering::Release);
            let dropped = {
                let mut queue = lock(&worker.shared.queue);
                let dropped = queue.len();
                queue.clear();
                dropped
            };
            if dropped > 0 {
                let mut state = lock(&self.shared.state);
                state.pending -= dropped;
                self.shared.state_cv.notify_all();
            }
            worker.shared.queue_cv.notify_all();
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }

        let mut index = workers.len();
        while workers.len() < new_size {
            workers.push(spawn_worker(&self.shared, index));
            index += 1;
        }
    }

    /// Message of the most recent task panic, if any task has panicked.
    pub fn last_panic(&self) -> Option<String> {
        lock(&self.shared.last_panic).clone()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let mut workers = lock(&self.workers);
        for worker in workers.iter() {
            worker.shared.shutdown.store(true, Ordering::Release);
            worker.shared.interrupt.store(true, Ordering::Release);
            worker.shared.queue_cv.notify_all();
        }
        for worker in workers.iter_mut() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn spawn_worker(pool: &Arc<PoolShared>, index: usize) -> Worker {
    let shared = Arc::new(WorkerShared {
        queue: Mutex::new(VecDeque::new()),
        queue_cv: Condvar::new(),
        interrupt: Arc::new(AtomicBool::new(false)),
        shutdown: AtomicBool::new(false),
    });

    let thread_shared = Arc::clone(&shared);
    let thread_pool = Arc::clone(pool);
    let name = format!("{}-{}", pool.name, index);
    let handle = std::thread::Builder::new()
        .name(name)
        .spawn(move || worker_loop(thread_shared, thread_pool))
        .ok();

    Worker {
        shared,
        handle,
    }
}

fn worker_loop(shared: Arc<WorkerShared>, pool: Arc<PoolShared>) {
    let context = TaskContext {
        interrupt: Arc::clone(&shared.interrupt),
    };

    loop {
        let task = {
            let mut queue = lock(&shared.queue);
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if shared.interrupt.load(Ordering::Acquire) && !queue.is_empty() {
                    // Interrupted: drop whatever is still queued.
                    let dropped = queue.len();
                    queue.clear();
                    let mut state = lock(&pool.state);
                    state.pending -= dropped;
                    pool.state_cv.notify_all();
                    continue;
                }
                if let Some(task) = queue.pop_front() {
                    break task;
                }
                queue = wait_cv(&shared.queue_cv, queue);
            }
        };

        {
            let mut state = lock(&pool.state);
            state.pending -= 1;
            state.active += 1;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| task(&context)));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            pool.logger
                .error(&format!("{}: task panicked: {}", pool.name, message));
            *lock(&pool.last_panic) = Some(message);
        }

        {
            let mut state = lock(&pool.state);
            state.active -= 1;
            pool.state_cv.notify_all();
        }
    }
}

/// Best-effort extraction of a panic payload's message.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait_cv<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
) -> std::sync::MutexGuard<'a, T> {
    match condvar.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
