//! Monotonic periodic timer.
//!
//! One thread per timer. The action runs on the timer thread, so ticks are
//! serialized by construction: a new tick cannot begin until the previous
//! invocation returned. `stop` blocks until any in-flight invocation has
//! finished and guarantees no further invocations happen afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Timer {
    start_delay: Duration,
    period_ms: Arc<AtomicU64>,
    worker: Option<TimerWorker>,
}

struct TimerWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Timer {
    /// `start_delay` is the wait before the first tick, `period` the wait
    /// between subsequent ticks.
    pub fn new(start_delay: Duration, period: Duration) -> Self {
        Self {
            start_delay,
            period_ms: Arc::new(AtomicU64::new(period.as_millis() as u64)),
            worker: None,
        }
    }

    pub fn with_period(period: Duration) -> Self {
        Self::new(period, period)
    }

    /// Spawn the timer thread. Fails if the timer is already running.
    pub fn start(&mut self, mut action: impl FnMut() + Send + 'static) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyStarted("timer"));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let period_ms = Arc::clone(&self.period_ms);
        let start_delay = self.start_delay;

        let handle = thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || {
                let mut delay = start_delay;
                loop {
                    match stop_rx.recv_timeout(delay) {
                        // Stop requested or the Timer handle disappeared.
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                    }
                    action();
                    delay = Duration::from_millis(period_ms.load(Ordering::Relaxed));
                }
            })
            .map_err(|e| Error::InvalidConfiguration(format!("timer thread spawn: {e}")))?;

        self.worker = Some(TimerWorker { stop_tx, handle });
        Ok(())
    }

    /// Stop the timer and wait for the current action to return. Idempotent.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Takes effect after the next tick.
    pub fn set_period(&self, period: Duration) {
        self.period_ms
            .store(period.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::Relaxed))
    }

    /// Handle that retunes the period without borrowing the timer - usable
    /// from inside the action itself.
    pub fn period_handle(&self) -> impl Fn(Duration) + Send + 'static {
        let period_ms = Arc::clone(&self.period_ms);
        move |period: Duration| {
            period_ms.store(period.as_millis() as u64, Ordering::Relaxed);
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
