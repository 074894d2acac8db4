//! Injected logging.
//!
//! Components never talk to a global logger; they hold a [`Logger`] handle
//! given to them at construction. The default sink forwards to the `log`
//! crate facade, so embedders that already run `env_logger` or similar get
//! messages for free. Worker threads can be pointed at a [`BufferedSink`]
//! whose queued messages the embedder flushes from its own thread.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Destination for log messages. Implementations must tolerate being called
/// from worker and timer threads concurrently.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Cheap-to-clone handle components store and pass along.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger backed by the `log` crate facade.
    pub fn to_log_crate() -> Self {
        Self::new(Arc::new(StdLogSink))
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn info(&self, message: &str) {
        self.sink.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.sink.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.sink.log(LogLevel::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::to_log_crate()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Forwards to `log::info!` / `log::warn!` / `log::error!`.
pub struct StdLogSink;

impl LogSink for StdLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warning => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
    }
}

/// Swallows everything.
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Queues messages so that worker threads never block on the embedder's
/// output path. The embedder calls [`BufferedSink::flush`] from whichever
/// thread owns the real output.
pub struct BufferedSink {
    inner: Arc<dyn LogSink>,
    queue: Mutex<Vec<(LogLevel, String)>>,
}

impl BufferedSink {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self {
            inner,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Deliver all queued messages to the inner sink, in order.
    pub fn flush(&self) {
        let drained: Vec<(LogLevel, String)> = {
            let mut queue = match self.queue.lock() {
                Ok(queue) => queue,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *queue)
        };
        for (level, message) in drained {
            self.inner.log(level, &message);
        }
    }

    /// Number of messages waiting for a flush.
    pub fn pending(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl LogSink for BufferedSink {
    fn log(&self, level: LogLevel, message: &str) {
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push((level, message.to_string()));
    }
}
