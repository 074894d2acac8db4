//! Mutex-guarded value with closure-based access.
//!
//! The guarded value can only be reached inside `read`/`write` closures, so
//! a caller can never hold the lock across an await point or forget to drop
//! a guard. Clones share the same underlying value.

use std::sync::{Arc, Mutex};

pub struct Protected<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Protected<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Run `f` with shared access to the value.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&guard)
    }

    /// Run `f` with exclusive access to the value.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl<T> Clone for Protected<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Protected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(guard) => f.debug_tuple("Protected").field(&*guard).finish(),
            Err(_) => f.write_str("Protected(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn read_sees_write() {
        let cell = Protected::new(7u32);
        cell.write(|v| *v += 1);
        assert_eq!(cell.read(|v| *v), 8);
    }

    #[test]
    fn clones_share_state() {
        let cell = Protected::new(Vec::<u32>::new());
        let other = cell.clone();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cell = cell.clone();
                thread::spawn(move || cell.write(|v| v.push(i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(other.read(|v| v.len()), 4);
    }
}
