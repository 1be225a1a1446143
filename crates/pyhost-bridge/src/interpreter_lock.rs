//! The single process-wide interpreter lock
//!
//! The GIL alone is not enough to serialize host operations: a script that
//! sleeps or does I/O releases it, letting another host call interleave. Every
//! entry point therefore takes this mutex for its whole duration and only then
//! attaches to the interpreter. The mutex is not reentrant; a nested attempt
//! from the owning thread is reported instead of deadlocking.

use crate::errors::BridgeError;
use crate::initialization;
use parking_lot::{const_mutex, Mutex, MutexGuard};
use pyo3::Python;
use std::cell::Cell;

static INTERPRETER_LOCK: Mutex<()> = const_mutex(());

thread_local! {
    static HOLDS_LOCK: Cell<bool> = const { Cell::new(false) };
}

/// Ownership of the interpreter lock; released on drop, including unwinding
pub(crate) struct InterpreterGuard {
    _guard: MutexGuard<'static, ()>,
}

impl InterpreterGuard {
    pub(crate) fn acquire() -> Result<Self, BridgeError> {
        if HOLDS_LOCK.with(Cell::get) {
            return Err(BridgeError::Reentrant);
        }
        let guard = INTERPRETER_LOCK.lock();
        HOLDS_LOCK.with(|held| held.set(true));
        Ok(Self { _guard: guard })
    }
}

impl Drop for InterpreterGuard {
    fn drop(&mut self) {
        HOLDS_LOCK.with(|held| held.set(false));
    }
}

#[cfg(test)]
fn held_by_current_thread() -> bool {
    HOLDS_LOCK.with(Cell::get)
}

/// Run `f` with exclusive access to the interpreter
pub fn with_interpreter<F, R>(f: F) -> Result<R, BridgeError>
where
    F: for<'py> FnOnce(Python<'py>) -> Result<R, BridgeError>,
{
    if !initialization::interpreter_ready() {
        return Err(BridgeError::NotInitialized);
    }
    let _guard = InterpreterGuard::acquire()?;
    Python::attach(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // The guard is process-wide, so everything exercising it lives in one test.
    #[test]
    fn test_guard_serializes_and_releases() {
        {
            let guard = InterpreterGuard::acquire();
            assert!(guard.is_ok());
            assert!(held_by_current_thread());
            assert!(matches!(
                InterpreterGuard::acquire(),
                Err(BridgeError::Reentrant)
            ));
        }
        assert!(!held_by_current_thread());

        // Released when the holder unwinds
        let unwound = std::panic::catch_unwind(|| {
            let _guard = InterpreterGuard::acquire();
            panic!("script failure");
        });
        assert!(unwound.is_err());
        assert!(!held_by_current_thread());
        assert!(InterpreterGuard::acquire().is_ok());

        // Read-sleep-write under the guard never loses an update
        let counter = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let Ok(_guard) = InterpreterGuard::acquire() else {
                        return;
                    };
                    let seen = counter.load(Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    counter.store(seen + 1, Ordering::SeqCst);
                })
            })
            .collect();
        for worker in workers {
            assert!(worker.join().is_ok());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_uninitialized_interpreter_is_rejected() {
        if initialization::interpreter_ready() {
            return;
        }
        let result = with_interpreter(|_py| Ok(()));
        assert!(matches!(result, Err(BridgeError::NotInitialized)));
    }
}
