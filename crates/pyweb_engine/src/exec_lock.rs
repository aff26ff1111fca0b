//! Process-wide execution lock.
//!
//! Every operation that touches guest interpreter state runs inside a
//! scoped acquisition of this lock. It is re-entrant: nested operations
//! on the thread that already holds it (sandbox setup triggered from
//! inside an execution, foreign calls re-entering the bridge) acquire
//! again without deadlocking. The guard releases on all exit paths.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

pub struct ExecLock {
    state: Mutex<LockState>,
    available: Condvar,
}

struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl ExecLock {
    pub const fn new() -> Self {
        ExecLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Blocks until the lock is held by the current thread. Re-entrant:
    /// if the current thread already owns it, only the depth grows.
    pub fn acquire(&self) -> ExecGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
        ExecGuard { lock: self }
    }

    /// True when the current thread is inside an acquisition.
    pub fn held_by_current_thread(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.owner == Some(thread::current().id())
    }
}

pub struct ExecGuard<'a> {
    lock: &'a ExecLock,
}

impl Drop for ExecGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap_or_else(|e| e.into_inner());
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.lock.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn reentrant_on_same_thread() {
        let lock = ExecLock::new();
        let _outer = lock.acquire();
        let _inner = lock.acquire();
        assert!(lock.held_by_current_thread());
    }

    #[test]
    fn releases_after_last_guard() {
        let lock = ExecLock::new();
        {
            let _a = lock.acquire();
            let _b = lock.acquire();
        }
        assert!(!lock.held_by_current_thread());
    }

    #[test]
    fn serializes_across_threads() {
        let lock = Arc::new(ExecLock::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = lock.acquire();
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
