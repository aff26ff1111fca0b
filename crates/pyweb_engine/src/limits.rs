//! Wall-clock CPU ceiling for guest executions.
//!
//! On Unix the engine arms an interval timer before running guest code;
//! when it fires, the signal handler sets a flag that guest-visible host
//! functions (the import hook, the `web` module) and the post-run check
//! observe. Pure guest loops that never re-enter host code are only
//! caught at the next host boundary, which is an accepted gap of this
//! mechanism. Non-Unix targets get a no-op guard.

use std::sync::atomic::{AtomicBool, Ordering};

static DEADLINE_HIT: AtomicBool = AtomicBool::new(false);

/// True once the timer for the current execution has fired.
pub(crate) fn deadline_hit() -> bool {
    DEADLINE_HIT.load(Ordering::SeqCst)
}

/// RAII timer covering one guest execution. Held only while the
/// execution lock is held, so the single process-wide flag is never
/// shared between two executions.
pub(crate) struct CpuGuard {
    armed: bool,
}

impl CpuGuard {
    pub(crate) fn arm(max_cpu_time_ms: u64) -> Self {
        DEADLINE_HIT.store(false, Ordering::SeqCst);
        if max_cpu_time_ms == 0 {
            return CpuGuard { armed: false };
        }
        CpuGuard {
            armed: sys::arm(max_cpu_time_ms),
        }
    }
}

impl Drop for CpuGuard {
    fn drop(&mut self) {
        if self.armed {
            sys::disarm();
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::sync::Once;
    use std::sync::atomic::Ordering;

    use super::DEADLINE_HIT;

    static INSTALL_HANDLER: Once = Once::new();

    extern "C" fn on_alarm(_signal: libc::c_int) {
        // Only an atomic store: the handler must stay async-signal-safe.
        DEADLINE_HIT.store(true, Ordering::SeqCst);
    }

    pub(super) fn arm(max_cpu_time_ms: u64) -> bool {
        INSTALL_HANDLER.call_once(|| unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_alarm as usize;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGALRM, &action, std::ptr::null_mut());
        });
        set_timer(max_cpu_time_ms)
    }

    pub(super) fn disarm() {
        set_timer(0);
    }

    fn set_timer(ms: u64) -> bool {
        let timer = libc::itimerval {
            it_interval: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            it_value: libc::timeval {
                tv_sec: (ms / 1000) as libc::time_t,
                tv_usec: ((ms % 1000) * 1000) as libc::suseconds_t,
            },
        };
        let rc = unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()) };
        rc == 0
    }
}

#[cfg(not(unix))]
mod sys {
    pub(super) fn arm(_max_cpu_time_ms: u64) -> bool {
        false
    }

    pub(super) fn disarm() {}
}
