//! Real-time scheduling hint for the engine thread.

/// FIFO priority requested for the engine thread.
#[cfg(unix)]
const ENGINE_PRIORITY: libc::c_int = 10;

/// Ask the OS to run the calling thread with `SCHED_FIFO`.
///
/// Usually needs privileges; failure only costs latency, so it is logged
/// and otherwise ignored. Returns whether the request was granted.
#[cfg(unix)]
pub fn promote_current_thread() -> bool {
    // SAFETY: `sched_param` is a plain C struct for which all-zeroes is valid.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = ENGINE_PRIORITY;
    // SAFETY: `pthread_self()` is the live calling thread and `param` outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc == 0 {
        log::info!("engine thread running with SCHED_FIFO priority {}", ENGINE_PRIORITY);
        true
    } else {
        log::debug!("real-time scheduling unavailable (error {})", rc);
        false
    }
}

#[cfg(not(unix))]
pub fn promote_current_thread() -> bool {
    false
}
