//! Request/confirm handshake between control threads and the engine thread.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct State<C> {
    generation: u64,
    armed: Option<C>,
    /// Engine time of the confirmation for `generation`.
    confirmed: Option<f64>,
}

/// A generation-counted promise.
///
/// Each [`arm`](Self::arm) starts a new generation and records the
/// condition the engine should watch for. Only the latest generation can be
/// confirmed, so re-arming silently supersedes a stale request. A single
/// waiter per synchronizer is assumed.
pub struct Synchronizer<C> {
    state: Mutex<State<C>>,
    cond: Condvar,
}

impl<C> Default for Synchronizer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Synchronizer<C> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { generation: 0, armed: None, confirmed: None }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `condition`; returns the new generation.
    pub fn arm(&self, condition: C) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.armed = Some(condition);
        state.confirmed = None;
        state.generation
    }

    /// Number of arms so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// True while a request waits for confirmation.
    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    /// Confirm the current arm at engine time `time`.
    ///
    /// Returns false if nothing was armed.
    pub fn confirm(&self, time: f64) -> bool {
        self.confirm_if(time, |_| true)
    }

    /// Confirm the current arm if `reached` holds for its condition.
    pub fn confirm_if(&self, time: f64, reached: impl FnOnce(&C) -> bool) -> bool {
        let mut state = self.lock();
        match state.armed.as_ref() {
            Some(condition) if reached(condition) => {
                state.armed = None;
                state.confirmed = Some(time);
                drop(state);
                self.cond.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Forget any arm or confirmation. A blocked waiter returns `None`.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.armed = None;
        state.confirmed = None;
        drop(state);
        self.cond.notify_all();
    }

    /// Block until the latest arm is confirmed; returns its engine time.
    ///
    /// Returns `None` immediately if nothing is armed or confirmed, or once a
    /// reset drops the pending arm.
    pub fn wait(&self) -> Option<f64> {
        let state = self.lock();
        let state = self
            .cond
            .wait_while(state, |s| s.armed.is_some() && s.confirmed.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.confirmed
    }

    /// Like [`wait`](Self::wait) with an upper bound.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<f64> {
        let state = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.armed.is_some() && s.confirmed.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.confirmed
    }
}

impl<C: Clone> Synchronizer<C> {
    /// The condition the engine is currently asked to watch for.
    pub fn pending(&self) -> Option<C> {
        self.lock().armed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn confirm_unblocks_waiter_with_time() {
        let sync = Arc::new(Synchronizer::new());
        sync.arm(3u32);
        let engine = {
            let sync = sync.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                sync.confirm_if(1.5, |&pos| pos == 3)
            })
        };
        assert_eq!(sync.wait(), Some(1.5));
        assert!(engine.join().unwrap());
    }

    #[test]
    fn unmet_condition_does_not_confirm() {
        let sync = Synchronizer::new();
        sync.arm(5u32);
        assert!(!sync.confirm_if(0.1, |&pos| pos == 4));
        assert!(sync.is_armed());
        assert_eq!(sync.pending(), Some(5));
    }

    #[test]
    fn rearm_supersedes_stale_condition() {
        let sync = Arc::new(Synchronizer::new());
        sync.arm(5u32);
        sync.arm(9u32);

        let waiter = {
            let sync = sync.clone();
            thread::spawn(move || sync.wait())
        };

        // The engine walks through positions 4..=9, confirming only what is armed.
        for pos in 4u32..=9 {
            thread::sleep(Duration::from_millis(2));
            sync.confirm_if(pos as f64, |&target| target == pos);
        }
        assert_eq!(waiter.join().unwrap(), Some(9.0));
    }

    #[test]
    fn reset_releases_waiter() {
        let sync = Arc::new(Synchronizer::new());
        sync.arm(1u32);
        let waiter = {
            let sync = sync.clone();
            thread::spawn(move || sync.wait())
        };
        thread::sleep(Duration::from_millis(10));
        sync.reset();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn wait_timeout_expires_when_unconfirmed() {
        let sync = Synchronizer::new();
        sync.arm(1u32);
        assert_eq!(sync.wait_timeout(Duration::from_millis(5)), None);
        assert!(sync.is_armed());
    }

    #[test]
    fn confirm_without_arm_is_a_no_op() {
        let sync: Synchronizer<u32> = Synchronizer::new();
        assert!(!sync.confirm(1.0));
        assert_eq!(sync.wait(), None);
    }

    #[test]
    fn generations_increase() {
        let sync = Synchronizer::new();
        let a = sync.arm(1u32);
        let b = sync.arm(2u32);
        assert!(b > a);
        assert_eq!(sync.generation(), b);
    }
}
