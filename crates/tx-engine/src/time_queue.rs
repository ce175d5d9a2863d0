//! Thread-safe, time-ordered telemetry queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Stamped<T> {
    time: f64,
    item: T,
}

/// A queue of timestamped items, kept in non-decreasing time order.
///
/// The engine thread adds items as it renders; a control thread consumes
/// them against its own view of the playback clock. Consumption is
/// destructive: anything returned or skipped is dropped from the queue.
pub struct TimeQueue<T> {
    items: Mutex<VecDeque<Stamped<T>>>,
}

impl<T> Default for TimeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeQueue<T> {
    pub fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Stamped<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `item` at `time`.
    ///
    /// Increasing times are an O(1) push. An older time walks back from the
    /// newest end; disorder is bounded to one render call, so the walk is
    /// short. Equal timestamps keep insertion order.
    pub fn add(&self, item: T, time: f64) {
        let mut items = self.lock();
        let in_order = items.back().map_or(true, |newest| newest.time <= time);
        if in_order {
            items.push_back(Stamped { time, item });
            return;
        }

        let mut idx = items.len();
        while idx > 0 && items[idx - 1].time > time {
            idx -= 1;
        }
        items.insert(idx, Stamped { time, item });
    }

    /// Latest item stamped at or before `time`.
    ///
    /// Every older item is discarded on the way.
    pub fn get(&self, time: f64) -> Option<T> {
        let mut items = self.lock();
        let mut latest = None;
        while items.front().is_some_and(|oldest| oldest.time <= time) {
            latest = items.pop_front().map(|s| s.item);
        }
        latest
    }

    /// Hand every item stamped at or before `time` to `f`, oldest first.
    ///
    /// The lock is not held while `f` runs. Returns whether anything was
    /// processed.
    pub fn foreach(&self, time: f64, mut f: impl FnMut(f64, T)) -> bool {
        let mut any = false;
        loop {
            let next = {
                let mut items = self.lock();
                if items.front().is_some_and(|oldest| oldest.time <= time) {
                    items.pop_front()
                } else {
                    None
                }
            };
            match next {
                Some(stamped) => {
                    any = true;
                    f(stamped.time, stamped.item);
                }
                None => return any,
            }
        }
    }

    /// Drop every queued item.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn drain(queue: &TimeQueue<u32>, time: f64) -> Vec<(f64, u32)> {
        let mut out = Vec::new();
        queue.foreach(time, |t, item| out.push((t, item)));
        out
    }

    #[test]
    fn foreach_replays_in_time_order() {
        let q = TimeQueue::new();
        q.add(1, 0.10);
        q.add(3, 0.30);
        q.add(2, 0.20);
        q.add(0, 0.05);
        q.add(4, 0.40);

        let seen = drain(&q, 0.30);
        assert_eq!(seen.iter().map(|(_, i)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn foreach_reports_whether_anything_ran() {
        let q = TimeQueue::new();
        q.add(7u32, 1.0);
        assert!(!q.foreach(0.5, |_, _| {}));
        assert!(q.foreach(1.0, |_, _| {}));
        assert!(q.is_empty());
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let q = TimeQueue::new();
        q.add(1, 0.5);
        q.add(9, 0.9);
        q.add(2, 0.5);
        q.add(3, 0.5);
        let order: Vec<u32> = drain(&q, 1.0).into_iter().map(|(_, i)| i).collect();
        assert_eq!(order, vec![1, 2, 3, 9]);
    }

    #[test]
    fn get_returns_latest_and_discards_older() {
        let q = TimeQueue::new();
        for (i, t) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            q.add(i as u32, t);
        }
        assert_eq!(q.get(0.35), Some(2));
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(0.35), None);
        assert_eq!(q.get(0.4), Some(3));
    }

    #[test]
    fn get_before_first_item_is_none() {
        let q = TimeQueue::new();
        q.add(1u32, 2.0);
        assert_eq!(q.get(1.0), None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn clear_empties_the_queue() {
        let q = TimeQueue::new();
        q.add(1u32, 0.0);
        q.add(2u32, 1.0);
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn concurrent_producer_and_consumer() {
        let q = Arc::new(TimeQueue::new());
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    q.add(i, i as f64);
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            q.foreach(f64::MAX, |_, i| seen.push(i));
        }
        producer.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
