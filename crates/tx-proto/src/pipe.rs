//! In-process byte pipe on top of a lock-free SPSC ring.
//!
//! Reads and writes block while the ring is empty or full. Reads may return
//! fewer bytes than asked for, exactly like an OS pipe; callers that need
//! whole messages go through [`crate::FrameReader`].

use crossbeam::utils::Backoff;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default ring size for channel pipes.
pub const PIPE_CAPACITY: usize = 16 * 1024;

/// Sleep used once spinning and yielding have not produced progress.
const PARK_INTERVAL: Duration = Duration::from_micros(200);

#[derive(Default)]
struct Shared {
    closed: AtomicBool,
}

/// Writing end of a [`pipe`].
pub struct PipeWriter {
    producer: HeapProd<u8>,
    shared: Arc<Shared>,
}

/// Reading end of a [`pipe`].
pub struct PipeReader {
    consumer: HeapCons<u8>,
    shared: Arc<Shared>,
}

/// Create a connected writer/reader pair backed by a ring of `capacity` bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let rb = HeapRb::<u8>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let shared = Arc::new(Shared::default());
    (
        PipeWriter { producer, shared: shared.clone() },
        PipeReader { consumer, shared },
    )
}

fn wait(backoff: &Backoff) {
    if backoff.is_completed() {
        std::thread::sleep(PARK_INTERVAL);
    } else {
        backoff.snooze();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let backoff = Backoff::new();
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"));
            }
            let written = self.producer.push_slice(buf);
            if written > 0 {
                return Ok(written);
            }
            wait(&backoff);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let backoff = Backoff::new();
        loop {
            let n = self.consumer.pop_slice(buf);
            if n > 0 {
                return Ok(n);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // The writer may have pushed its last bytes just before closing.
                return Ok(self.consumer.pop_slice(buf));
            }
            wait(&backoff);
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}
