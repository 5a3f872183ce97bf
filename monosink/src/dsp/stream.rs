//! Block stream between pipeline stages
//!
//! A bounded single-producer single-consumer channel that hands over one
//! block at a time. The producer fills a private write buffer and publishes it
//! with [`Stream::swap`]; the consumer borrows the published block through
//! [`Stream::read`] and releases it with [`ReadBlock::flush`].
//!
//! ## Design
//!
//! ```text
//! producer ── write_buf ──swap()──► read_buf ── read() ──► consumer
//!                 ▲                                           │
//!                 └──────────── flush() (backpressure) ◄──────┘
//! ```
//!
//! At most one block is in flight. `swap()` blocks until the previous block
//! has been flushed, so the producer can never overwrite storage the consumer
//! is still copying out.
//!
//! ## Thread Safety
//!
//! - `write_buf` is only touched by the producer
//! - `read_buf` is only touched by the consumer while `data_ready` is set,
//!   and only by the producer (inside `swap`) while it is clear
//! - `state` carries the handover flags; both condvars wait on it

use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StreamState {
    /// A published block is waiting to be flushed
    data_ready: bool,

    /// Number of valid samples in `read_buf`
    read_len: usize,

    /// Consumer side interrupted (read returns None)
    reader_stop: bool,

    /// Producer side interrupted (swap returns false)
    writer_stop: bool,

    /// Producer reached end of stream
    closed: bool,
}

/// Bounded block channel between two pipeline stages.
pub struct Stream<T> {
    capacity: usize,
    write_buf: Mutex<Vec<T>>,
    read_buf: Mutex<Vec<T>>,
    state: Mutex<StreamState>,
    readable: Condvar,
    swappable: Condvar,
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Stream")
            .field("capacity", &self.capacity)
            .field("data_ready", &state.data_ready)
            .field("read_len", &state.read_len)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: Copy + Default> Stream<T> {
    /// Create a stream whose blocks hold at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            write_buf: Mutex::new(vec![T::default(); capacity]),
            read_buf: Mutex::new(vec![T::default(); capacity]),
            state: Mutex::new(StreamState::default()),
            readable: Condvar::new(),
            swappable: Condvar::new(),
        }
    }

    /// Maximum samples per block
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer scratch buffer (always `capacity` samples long).
    ///
    /// The guard must be dropped before calling [`Stream::swap`].
    pub fn write_buf(&self) -> MutexGuard<'_, Vec<T>> {
        lock(&self.write_buf)
    }

    /// Publish the first `count` samples of the write buffer.
    ///
    /// Blocks until the previously published block has been flushed.
    /// Returns false if the writer was stopped while waiting.
    pub fn swap(&self, count: usize) -> bool {
        let mut state = lock(&self.state);
        while state.data_ready && !state.writer_stop {
            state = self
                .swappable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.writer_stop {
            return false;
        }

        {
            let mut write = lock(&self.write_buf);
            let mut read = lock(&self.read_buf);
            std::mem::swap(&mut *write, &mut *read);
        }

        state.read_len = count.min(self.capacity);
        state.data_ready = true;
        drop(state);
        self.readable.notify_all();
        true
    }

    /// Fill the write buffer through `fill` and publish the count it returns.
    pub fn write_with<F>(&self, fill: F) -> bool
    where
        F: FnOnce(&mut [T]) -> usize,
    {
        let count = {
            let mut buf = self.write_buf();
            fill(&mut buf[..])
        };
        self.swap(count)
    }

    /// Copy `samples` into the stream, one block per `capacity` samples.
    ///
    /// Blocks for each block after the first until the consumer flushed the
    /// previous one. Returns false if the writer was stopped part way.
    pub fn write(&self, samples: &[T]) -> bool {
        for chunk in samples.chunks(self.capacity) {
            let published = self.write_with(|buf| {
                buf[..chunk.len()].copy_from_slice(chunk);
                chunk.len()
            });
            if !published {
                return false;
            }
        }
        true
    }

    /// Block until a published block is readable.
    ///
    /// Returns None if the reader was stopped, or if the producer closed the
    /// stream and no block is pending.
    pub fn read(&self) -> Option<ReadBlock<'_, T>> {
        let len = {
            let mut state = lock(&self.state);
            loop {
                if state.reader_stop {
                    return None;
                }
                if state.data_ready {
                    break state.read_len;
                }
                if state.closed {
                    return None;
                }
                state = self
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        Some(ReadBlock {
            buf: lock(&self.read_buf),
            len,
            stream: self,
        })
    }
}

impl<T> Stream<T> {
    fn acknowledge(&self) {
        let mut state = lock(&self.state);
        state.data_ready = false;
        state.read_len = 0;
        drop(state);
        self.swappable.notify_all();
    }

    /// Mark end of stream. Pending data stays readable.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.readable.notify_all();
    }

    /// True once the producer closed the stream
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// True while a published block waits to be flushed
    pub fn is_pending(&self) -> bool {
        lock(&self.state).data_ready
    }

    /// Wake a blocked reader; reads return None until cleared.
    pub fn stop_reader(&self) {
        lock(&self.state).reader_stop = true;
        self.readable.notify_all();
    }

    pub fn clear_read_stop(&self) {
        lock(&self.state).reader_stop = false;
    }

    /// Wake a blocked writer; swaps fail until cleared.
    pub fn stop_writer(&self) {
        lock(&self.state).writer_stop = true;
        self.swappable.notify_all();
    }

    pub fn clear_write_stop(&self) {
        lock(&self.state).writer_stop = false;
    }

    /// Drop any pending block and reopen a closed stream.
    ///
    /// Only call while neither side is active.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.data_ready = false;
        state.read_len = 0;
        state.closed = false;
        drop(state);
        self.swappable.notify_all();
    }
}

/// A published block borrowed by the consumer.
///
/// Dropping it without [`ReadBlock::flush`] leaves the block pending; the
/// next `read()` returns the same samples.
pub struct ReadBlock<'a, T> {
    buf: MutexGuard<'a, Vec<T>>,
    len: usize,
    stream: &'a Stream<T>,
}

impl<T> ReadBlock<'_, T> {
    /// Acknowledge consumption and let the producer publish the next block.
    pub fn flush(self) {
        let ReadBlock { buf, stream, .. } = self;
        drop(buf);
        stream.acknowledge();
    }
}

impl<T> Deref for ReadBlock<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.buf[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_then_read() {
        let stream = Stream::<f32>::new(4);
        assert!(stream.write(&[0.1, 0.2, 0.3]));

        let block = stream.read().unwrap();
        assert_eq!(&*block, &[0.1, 0.2, 0.3]);
        block.flush();

        assert!(!stream.is_pending());
    }

    #[test]
    fn test_unflushed_block_is_read_again() {
        let stream = Stream::<f32>::new(2);
        stream.write(&[1.0, 2.0]);

        let block = stream.read().unwrap();
        assert_eq!(block.len(), 2);
        drop(block);

        assert!(stream.is_pending());
        let block = stream.read().unwrap();
        assert_eq!(&*block, &[1.0, 2.0]);
        block.flush();
    }

    #[test]
    fn test_write_splits_into_blocks() {
        let stream = Arc::new(Stream::<f32>::new(2));

        let producer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.write(&[1.0, 2.0, 3.0]))
        };

        let block = stream.read().unwrap();
        assert_eq!(&*block, &[1.0, 2.0]);
        block.flush();

        let block = stream.read().unwrap();
        assert_eq!(&*block, &[3.0]);
        block.flush();

        assert!(producer.join().unwrap());
    }

    #[test]
    fn test_write_stopped_mid_input() {
        let stream = Arc::new(Stream::<f32>::new(2));

        let producer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.write(&[1.0, 2.0, 3.0, 4.0]))
        };

        // First block published, second waits for a flush that never comes
        assert!(wait_pending(&stream));
        thread::sleep(Duration::from_millis(20));
        stream.stop_writer();

        assert!(!producer.join().unwrap());
        let block = stream.read().unwrap();
        assert_eq!(&*block, &[1.0, 2.0]);
    }

    fn wait_pending(stream: &Stream<f32>) -> bool {
        for _ in 0..1000 {
            if stream.is_pending() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_swap_waits_for_flush() {
        let stream = Arc::new(Stream::<f32>::new(1));
        stream.write(&[1.0]);

        let producer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.write(&[2.0]))
        };

        // Second block cannot be published until the first is flushed
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        let block = stream.read().unwrap();
        assert_eq!(&*block, &[1.0]);
        block.flush();

        assert!(producer.join().unwrap());
        let block = stream.read().unwrap();
        assert_eq!(&*block, &[2.0]);
        block.flush();
    }

    #[test]
    fn test_close_drains_pending_then_ends() {
        let stream = Stream::<f32>::new(2);
        stream.write(&[0.5]);
        stream.close();

        let block = stream.read().unwrap();
        assert_eq!(&*block, &[0.5]);
        block.flush();

        assert!(stream.read().is_none());
        assert!(stream.is_closed());
    }

    #[test]
    fn test_stop_reader_unblocks_read() {
        let stream = Arc::new(Stream::<f32>::new(2));

        let reader = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.read().map(|b| b.len()))
        };

        thread::sleep(Duration::from_millis(20));
        stream.stop_reader();
        assert_eq!(reader.join().unwrap(), None);

        stream.clear_read_stop();
        stream.write(&[1.0]);
        assert_eq!(stream.read().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_stop_writer_unblocks_swap() {
        let stream = Arc::new(Stream::<f32>::new(1));
        stream.write(&[1.0]);

        let writer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || stream.write(&[2.0]))
        };

        thread::sleep(Duration::from_millis(20));
        stream.stop_writer();
        assert!(!writer.join().unwrap());
    }

    #[test]
    fn test_reset_discards_pending_and_reopens() {
        let stream = Stream::<f32>::new(2);
        stream.write(&[1.0]);
        stream.close();

        stream.reset();
        assert!(!stream.is_pending());
        assert!(!stream.is_closed());

        stream.write(&[3.0]);
        let block = stream.read().unwrap();
        assert_eq!(&*block, &[3.0]);
        block.flush();
    }
}
