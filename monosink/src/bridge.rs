//! Realtime callback bridge
//!
//! Answers the audio server's buffer requests on the server's realtime
//! thread. Each invocation:
//!
//! 1. dequeues a free server buffer (skips the request if none is free)
//! 2. pulls one block from the injected [`BlockSource`] (may block until the
//!    upstream produces data)
//! 3. copies as many pulled samples as the buffer holds
//! 4. flushes the whole pulled block, copied or not
//! 5. fills the chunk header (offset 0, frame stride, copied size)
//! 6. queues the buffer back to the server
//!
//! The path is allocation-free; statistics are plain atomics.

use crate::dsp::stream::{ReadBlock, Stream};
use crate::server::{StreamFormat, SAMPLE_BYTES};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Source of fixed-size mono blocks for the realtime side.
pub trait BlockSource: Send + Sync {
    /// Block until a block is readable. None means the source was stopped or
    /// reached end of stream. The block must be flushed to acknowledge it.
    fn pull(&self) -> Option<ReadBlock<'_, f32>>;
}

impl BlockSource for Stream<f32> {
    fn pull(&self) -> Option<ReadBlock<'_, f32>> {
        self.read()
    }
}

/// Valid region of a server buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of the first valid sample
    pub offset: usize,
    /// Bytes per frame
    pub stride: usize,
    /// Valid bytes
    pub size: usize,
}

/// One buffer borrowed from the server's pool.
#[derive(Debug)]
pub struct ServerBuffer<'a> {
    data: Option<&'a mut [f32]>,
    chunk: Chunk,
}

impl<'a> ServerBuffer<'a> {
    /// Buffer mapped onto `data`
    pub fn new(data: &'a mut [f32]) -> Self {
        Self {
            data: Some(data),
            chunk: Chunk::default(),
        }
    }

    /// Buffer without mapped memory
    pub fn unmapped() -> Self {
        Self {
            data: None,
            chunk: Chunk::default(),
        }
    }

    /// Capacity in bytes
    pub fn max_size(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len() * SAMPLE_BYTES)
    }

    pub fn chunk(&self) -> Chunk {
        self.chunk
    }

    pub fn into_parts(self) -> (Option<&'a mut [f32]>, Chunk) {
        (self.data, self.chunk)
    }
}

/// The server's buffer pool as seen from one callback.
pub trait BufferQueue<'a> {
    /// Take a free buffer, or None if the pool is exhausted.
    fn dequeue_buffer(&mut self) -> Option<ServerBuffer<'a>>;

    /// Hand a filled buffer back to the server.
    fn queue_buffer(&mut self, buffer: ServerBuffer<'a>);
}

/// A queue holding a single buffer borrowed for the duration of a callback.
///
/// Used by pull-style backends that pass one output slice per callback.
pub struct SliceQueue<'a> {
    free: Option<&'a mut [f32]>,
    queued: Option<(&'a mut [f32], Chunk)>,
}

impl<'a> SliceQueue<'a> {
    pub fn new(data: &'a mut [f32]) -> Self {
        Self {
            free: Some(data),
            queued: None,
        }
    }

    /// Silence everything past the queued chunk and return the chunk.
    ///
    /// If nothing was queued the whole slice is silenced.
    pub fn finish(self) -> Option<Chunk> {
        match (self.queued, self.free) {
            (Some((data, chunk)), _) => {
                let valid = (chunk.size / SAMPLE_BYTES).min(data.len());
                data[valid..].fill(0.0);
                Some(chunk)
            }
            (None, Some(data)) => {
                data.fill(0.0);
                None
            }
            (None, None) => None,
        }
    }
}

impl<'a> BufferQueue<'a> for SliceQueue<'a> {
    fn dequeue_buffer(&mut self) -> Option<ServerBuffer<'a>> {
        self.free.take().map(ServerBuffer::new)
    }

    fn queue_buffer(&mut self, buffer: ServerBuffer<'a>) {
        if let (Some(data), chunk) = buffer.into_parts() {
            self.queued = Some((data, chunk));
        }
    }
}

/// Result of one callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No free server buffer; nothing was pulled
    NoBuffer,
    /// The buffer had no mapped memory; queued back empty
    Unmapped,
    /// The block source was stopped or ended; queued back empty
    EndOfStream,
    /// A block was pulled, copied (possibly truncated) and flushed
    Delivered {
        /// Samples pulled and flushed
        pulled: usize,
        /// Bytes copied into the server buffer
        copied_bytes: usize,
    },
}

/// Counters updated by the realtime callback
#[derive(Debug, Default)]
pub struct BridgeStats {
    callbacks: AtomicU64,
    delivered: AtomicU64,
    out_of_buffers: AtomicU64,
    truncated: AtomicU64,
    end_of_stream: AtomicU64,
}

/// Snapshot of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub callbacks: u64,
    pub delivered: u64,
    pub out_of_buffers: u64,
    pub truncated: u64,
    pub end_of_stream: u64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            out_of_buffers: self.out_of_buffers.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            end_of_stream: self.end_of_stream.load(Ordering::Relaxed),
        }
    }
}

/// Buffer-request handler bound to a stream object.
#[derive(Clone)]
pub struct CallbackBridge {
    source: Arc<dyn BlockSource>,
    stride: usize,
    stats: Arc<BridgeStats>,
}

impl CallbackBridge {
    pub fn new(source: Arc<dyn BlockSource>, format: &StreamFormat, stats: Arc<BridgeStats>) -> Self {
        Self {
            source,
            stride: format.stride(),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    /// Answer one buffer request.
    pub fn process<'a, Q: BufferQueue<'a>>(&self, queue: &mut Q) -> ProcessOutcome {
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);

        let Some(mut buffer) = queue.dequeue_buffer() else {
            let count = self.stats.out_of_buffers.fetch_add(1, Ordering::Relaxed) + 1;
            if count == 1 || count % 1000 == 0 {
                warn!("Audio server out of buffers (total: {})", count);
            }
            return ProcessOutcome::NoBuffer;
        };

        let empty = Chunk {
            offset: 0,
            stride: self.stride,
            size: 0,
        };

        let Some(dst) = buffer.data.as_deref_mut() else {
            buffer.chunk = empty;
            queue.queue_buffer(buffer);
            return ProcessOutcome::Unmapped;
        };

        let Some(block) = self.source.pull() else {
            self.stats.end_of_stream.fetch_add(1, Ordering::Relaxed);
            buffer.chunk = empty;
            queue.queue_buffer(buffer);
            return ProcessOutcome::EndOfStream;
        };

        let pulled = block.len();
        let copied_samples = pulled.min(dst.len());
        let copied_bytes = copied_samples * SAMPLE_BYTES;
        dst[..copied_samples].copy_from_slice(&block[..copied_samples]);
        block.flush();

        if copied_samples < pulled {
            self.stats.truncated.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.delivered.fetch_add(1, Ordering::Relaxed);

        buffer.chunk = Chunk {
            offset: 0,
            stride: self.stride,
            size: copied_bytes,
        };
        queue.queue_buffer(buffer);

        ProcessOutcome::Delivered {
            pulled,
            copied_bytes,
        }
    }
}
