//! Audio server transport
//!
//! The sink talks to the audio server through three collaborators:
//!
//! - [`AudioServer`] hands out event loops
//! - [`EventLoop`] creates and connects stream objects and dispatches their
//!   buffer-request callbacks on its own realtime thread while started
//! - [`crate::bridge::BufferQueue`] is the per-callback view of the stream's
//!   buffer pool
//!
//! Dropping an event loop destroys it. Streams must be handed back through
//! [`EventLoop::destroy_stream`] before the loop is dropped.

pub mod connection;
pub mod cpal_backend;

pub use connection::Connection;
pub use cpal_backend::CpalServer;

use crate::bridge::CallbackBridge;
use crate::error::Result;

/// Bytes per sample of the negotiated format
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Sample encodings the sink can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    /// Mono, 32-bit float, 48 kHz
    pub const MONO_F32_48K: StreamFormat = StreamFormat {
        sample_format: SampleFormat::F32,
        sample_rate: 48_000,
        channels: 1,
    };

    /// Bytes per frame
    pub fn stride(&self) -> usize {
        SAMPLE_BYTES * self.channels as usize
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {} Hz, {} channel(s)",
            self.sample_format, self.sample_rate, self.channels
        )
    }
}

/// Connection flags requested when the stream is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFlags {
    /// Let the server route the stream to an output
    pub autoconnect: bool,
    /// Buffers are mapped into the process (zero-copy)
    pub map_buffers: bool,
    /// Callbacks run on the realtime thread
    pub rt_process: bool,
}

impl Default for StreamFlags {
    fn default() -> Self {
        Self {
            autoconnect: true,
            map_buffers: true,
            rt_process: true,
        }
    }
}

/// Properties attached to the stream object at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProperties {
    /// Node/application name shown by the server
    pub name: String,
    pub media_type: String,
    pub media_category: String,
    pub media_role: String,
    /// Output device (None = server default)
    pub device: Option<String>,
    /// Frames per buffer request
    pub block_size: usize,
    pub flags: StreamFlags,
}

impl StreamProperties {
    /// Audio playback stream with the given node name and media role
    pub fn playback(name: impl Into<String>, media_role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: "Audio".to_string(),
            media_category: "Playback".to_string(),
            media_role: media_role.into(),
            device: None,
            block_size: crate::pipeline::DEFAULT_BLOCK_SIZE,
            flags: StreamFlags::default(),
        }
    }
}

/// Entry point to an audio server.
pub trait AudioServer: Send + 'static {
    type Loop: EventLoop;

    /// Acquire a new event loop.
    fn create_loop(&mut self, name: &str) -> Result<Self::Loop>;
}

/// An event loop owning the server's realtime dispatch thread.
pub trait EventLoop: Send + 'static {
    type Stream: Send + 'static;

    /// Create a stream object whose buffer requests are answered by `bridge`.
    fn create_stream(
        &mut self,
        properties: &StreamProperties,
        bridge: CallbackBridge,
    ) -> Result<Self::Stream>;

    /// Negotiate `format` and connect the stream as an output.
    fn connect(&mut self, stream: &mut Self::Stream, format: &StreamFormat) -> Result<()>;

    /// Begin dispatching callbacks.
    fn start(&mut self) -> Result<()>;

    /// Stop dispatching callbacks. Returns once no callback is running.
    fn stop(&mut self);

    /// Disconnect and destroy a stream created by this loop.
    fn destroy_stream(&mut self, stream: Self::Stream);
}
