//! Live connection to the audio server
//!
//! A [`Connection`] owns an event loop together with the stream object
//! created on it. Either both exist or neither does: `open()` releases any
//! partially acquired resource before reporting an error, and dropping the
//! connection tears both down in reverse order of acquisition.

use crate::bridge::CallbackBridge;
use crate::error::Result;
use crate::server::{AudioServer, EventLoop, StreamFormat, StreamProperties};
use tracing::{debug, error, info};

/// Event loop + stream pair.
pub struct Connection<L: EventLoop> {
    event_loop: L,
    stream: Option<L::Stream>,
    dispatching: bool,
}

impl<L: EventLoop> Connection<L> {
    /// Acquire an event loop, create the stream, negotiate the format.
    ///
    /// On failure at any step the resources acquired so far are released.
    pub fn open<S>(
        server: &mut S,
        properties: &StreamProperties,
        format: &StreamFormat,
        bridge: CallbackBridge,
    ) -> Result<Self>
    where
        S: AudioServer<Loop = L>,
    {
        debug!("Opening connection '{}'", properties.name);

        let mut event_loop = server.create_loop(&properties.name).map_err(|e| {
            error!("Failed to create event loop: {}", e);
            e
        })?;

        let mut stream = match event_loop.create_stream(properties, bridge) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to create stream: {}", e);
                drop(event_loop);
                return Err(e);
            }
        };
        debug!("Stream created");

        if let Err(e) = event_loop.connect(&mut stream, format) {
            error!("Failed to connect stream ({}): {}", format, e);
            event_loop.destroy_stream(stream);
            drop(event_loop);
            return Err(e);
        }

        info!("Connected stream '{}' as {}", properties.name, format);
        Ok(Self {
            event_loop,
            stream: Some(stream),
            dispatching: false,
        })
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Begin dispatching buffer requests. No-op if already dispatching.
    pub fn start_dispatch(&mut self) -> Result<()> {
        if self.dispatching {
            return Ok(());
        }
        self.event_loop.start()?;
        self.dispatching = true;
        debug!("Event loop dispatching");
        Ok(())
    }

    /// Tear the connection down: stop dispatch, destroy stream, destroy loop.
    pub fn close(self) {
        drop(self);
    }
}

impl<L: EventLoop> Drop for Connection<L> {
    fn drop(&mut self) {
        if self.dispatching {
            self.event_loop.stop();
            self.dispatching = false;
        }
        if let Some(stream) = self.stream.take() {
            self.event_loop.destroy_stream(stream);
        }
        debug!("Connection closed");
    }
}
