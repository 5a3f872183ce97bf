//! Sink instance and connection lifecycle
//!
//! A [`Sink`] binds one upstream stream to the audio server. It owns the
//! pipeline, the connection and the play-state handler registration.
//!
//! ## States
//!
//! ```text
//!                 start() / play(true)
//!   Disconnected ─────────────────────► ConnectedIdle
//!        ▲                                   │ play(true)
//!        │ stop() / play(false)              ▼
//!        └───────────────────────────── ConnectedPlaying
//! ```
//!
//! | event        | Disconnected               | ConnectedIdle   | ConnectedPlaying |
//! |--------------|----------------------------|-----------------|------------------|
//! | start()      | setup → Idle (or stays)    | no-op           | no-op            |
//! | stop()       | no-op                      | teardown        | teardown         |
//! | play(true)   | setup, dispatch → Playing  | dispatch        | no-op            |
//! | play(false)  | no-op                      | teardown        | teardown         |
//!
//! Setup failures roll back to Disconnected. Teardown interrupts the pull
//! endpoint first so a callback blocked on it returns, stops dispatch,
//! destroys stream and loop, then stops the pipeline.

use crate::bridge::{BlockSource, BridgeStats, BridgeStatsSnapshot, CallbackBridge};
use crate::config::SinkConfig;
use crate::dsp::stream::lock;
use crate::error::{Error, Result};
use crate::events::{HandlerId, PlayStateEvents};
use crate::pipeline::Pipeline;
use crate::server::{AudioServer, Connection, StreamFormat, StreamProperties};
use crate::source::SinkStream;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Disconnected,
    ConnectedIdle,
    ConnectedPlaying,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Disconnected => write!(f, "disconnected"),
            LifecycleState::ConnectedIdle => write!(f, "connected-idle"),
            LifecycleState::ConnectedPlaying => write!(f, "connected-playing"),
        }
    }
}

struct Lifecycle<S: AudioServer> {
    server: S,
    pipeline: Pipeline,
    connection: Option<Connection<S::Loop>>,
    bridge: CallbackBridge,
    properties: StreamProperties,
    format: StreamFormat,

    /// Last play state delivered by the UI
    playing: bool,

    /// Set once the sink is being destroyed; late notifications are ignored
    retired: bool,
}

impl<S: AudioServer> Lifecycle<S> {
    fn state(&self) -> LifecycleState {
        match &self.connection {
            None => LifecycleState::Disconnected,
            Some(conn) if conn.is_dispatching() => LifecycleState::ConnectedPlaying,
            Some(_) => LifecycleState::ConnectedIdle,
        }
    }

    /// Disconnected → ConnectedIdle. No-op when already connected.
    fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let connection = Connection::open(
            &mut self.server,
            &self.properties,
            &self.format,
            self.bridge.clone(),
        )?;

        if let Err(e) = self.pipeline.start() {
            error!("Failed to start pipeline: {}", e);
            connection.close();
            return Err(Error::Setup(format!("Pipeline failed to start: {}", e)));
        }

        self.connection = Some(connection);
        info!("Sink '{}' connected", self.properties.name);
        Ok(())
    }

    /// ConnectedIdle → ConnectedPlaying. No-op when already dispatching.
    fn begin_dispatch(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::Setup("No live connection".to_string()));
        };
        if connection.is_dispatching() {
            return Ok(());
        }

        if let Err(e) = connection.start_dispatch() {
            error!("Failed to start event loop: {}", e);
            self.teardown();
            return Err(e);
        }
        info!("Sink '{}' playing", self.properties.name);
        Ok(())
    }

    /// Any state → Disconnected. Safe to call when nothing is connected.
    fn teardown(&mut self) {
        debug!("Sink '{}' teardown", self.properties.name);

        self.pipeline.interrupt();
        match self.connection.take() {
            Some(connection) => {
                connection.close();
                info!("Sink '{}' disconnected", self.properties.name);
            }
            None => debug!("Teardown: no live connection"),
        }
        self.pipeline.stop();
    }

    fn start(&mut self) -> Result<()> {
        if self.retired {
            return Err(Error::Setup("Sink is shutting down".to_string()));
        }
        if self.connection.is_some() {
            debug!("Sink '{}' already started", self.properties.name);
            return Ok(());
        }

        self.connect()?;
        if self.playing {
            self.begin_dispatch()?;
        }
        Ok(())
    }

    fn on_play_state(&mut self, playing: bool) {
        debug!("Play state changed: playing = {}", playing);
        if self.retired {
            return;
        }
        self.playing = playing;

        if !playing {
            self.teardown();
            return;
        }

        if let Err(e) = self.connect() {
            error!("Sink '{}' failed to connect on play: {}", self.properties.name, e);
            return;
        }
        if let Err(e) = self.begin_dispatch() {
            error!("Sink '{}' failed to begin playback: {}", self.properties.name, e);
        }
    }
}

/// One audio destination bound to one upstream stream.
pub struct Sink<S: AudioServer> {
    name: String,
    inner: Arc<Mutex<Lifecycle<S>>>,
    events: Arc<PlayStateEvents>,
    handler: HandlerId,
    stats: Arc<BridgeStats>,
}

impl<S: AudioServer> Sink<S> {
    /// Create a sink for `stream`, initially Disconnected.
    ///
    /// Sets the upstream sample rate to the negotiated rate and binds the
    /// play-state handler for the lifetime of the sink.
    pub fn new(
        stream: &dyn SinkStream,
        stream_name: impl Into<String>,
        server: S,
        events: Arc<PlayStateEvents>,
        config: &SinkConfig,
    ) -> Self {
        let name = stream_name.into();
        let format = StreamFormat::MONO_F32_48K;
        let properties = config.stream_properties();
        debug!("Creating sink for stream '{}'", name);

        let pipeline = Pipeline::new(stream.output(), properties.block_size);
        stream.set_sample_rate(format.sample_rate as f64);

        let stats = Arc::new(BridgeStats::default());
        let source: Arc<dyn BlockSource> = pipeline.output();
        let bridge = CallbackBridge::new(source, &format, Arc::clone(&stats));

        let inner = Arc::new(Mutex::new(Lifecycle {
            server,
            pipeline,
            connection: None,
            bridge,
            properties,
            format,
            playing: false,
            retired: false,
        }));

        let weak = Arc::downgrade(&inner);
        let handler = events.bind_handler(move |playing| {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).on_play_state(playing);
            }
        });

        Self {
            name,
            inner,
            events,
            handler,
            stats,
        }
    }

    /// Name of the upstream stream this sink is bound to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect to the audio server and start the pipeline.
    ///
    /// No-op if already connected. On failure every partially acquired
    /// resource is released and the sink stays Disconnected.
    pub fn start(&self) -> Result<()> {
        debug!("Sink '{}' start", self.name);
        lock(&self.inner).start()
    }

    /// Stop the pipeline and tear the connection down. No-op if Disconnected.
    pub fn stop(&self) {
        debug!("Sink '{}' stop", self.name);
        lock(&self.inner).teardown();
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.inner).state()
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }
}

impl<S: AudioServer> Drop for Sink<S> {
    fn drop(&mut self) {
        debug!("Destroying sink '{}'", self.name);
        {
            let mut inner = lock(&self.inner);
            inner.retired = true;
            inner.teardown();
        }
        self.events.unbind_handler(self.handler);
    }
}
