//! # monosink
//!
//! Mono playback sink for an audio server.
//!
//! **Purpose:** Take a stereo float stream, downmix it to mono, repack it into
//! fixed-size blocks and hand them to the audio server from its realtime
//! buffer-request callback.
//!
//! **Architecture:** two worker threads (downmix, pack) connected by
//! one-block handoff streams, a callback bridge on the server's realtime
//! thread, and a lifecycle state machine driven by play/pause notifications.

pub mod bridge;
pub mod config;
pub mod dsp;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod server;
pub mod sink;
pub mod source;

pub use error::{Error, Result};
pub use sink::{LifecycleState, Sink};
