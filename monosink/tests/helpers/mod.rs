//! Test helper modules for monosink integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockServer: in-process audio server with failure injection and
//!   resource accounting
//! - TestStream: manually fed upstream stream
//! - wait_until: polling helper for cross-thread conditions

pub mod mock_server;

pub use mock_server::{FailAt, MockServer, ServerProbe};

use monosink::dsp::{StereoFrame, Stream};
use monosink::source::SinkStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Upstream stream fed by the test itself
pub struct TestStream {
    output: Arc<Stream<StereoFrame>>,
    sample_rate: Mutex<Option<f64>>,
}

impl TestStream {
    pub fn new(block_frames: usize) -> Self {
        Self {
            output: Arc::new(Stream::new(block_frames)),
            sample_rate: Mutex::new(None),
        }
    }

    /// Rate requested by the sink, if any
    pub fn sample_rate(&self) -> Option<f64> {
        *self.sample_rate.lock().unwrap()
    }

    /// Spawn a producer writing `blocks` blocks of constant stereo frames.
    pub fn feed(&self, blocks: usize, frame: StereoFrame) -> std::thread::JoinHandle<()> {
        let output = Arc::clone(&self.output);
        std::thread::spawn(move || {
            let block = vec![frame; output.capacity()];
            for _ in 0..blocks {
                assert!(output.write(&block));
            }
        })
    }
}

impl SinkStream for TestStream {
    fn set_sample_rate(&self, sample_rate: f64) {
        *self.sample_rate.lock().unwrap() = Some(sample_rate);
    }

    fn output(&self) -> Arc<Stream<StereoFrame>> {
        Arc::clone(&self.output)
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
