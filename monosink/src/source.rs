//! Upstream sample source
//!
//! [`SinkStream`] is what the sink needs from the stream it is bound to: a
//! stereo output endpoint and a sample-rate setting. [`ToneSource`] is a
//! paced sine generator implementing it, used by the binary and in tests.

use crate::dsp::stream::{lock, Stream};
use crate::dsp::types::StereoFrame;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Upstream stream a sink is bound to.
pub trait SinkStream: Send + Sync {
    /// Rate at which the upstream should produce samples.
    fn set_sample_rate(&self, sample_rate: f64);

    /// Stereo output endpoint read by the sink's pipeline.
    fn output(&self) -> Arc<Stream<StereoFrame>>;
}

/// Paced stereo sine generator.
pub struct ToneSource {
    output: Arc<Stream<StereoFrame>>,
    frequency: f32,
    amplitude: f32,
    /// Sample rate as f64 bits
    sample_rate: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ToneSource {
    /// `block_frames` is the size of each block written to the output.
    pub fn new(frequency: f32, block_frames: usize) -> Self {
        Self {
            output: Arc::new(Stream::new(block_frames)),
            frequency,
            amplitude: 0.25,
            sample_rate: Arc::new(AtomicU64::new(48_000f64.to_bits())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    /// Start generating. No-op if already running.
    pub fn start(&self) -> Result<()> {
        let mut handle = lock(&self.handle);
        if handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::Release);
        let output = Arc::clone(&self.output);
        let running = Arc::clone(&self.running);
        let sample_rate = Arc::clone(&self.sample_rate);
        let frequency = self.frequency;
        let amplitude = self.amplitude;

        *handle = Some(
            thread::Builder::new()
                .name("tone".to_string())
                .spawn(move || generate(output, running, sample_rate, frequency, amplitude))?,
        );

        info!("Tone source started at {} Hz", self.frequency);
        Ok(())
    }

    /// Stop generating and join the thread. No-op if not running.
    pub fn stop(&self) {
        let Some(handle) = lock(&self.handle).take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        self.output.stop_writer();
        let _ = handle.join();
        self.output.clear_write_stop();
        debug!("Tone source stopped");
    }
}

impl SinkStream for ToneSource {
    fn set_sample_rate(&self, sample_rate: f64) {
        debug!("Tone source sample rate set to {}", sample_rate);
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    fn output(&self) -> Arc<Stream<StereoFrame>> {
        Arc::clone(&self.output)
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn generate(
    output: Arc<Stream<StereoFrame>>,
    running: Arc<AtomicBool>,
    sample_rate: Arc<AtomicU64>,
    frequency: f32,
    amplitude: f32,
) {
    let frames = output.capacity();
    let mut phase = 0.0f32;
    let mut deadline = Instant::now();

    while running.load(Ordering::Acquire) {
        let rate = f64::from_bits(sample_rate.load(Ordering::Relaxed)).max(1.0);
        let step = std::f32::consts::TAU * frequency / rate as f32;

        let written = output.write_with(|buf| {
            for frame in buf.iter_mut() {
                let sample = phase.sin() * amplitude;
                *frame = StereoFrame::from_stereo(sample, sample);
                phase = (phase + step) % std::f32::consts::TAU;
            }
            buf.len()
        });
        if !written {
            break;
        }

        // Pace to real time
        deadline += Duration::from_secs_f64(frames as f64 / rate);
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }
}
