//! Pipeline assembly
//!
//! Wires the upstream stereo stream through the downmixer into the packer:
//!
//! ```text
//! source (stereo) → Downmixer → mono → Packer → output (blocks of N mono samples)
//! ```
//!
//! The packer output is the single pull endpoint handed to the realtime
//! callback bridge.

use crate::dsp::downmix::Downmixer;
use crate::dsp::packer::Packer;
use crate::dsp::stream::Stream;
use crate::dsp::types::StereoFrame;
use crate::dsp::worker::{Stage, Worker};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Default block size in mono frames
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Downmix + pack chain with idempotent start/stop.
pub struct Pipeline {
    downmix: Worker<Downmixer>,
    pack: Worker<Packer<f32>>,
    mono: Arc<Stream<f32>>,
    output: Arc<Stream<f32>>,
    block_size: usize,
}

impl Pipeline {
    /// Build the chain. `block_size` is fixed for the lifetime of the pipeline.
    pub fn new(source: Arc<Stream<StereoFrame>>, block_size: usize) -> Self {
        let downmixer = Downmixer::new(source);
        let mono = Arc::clone(downmixer.output());
        let packer = Packer::new(Arc::clone(&mono), block_size);
        let output = Arc::clone(packer.output());
        let block_size = packer.block_size();

        debug!("Pipeline created with block size {} frames", block_size);

        Self {
            downmix: Worker::new(downmixer),
            pack: Worker::new(packer),
            mono,
            output,
            block_size,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_running(&self) -> bool {
        self.pack.is_running()
    }

    /// Pull endpoint yielding blocks of `block_size` mono samples.
    pub fn output(&self) -> Arc<Stream<f32>> {
        Arc::clone(&self.output)
    }

    /// Start both stage workers. No-op if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("Pipeline already running");
            return Ok(());
        }

        self.pack.start()?;
        if let Err(e) = self.downmix.start() {
            self.pack.stop();
            return Err(e);
        }

        info!("Pipeline started");
        Ok(())
    }

    /// Wake a consumer blocked on the output endpoint.
    ///
    /// Reads return None until the next `stop()`.
    pub fn interrupt(&self) {
        self.output.stop_reader();
    }

    /// Stop both workers and discard partial data. No-op if already stopped.
    pub fn stop(&mut self) {
        self.output.clear_read_stop();

        if !self.is_running() {
            debug!("Pipeline not running");
            return;
        }

        self.downmix.stop();
        self.pack.stop();
        self.mono.reset();
        self.output.reset();

        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_idempotent() {
        let source = Arc::new(Stream::new(256));
        let mut pipeline = Pipeline::new(source, 128);

        assert!(!pipeline.is_running());
        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());

        pipeline.stop();
        pipeline.stop();
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_blocks_flow_through() {
        let source = Arc::new(Stream::new(100));
        let mut pipeline = Pipeline::new(Arc::clone(&source), 64);
        let output = pipeline.output();
        pipeline.start().unwrap();

        let producer = std::thread::spawn(move || {
            for _ in 0..2 {
                source.write(&[StereoFrame::from_stereo(1.0, 0.0); 100]);
            }
            source.close();
        });

        let mut sizes = Vec::new();
        while let Some(block) = output.read() {
            assert!(block.iter().all(|&s| s == 0.5));
            sizes.push(block.len());
            block.flush();
        }
        producer.join().unwrap();

        assert_eq!(sizes, vec![64, 64, 64, 8]);
        pipeline.stop();
    }

    #[test]
    fn test_interrupt_unblocks_reader() {
        let source = Arc::new(Stream::new(16));
        let mut pipeline = Pipeline::new(source, 16);
        let output = pipeline.output();
        pipeline.start().unwrap();

        let reader = std::thread::spawn(move || output.read().is_none());
        std::thread::sleep(std::time::Duration::from_millis(20));
        pipeline.interrupt();

        assert!(reader.join().unwrap());
        pipeline.stop();
    }
}
