//! Fixed-size block packer
//!
//! Repacks a stream of variable-size blocks into blocks of exactly
//! `block_size` samples. A full block is published only once `block_size`
//! samples have accumulated; the remainder is published as a short final
//! block when the input closes. Stopping the worker discards the remainder.

use crate::dsp::stream::Stream;
use crate::dsp::worker::Stage;
use std::sync::Arc;
use tracing::trace;

/// Pipeline stage accumulating samples into fixed-size blocks.
pub struct Packer<T> {
    input: Arc<Stream<T>>,
    output: Arc<Stream<T>>,
    block_size: usize,

    /// Samples already staged in the output write buffer
    filled: usize,
}

impl<T: Copy + Default + Send + 'static> Packer<T> {
    /// Create a packer emitting blocks of `block_size` samples (minimum 1).
    pub fn new(input: Arc<Stream<T>>, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            input,
            output: Arc::new(Stream::new(block_size)),
            block_size,
            filled: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Publish the partial remainder as a short block, then close the output.
    fn finish(&mut self) {
        if self.filled > 0 {
            trace!("packer flushing {} remaining samples", self.filled);
            let remainder = std::mem::take(&mut self.filled);
            if !self.output.swap(remainder) {
                return;
            }
        }
        self.output.close();
    }
}

impl<T: Copy + Default + Send + 'static> Stage for Packer<T> {
    type Input = T;
    type Output = T;

    fn name(&self) -> &'static str {
        "packer"
    }

    fn input(&self) -> &Arc<Stream<T>> {
        &self.input
    }

    fn output(&self) -> &Arc<Stream<T>> {
        &self.output
    }

    fn run(&mut self) -> bool {
        let Some(block) = self.input.read() else {
            if self.input.is_closed() {
                self.finish();
            }
            return false;
        };

        let mut offset = 0;
        while offset < block.len() {
            let take = (self.block_size - self.filled).min(block.len() - offset);
            {
                let mut out = self.output.write_buf();
                out[self.filled..self.filled + take].copy_from_slice(&block[offset..offset + take]);
            }
            self.filled += take;
            offset += take;

            if self.filled == self.block_size {
                if !self.output.swap(self.block_size) {
                    return false;
                }
                self.filled = 0;
            }
        }
        block.flush();

        true
    }

    fn reset(&mut self) {
        self.filled = 0;
    }
}
