//! Stereo to mono downmix
//!
//! Each stereo frame becomes exactly one mono frame: `(left + right) / 2`.
//! Blocks pass straight through, so the stage adds no latency beyond the
//! block currently being converted.

use crate::dsp::stream::Stream;
use crate::dsp::types::StereoFrame;
use crate::dsp::worker::Stage;
use std::sync::Arc;

/// Average interleaved stereo frames into `output`.
///
/// Returns the number of mono samples written (`min(input.len(), output.len())`).
pub fn downmix(input: &[StereoFrame], output: &mut [f32]) -> usize {
    let count = input.len().min(output.len());
    for (out, frame) in output[..count].iter_mut().zip(input) {
        *out = frame.to_mono();
    }
    count
}

/// Pipeline stage converting a stereo stream into a mono stream.
pub struct Downmixer {
    input: Arc<Stream<StereoFrame>>,
    output: Arc<Stream<f32>>,
}

impl Downmixer {
    /// Output blocks have the same capacity as the input blocks.
    pub fn new(input: Arc<Stream<StereoFrame>>) -> Self {
        let output = Arc::new(Stream::new(input.capacity()));
        Self { input, output }
    }
}

impl Stage for Downmixer {
    type Input = StereoFrame;
    type Output = f32;

    fn name(&self) -> &'static str {
        "downmix"
    }

    fn input(&self) -> &Arc<Stream<StereoFrame>> {
        &self.input
    }

    fn output(&self) -> &Arc<Stream<f32>> {
        &self.output
    }

    fn run(&mut self) -> bool {
        let Some(block) = self.input.read() else {
            if self.input.is_closed() {
                self.output.close();
            }
            return false;
        };

        if block.is_empty() {
            block.flush();
            return true;
        }

        let count = {
            let mut out = self.output.write_buf();
            downmix(&block, &mut out)
        };
        block.flush();

        self.output.swap(count)
    }
}
