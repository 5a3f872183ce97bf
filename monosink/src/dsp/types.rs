//! Core sample types
//!
//! Defines the frame types carried between pipeline stages.

/// StereoFrame represents a single stereo sample (one frame of audio).
///
/// Produced by the upstream source and consumed by the downmixer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl StereoFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        StereoFrame { left: 0.0, right: 0.0 }
    }

    /// Create a frame from mono sample (duplicate to both channels)
    pub fn from_mono(sample: f32) -> Self {
        StereoFrame { left: sample, right: sample }
    }

    /// Create a frame from left and right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        StereoFrame { left, right }
    }

    /// Average of both channels
    pub fn to_mono(self) -> f32 {
        (self.left + self.right) / 2.0
    }
}
