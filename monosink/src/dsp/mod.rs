//! Signal processing blocks
//!
//! Stages are connected by [`stream::Stream`] endpoints and each runs on its
//! own [`worker::Worker`] thread.

pub mod downmix;
pub mod packer;
pub mod stream;
pub mod types;
pub mod worker;

pub use downmix::Downmixer;
pub use packer::Packer;
pub use stream::{ReadBlock, Stream};
pub use types::StereoFrame;
pub use worker::{Stage, Worker};
