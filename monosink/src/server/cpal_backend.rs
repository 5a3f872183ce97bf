//! Audio server transport using cpal
//!
//! The event loop is a dedicated thread that owns the output device and the
//! cpal stream (cpal streams cannot move between threads). Control calls are
//! sent to it as commands and answered synchronously. cpal's output callback
//! hands one slice per request; it is wrapped in a [`SliceQueue`] so the
//! bridge sees the same dequeue/queue protocol as any other server, and the
//! unfilled tail is silenced.

use crate::bridge::{CallbackBridge, SliceQueue};
use crate::error::{Error, Result};
use crate::server::{AudioServer, EventLoop, SampleFormat, StreamFormat, StreamProperties};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig, SupportedBufferSize};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Audio server backed by the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalServer;

impl CpalServer {
    pub fn new() -> Self {
        Self
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl AudioServer for CpalServer {
    type Loop = CpalLoop;

    fn create_loop(&mut self, name: &str) -> Result<CpalLoop> {
        CpalLoop::spawn(name)
    }
}

type Reply = SyncSender<Result<()>>;

enum LoopCommand {
    Open { device: Option<String>, reply: Reply },
    Connect {
        format: StreamFormat,
        block_size: usize,
        bridge: CallbackBridge,
        reply: Reply,
    },
    Play { reply: Reply },
    Pause { reply: Reply },
    Destroy { reply: Reply },
}

/// Handle to the loop thread. Dropping it shuts the thread down.
pub struct CpalLoop {
    commands: Option<Sender<LoopCommand>>,
    handle: Option<JoinHandle<()>>,
}

/// Stream object living on the loop thread
pub struct CpalStream {
    bridge: Option<CallbackBridge>,
    block_size: usize,
}

impl CpalLoop {
    fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("{}-loop", name))
            .spawn(move || run_loop(rx))?;

        debug!("cpal event loop '{}' created", name);
        Ok(Self {
            commands: Some(tx),
            handle: Some(handle),
        })
    }

    fn request(&self, make: impl FnOnce(Reply) -> LoopCommand) -> Result<()> {
        let (reply, response) = mpsc::sync_channel(1);
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| Error::AudioOutput("Event loop destroyed".to_string()))?;
        commands
            .send(make(reply))
            .map_err(|_| Error::AudioOutput("Event loop thread exited".to_string()))?;
        response
            .recv()
            .map_err(|_| Error::AudioOutput("Event loop thread exited".to_string()))?
    }
}

impl EventLoop for CpalLoop {
    type Stream = CpalStream;

    fn create_stream(
        &mut self,
        properties: &StreamProperties,
        bridge: CallbackBridge,
    ) -> Result<CpalStream> {
        debug!(
            "Creating stream '{}' (type={}, category={}, role={})",
            properties.name, properties.media_type, properties.media_category, properties.media_role
        );
        let device = properties.device.clone();
        self.request(|reply| LoopCommand::Open { device, reply })
            .map_err(|e| Error::Setup(format!("Failed to open output device: {}", e)))?;

        Ok(CpalStream {
            bridge: Some(bridge),
            block_size: properties.block_size,
        })
    }

    fn connect(&mut self, stream: &mut CpalStream, format: &StreamFormat) -> Result<()> {
        let bridge = stream
            .bridge
            .take()
            .ok_or_else(|| Error::Setup("Stream already connected".to_string()))?;
        let format = *format;
        let block_size = stream.block_size;
        self.request(|reply| LoopCommand::Connect {
            format,
            block_size,
            bridge,
            reply,
        })
    }

    fn start(&mut self) -> Result<()> {
        self.request(|reply| LoopCommand::Play { reply })
    }

    fn stop(&mut self) {
        if let Err(e) = self.request(|reply| LoopCommand::Pause { reply }) {
            warn!("Failed to pause stream: {}", e);
        }
    }

    fn destroy_stream(&mut self, _stream: CpalStream) {
        if let Err(e) = self.request(|reply| LoopCommand::Destroy { reply }) {
            warn!("Failed to destroy stream: {}", e);
        }
    }
}

impl Drop for CpalLoop {
    fn drop(&mut self) {
        // Closing the channel ends the loop thread
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("cpal event loop thread panicked");
            }
        }
        debug!("cpal event loop destroyed");
    }
}

/// Body of the loop thread: owns device and stream until the channel closes.
fn run_loop(commands: Receiver<LoopCommand>) {
    let mut device: Option<Device> = None;
    let mut stream: Option<Stream> = None;

    while let Ok(command) = commands.recv() {
        match command {
            LoopCommand::Open { device: name, reply } => {
                let result = open_device(name.as_deref()).map(|dev| {
                    device = Some(dev);
                });
                let _ = reply.send(result);
            }
            LoopCommand::Connect {
                format,
                block_size,
                bridge,
                reply,
            } => {
                let result = match device.as_ref() {
                    Some(dev) => build_stream(dev, &format, block_size, bridge).map(|s| {
                        stream = Some(s);
                    }),
                    None => Err(Error::Setup("No output device opened".to_string())),
                };
                let _ = reply.send(result);
            }
            LoopCommand::Play { reply } => {
                let result = match stream.as_ref() {
                    Some(s) => s
                        .play()
                        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e))),
                    None => Err(Error::AudioOutput("No stream connected".to_string())),
                };
                let _ = reply.send(result);
            }
            LoopCommand::Pause { reply } => {
                let result = match stream.as_ref() {
                    Some(s) => s
                        .pause()
                        .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e))),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            LoopCommand::Destroy { reply } => {
                stream.take();
                device.take();
                let _ = reply.send(Ok(()));
            }
        }
    }

    drop(stream);
    debug!("cpal event loop thread exiting");
}

/// Find the requested device, falling back to the default output device.
fn open_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::Setup(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(dev);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let dev = host
        .default_output_device()
        .ok_or_else(|| Error::Setup("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        dev.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(dev)
}

/// Check the device supports `format` exactly and build its stream config.
fn negotiate(device: &Device, format: &StreamFormat, block_size: usize) -> Result<StreamConfig> {
    let SampleFormat::F32 = format.sample_format;

    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::Setup(format!("Failed to get device configs: {}", e)))?;

    let Some(range) = supported.find(|config| {
        config.channels() == format.channels
            && config.sample_format() == cpal::SampleFormat::F32
            && config.min_sample_rate().0 <= format.sample_rate
            && config.max_sample_rate().0 >= format.sample_rate
    }) else {
        return Err(Error::Setup(format!("Device does not support {}", format)));
    };

    Ok(StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: buffer_size_for(range.buffer_size(), block_size),
    })
}

/// Fixed buffer of `block_size` frames if the device accepts it, host default otherwise.
fn buffer_size_for(supported: &SupportedBufferSize, block_size: usize) -> BufferSize {
    let frames = u32::try_from(block_size).unwrap_or(u32::MAX);
    match supported {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            BufferSize::Fixed(frames)
        }
        SupportedBufferSize::Range { min, max } => {
            warn!(
                "Block size {} outside device buffer range {}..={}, using default buffer size",
                block_size, min, max
            );
            BufferSize::Default
        }
        SupportedBufferSize::Unknown => {
            debug!("Device buffer size range unknown, using default buffer size");
            BufferSize::Default
        }
    }
}

fn build_stream(
    device: &Device,
    format: &StreamFormat,
    block_size: usize,
    bridge: CallbackBridge,
) -> Result<Stream> {
    let config = negotiate(device, format, block_size)?;
    debug!(
        "Audio config: sample_rate={}, channels={}, buffer_size={:?}",
        config.sample_rate.0, config.channels, config.buffer_size
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = SliceQueue::new(data);
                bridge.process(&mut queue);
                queue.finish();
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None, // No timeout
        )
        .map_err(|e| Error::Setup(format!("Failed to build stream: {}", e)))?;

    // Some hosts start streams on creation; dispatch begins with start()
    if let Err(e) = stream.pause() {
        debug!("Initial pause not supported: {}", e);
    }

    Ok(stream)
}
