//! In-process audio server for lifecycle tests
//!
//! The mock dispatches buffer requests on its own thread exactly like a real
//! server's realtime loop: each request hands the bridge one buffer of
//! `buffer_frames` samples (or none, when starved) and records what came back.
//! Every acquired event loop and stream object is counted so tests can check
//! nothing leaks after a failed setup or a teardown.

use monosink::bridge::{BufferQueue, CallbackBridge, Chunk, ProcessOutcome, ServerBuffer, SliceQueue};
use monosink::server::{AudioServer, EventLoop, StreamFormat, StreamProperties, SAMPLE_BYTES};
use monosink::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Setup step at which the mock reports an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    CreateLoop,
    CreateStream,
    Connect,
    Start,
}

/// Shared view into the mock server
pub struct ServerProbe {
    pub buffer_frames: usize,
    pub live_loops: AtomicUsize,
    pub live_streams: AtomicUsize,
    pub loops_created: AtomicUsize,
    /// Loops dropped while their stream object was still alive
    pub order_violations: AtomicUsize,
    /// When set, every request finds the buffer pool empty
    pub starved: AtomicBool,
    pub fail_at: Mutex<Option<FailAt>>,
    pub properties: Mutex<Option<StreamProperties>>,
    pub format: Mutex<Option<StreamFormat>>,
    pub delivered: Mutex<Vec<Vec<f32>>>,
    pub chunks: Mutex<Vec<Chunk>>,
}

impl ServerProbe {
    pub fn fail_at(&self, step: Option<FailAt>) {
        *self.fail_at.lock().unwrap() = step;
    }

    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    pub fn delivered_blocks(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    fn check(&self, step: FailAt) -> Result<()> {
        if *self.fail_at.lock().unwrap() == Some(step) {
            return Err(Error::Setup(format!("injected failure at {:?}", step)));
        }
        Ok(())
    }
}

pub struct MockServer {
    probe: Arc<ServerProbe>,
}

impl MockServer {
    /// Server whose buffers hold `buffer_frames` mono samples.
    pub fn new(buffer_frames: usize) -> (Self, Arc<ServerProbe>) {
        let probe = Arc::new(ServerProbe {
            buffer_frames,
            live_loops: AtomicUsize::new(0),
            live_streams: AtomicUsize::new(0),
            loops_created: AtomicUsize::new(0),
            order_violations: AtomicUsize::new(0),
            starved: AtomicBool::new(false),
            fail_at: Mutex::new(None),
            properties: Mutex::new(None),
            format: Mutex::new(None),
            delivered: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
        });
        (
            Self {
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

impl AudioServer for MockServer {
    type Loop = MockLoop;

    fn create_loop(&mut self, _name: &str) -> Result<MockLoop> {
        self.probe.check(FailAt::CreateLoop)?;
        self.probe.live_loops.fetch_add(1, Ordering::SeqCst);
        self.probe.loops_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockLoop {
            probe: Arc::clone(&self.probe),
            bridge: None,
            stream_alive: false,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }
}

pub struct MockLoop {
    probe: Arc<ServerProbe>,
    bridge: Option<CallbackBridge>,
    stream_alive: bool,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct MockStream {
    bridge: CallbackBridge,
}

impl EventLoop for MockLoop {
    type Stream = MockStream;

    fn create_stream(
        &mut self,
        properties: &StreamProperties,
        bridge: CallbackBridge,
    ) -> Result<MockStream> {
        self.probe.check(FailAt::CreateStream)?;
        *self.probe.properties.lock().unwrap() = Some(properties.clone());
        self.probe.live_streams.fetch_add(1, Ordering::SeqCst);
        self.stream_alive = true;
        Ok(MockStream { bridge })
    }

    fn connect(&mut self, stream: &mut MockStream, format: &StreamFormat) -> Result<()> {
        self.probe.check(FailAt::Connect)?;
        *self.probe.format.lock().unwrap() = Some(*format);
        self.bridge = Some(stream.bridge.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.probe.check(FailAt::Start)?;
        let bridge = self
            .bridge
            .clone()
            .ok_or_else(|| Error::AudioOutput("stream not connected".to_string()))?;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let probe = Arc::clone(&self.probe);
        self.handle = Some(std::thread::spawn(move || dispatch(bridge, probe, running)));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }

    fn destroy_stream(&mut self, _stream: MockStream) {
        self.bridge = None;
        self.stream_alive = false;
        self.probe.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for MockLoop {
    fn drop(&mut self) {
        if self.stream_alive {
            self.probe.order_violations.fetch_add(1, Ordering::SeqCst);
        }
        self.stop();
        self.probe.live_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StarvedQueue;

impl<'a> BufferQueue<'a> for StarvedQueue {
    fn dequeue_buffer(&mut self) -> Option<ServerBuffer<'a>> {
        None
    }

    fn queue_buffer(&mut self, _buffer: ServerBuffer<'a>) {}
}

/// Realtime loop body: answer buffer requests until stopped.
fn dispatch(bridge: CallbackBridge, probe: Arc<ServerProbe>, running: Arc<AtomicBool>) {
    let mut buffer = vec![0.0f32; probe.buffer_frames];

    while running.load(Ordering::SeqCst) {
        if probe.starved.load(Ordering::SeqCst) {
            bridge.process(&mut StarvedQueue);
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        let (outcome, chunk) = {
            let mut queue = SliceQueue::new(&mut buffer[..]);
            let outcome = bridge.process(&mut queue);
            (outcome, queue.finish())
        };

        match outcome {
            ProcessOutcome::Delivered { copied_bytes, .. } => {
                let samples = copied_bytes / SAMPLE_BYTES;
                probe.delivered.lock().unwrap().push(buffer[..samples].to_vec());
                if let Some(chunk) = chunk {
                    probe.chunks.lock().unwrap().push(chunk);
                }
            }
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }
}
