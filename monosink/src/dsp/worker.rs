//! Stage worker threads
//!
//! Every pipeline stage runs on its own thread, pulling blocks from its input
//! stream and pushing blocks to its output stream. Stopping a worker raises
//! the stop flags on both streams so a thread blocked in `read()` or `swap()`
//! wakes up, joins the thread, then clears the flags for the next start.

use crate::dsp::stream::{lock, Stream};
use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// One processing step between two streams.
pub trait Stage: Send + 'static {
    type Input: Copy + Default + Send + 'static;
    type Output: Copy + Default + Send + 'static;

    /// Thread name used for the worker
    fn name(&self) -> &'static str;

    fn input(&self) -> &Arc<Stream<Self::Input>>;

    fn output(&self) -> &Arc<Stream<Self::Output>>;

    /// Process one input block. Returns false when the worker should exit
    /// (input closed or a stop flag raised).
    fn run(&mut self) -> bool;

    /// Discard partially accumulated state after the worker stopped.
    fn reset(&mut self) {}
}

/// Owns a stage and the thread driving it.
pub struct Worker<S: Stage> {
    name: &'static str,
    input: Arc<Stream<S::Input>>,
    output: Arc<Stream<S::Output>>,
    stage: Arc<Mutex<S>>,
    handle: Option<JoinHandle<()>>,
}

impl<S: Stage> Worker<S> {
    pub fn new(stage: S) -> Self {
        Self {
            name: stage.name(),
            input: Arc::clone(stage.input()),
            output: Arc::clone(stage.output()),
            stage: Arc::new(Mutex::new(stage)),
            handle: None,
        }
    }

    /// True between `start()` and `stop()`, even if the stage already
    /// returned because its input closed.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the worker thread. No-op if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("{} worker already running", self.name);
            return Ok(());
        }

        let stage = Arc::clone(&self.stage);
        let name = self.name;
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut stage = lock(&stage);
                while stage.run() {}
                debug!("{} worker exiting", name);
            })?;

        self.handle = Some(handle);
        debug!("{} worker started", self.name);
        Ok(())
    }

    /// Interrupt and join the worker thread. No-op if not running.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            debug!("{} worker not running", self.name);
            return;
        };

        self.input.stop_reader();
        self.output.stop_writer();
        if handle.join().is_err() {
            error!("{} worker panicked", self.name);
        }
        self.input.clear_read_stop();
        self.output.clear_write_stop();

        lock(&self.stage).reset();
        debug!("{} worker stopped", self.name);
    }
}

impl<S: Stage> Drop for Worker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
