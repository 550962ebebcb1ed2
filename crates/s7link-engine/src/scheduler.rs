use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use s7link_frame::{FrameError, FrameReader, FrameWriter};
use s7link_transport::ShutdownSignal;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::Shared;

/// Pause between empty reads inside one read phase.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Scheduler state between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Reading,
    Writing,
}

/// Alternates reading and writing on the two channels.
///
/// Runs on its own thread. Only one phase runs per cycle, and writing wins
/// whenever the outbound queue has messages.
pub(crate) struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    reader: FrameReader,
    writer: FrameWriter,
    phase: Phase,
    read_timeout: Duration,
    batch_size: usize,
    poll_interval: Duration,
    reset_on_reconnect: bool,
    inbound_generation: u64,
}

impl Scheduler {
    pub(crate) fn new(shared: Arc<Shared>, dispatcher: Dispatcher, config: &EngineConfig) -> Self {
        Self {
            shared,
            dispatcher,
            reader: FrameReader::new(),
            writer: FrameWriter::new(),
            phase: Phase::Idle,
            read_timeout: config.read_timeout,
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval,
            reset_on_reconnect: config.reset_buffer_on_reconnect,
            inbound_generation: 0,
        }
    }

    pub(crate) fn run(mut self, shutdown: &ShutdownSignal) {
        debug!("scheduler started");
        while !shutdown.is_cancelled() {
            self.step();
            thread::sleep(self.poll_interval);
        }
        self.shared.is_connected.store(false, Ordering::SeqCst);
        debug!("scheduler stopped");
    }

    /// One cycle: check both peers, pick a phase, run it.
    pub(crate) fn step(&mut self) {
        let links_up = self.shared.inbound.connected() && self.shared.outbound.connected();
        let was_up = self.shared.is_connected.swap(links_up, Ordering::SeqCst);
        if links_up != was_up {
            info!(connected = links_up, "controller link changed");
        }
        if !links_up {
            self.phase = Phase::Idle;
            return;
        }

        if self.phase == Phase::Idle {
            self.phase = if self.shared.queue.is_empty() {
                Phase::Reading
            } else {
                Phase::Writing
            };
        }

        self.phase = match self.phase {
            Phase::Reading => self.read_phase(),
            Phase::Writing => self.write_phase(),
            Phase::Idle => Phase::Idle,
        };
    }

    /// Read and dispatch until the read window closes.
    fn read_phase(&mut self) -> Phase {
        let shared = Arc::clone(&self.shared);
        let deadline = Instant::now() + self.read_timeout;

        loop {
            let read = {
                let mut peer = shared.inbound.current_peer();
                let Some(stream) = peer.stream_mut() else {
                    return Phase::Idle;
                };
                self.sync_generation(shared.inbound.generation());

                match self.reader.read_from(stream) {
                    Ok(read) => read,
                    Err(FrameError::ConnectionClosed) => {
                        debug!("inbound peer closed the connection");
                        peer.release();
                        return Phase::Idle;
                    }
                    Err(err) => {
                        debug!(error = %err, "inbound read failed");
                        peer.release();
                        return Phase::Idle;
                    }
                }
            };

            match read {
                Some(messages) => {
                    for message in messages {
                        self.dispatcher.dispatch(message);
                    }
                }
                None => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Phase::Idle;
                    }
                    thread::sleep(READ_POLL_INTERVAL.min(deadline - now));
                }
            }

            if Instant::now() >= deadline {
                return Phase::Idle;
            }
        }
    }

    /// Send one batch from the queue. A failed batch is dropped.
    fn write_phase(&mut self) -> Phase {
        let shared = Arc::clone(&self.shared);
        let batch = shared.queue.dequeue_batch(self.batch_size);
        if batch.is_empty() {
            return Phase::Idle;
        }

        let mut peer = shared.outbound.current_peer();
        let Some(stream) = peer.stream_mut() else {
            warn!(dropped = batch.len(), "no outbound peer; batch dropped");
            return Phase::Idle;
        };

        match self.writer.write_batch(stream, &batch) {
            Ok(bytes) => trace!(messages = batch.len(), bytes, "batch sent"),
            Err(err) => {
                warn!(dropped = batch.len(), error = %err, "send failed; batch dropped");
                peer.release();
            }
        }
        Phase::Idle
    }

    fn sync_generation(&mut self, generation: u64) {
        if generation == self.inbound_generation {
            return;
        }
        self.inbound_generation = generation;
        if self.reset_on_reconnect && !self.reader.pending().is_empty() {
            debug!(
                discarded = self.reader.pending().len(),
                "new inbound peer; dropping carried input"
            );
            self.reader.reset();
        }
    }
}
