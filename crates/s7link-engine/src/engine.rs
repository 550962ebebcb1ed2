use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use s7link_frame::Message;
use s7link_registry::{MessageDescriptor, MessageRegistry};
use s7link_transport::{ConnectionChannel, Direction, ShutdownSignal};
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, NotificationSink};
use crate::error::{EngineError, Result};
use crate::queue::{OutboundQueue, SendOutcome};
use crate::scheduler::Scheduler;

/// State shared by the accept loops, the scheduler and callers.
pub(crate) struct Shared {
    pub(crate) inbound: ConnectionChannel,
    pub(crate) outbound: ConnectionChannel,
    pub(crate) queue: OutboundQueue,
    pub(crate) is_connected: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: &EngineConfig, ip: IpAddr) -> Self {
        Self {
            inbound: ConnectionChannel::new(config.channel_config(ip, Direction::Inbound)),
            outbound: ConnectionChannel::new(config.channel_config(ip, Direction::Outbound)),
            queue: OutboundQueue::new(),
            is_connected: AtomicBool::new(false),
        }
    }

    fn channel(&self, direction: Direction) -> &ConnectionChannel {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

struct Workers {
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

/// Point-to-point link to one controller.
///
/// `connect` starts two accept loops and the scheduler on background
/// threads; `send_msg` can be called from any thread. Dropping the engine
/// stops and joins its threads.
///
/// ```no_run
/// use s7link_engine::{Engine, EngineConfig};
/// use s7link_frame::Message;
/// use s7link_registry::MessageDescriptor;
///
/// let (engine, notifications) = Engine::with_channel(
///     EngineConfig::new("0.0.0.0"),
///     [MessageDescriptor::notify(4)],
/// );
/// assert!(engine.connect());
/// engine.send_msg(Message::new(1, 1, "1"));
/// for message in notifications {
///     println!("{message}");
/// }
/// ```
pub struct Engine {
    config: EngineConfig,
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    config_error: Option<EngineError>,
    workers: Mutex<Option<Workers>>,
}

impl Engine {
    /// Build an engine. Nothing is bound until [`Engine::connect`].
    ///
    /// An unparsable address or a bad descriptor set does not fail here: the
    /// engine is flagged with [`Engine::error_configuration`] and refuses to
    /// connect.
    pub fn new<S>(
        config: EngineConfig,
        descriptors: impl IntoIterator<Item = MessageDescriptor>,
        sink: S,
    ) -> Self
    where
        S: NotificationSink + 'static,
    {
        let mut config_error = None;

        let ip = match config.bind_ip() {
            Ok(ip) => ip,
            Err(err) => {
                config_error = Some(err);
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
        };

        let registry = match MessageRegistry::build(descriptors) {
            Ok(registry) => registry,
            Err(err) => {
                if config_error.is_none() {
                    config_error = Some(err.into());
                }
                MessageRegistry::empty()
            }
        };

        let engine = Self {
            shared: Arc::new(Shared::new(&config, ip)),
            dispatcher: Dispatcher::new(Arc::new(registry), Arc::new(sink)),
            config,
            config_error,
            workers: Mutex::new(None),
        };

        if let Some(err) = &engine.config_error {
            error!(error = %err, "engine configuration rejected");
            engine.disconnect();
        }
        engine
    }

    /// Build an engine whose notifications arrive on the returned receiver.
    pub fn with_channel(
        config: EngineConfig,
        descriptors: impl IntoIterator<Item = MessageDescriptor>,
    ) -> (Self, Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(config, descriptors, tx), rx)
    }

    /// Start listening and exchanging messages.
    ///
    /// Returns `false` only when the engine is misconfigured or its threads
    /// could not start. Calling it again while running is a no-op.
    pub fn connect(&self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "connect refused");
                false
            }
        }
    }

    /// Like [`Engine::connect`], with the reason for a refusal.
    pub fn try_connect(&self) -> Result<()> {
        if let Some(err) = &self.config_error {
            return Err(EngineError::Misconfigured(err.to_string()));
        }

        let mut workers = self.lock_workers();
        if workers.is_some() {
            debug!("engine already running");
            return Ok(());
        }

        let shutdown = ShutdownSignal::new();
        let mut handles = Vec::with_capacity(3);
        if let Err(err) = self.spawn_workers(&shutdown, &mut handles) {
            shutdown.cancel();
            for handle in handles {
                let _ = handle.join();
            }
            return Err(err);
        }

        *workers = Some(Workers { shutdown, handles });
        info!(
            address = %self.config.address,
            inbound_port = self.config.inbound_port,
            outbound_port = self.config.outbound_port,
            "engine started"
        );
        Ok(())
    }

    /// Drop both peers. The accept loops rebind and wait for the controller
    /// to reconnect; use [`Engine::shutdown`] to stop them.
    pub fn disconnect(&self) {
        self.shared.inbound.close();
        self.shared.outbound.close();
        self.shared.is_connected.store(false, Ordering::SeqCst);
        info!("disconnected; waiting for controller");
    }

    /// Stop all threads, wait for them and drop both peers.
    pub fn shutdown(&self) {
        let Some(workers) = self.lock_workers().take() else {
            return;
        };

        workers.shutdown.cancel();
        for handle in workers.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(worker = %name, "worker panicked");
            }
        }

        self.shared.inbound.current_peer().release();
        self.shared.outbound.current_peer().release();
        self.shared.is_connected.store(false, Ordering::SeqCst);
        info!("engine stopped");
    }

    /// Queue a message for the controller.
    ///
    /// Rejected while no outbound peer is connected or when `type_id` is 0.
    pub fn send_msg(&self, message: Message) -> SendOutcome {
        let outcome = self
            .shared
            .queue
            .enqueue(message, self.shared.outbound.connected());
        trace!(
            accepted = outcome.accepted,
            queue_len = outcome.queue_len,
            "send_msg"
        );
        outcome
    }

    /// `true` while both the inbound and the outbound peer are connected.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected.load(Ordering::SeqCst)
    }

    /// `true` when the engine was built with an invalid configuration.
    pub fn error_configuration(&self) -> bool {
        self.config_error.is_some()
    }

    /// Why the configuration was rejected, if it was.
    pub fn configuration_error(&self) -> Option<&EngineError> {
        self.config_error.as_ref()
    }

    /// `true` between a successful `connect` and `shutdown`.
    pub fn is_running(&self) -> bool {
        self.lock_workers().is_some()
    }

    /// Address the inbound listener is bound to, while listening.
    pub fn inbound_addr(&self) -> Option<SocketAddr> {
        self.shared.inbound.local_addr()
    }

    /// Address the outbound listener is bound to, while listening.
    pub fn outbound_addr(&self) -> Option<SocketAddr> {
        self.shared.outbound.local_addr()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn registry(&self) -> &MessageRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn spawn_workers(
        &self,
        shutdown: &ShutdownSignal,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Result<()> {
        for direction in [Direction::Inbound, Direction::Outbound] {
            let shared = Arc::clone(&self.shared);
            let shutdown = shutdown.clone();
            handles.push(spawn_worker(direction.as_str(), move || {
                shared.channel(direction).run(&shutdown)
            })?);
        }

        let scheduler = Scheduler::new(
            Arc::clone(&self.shared),
            self.dispatcher.clone(),
            &self.config,
        );
        let shutdown = shutdown.clone();
        handles.push(spawn_worker("scheduler", move || scheduler.run(&shutdown))?);
        Ok(())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("inbound", &self.shared.inbound)
            .field("outbound", &self.shared.outbound)
            .field("is_connected", &self.is_connected())
            .field("config_error", &self.config_error)
            .finish_non_exhaustive()
    }
}

fn spawn_worker<F>(name: &'static str, work: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("s7link-{name}"))
        .spawn(work)
        .map_err(|source| EngineError::Spawn { name, source })
}
