//! The public socket endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::EndpointConfig;
use crate::error::{ErrorKind, SocketError};
use crate::listener::SocketListener;
use crate::queue::MessageQueue;
use crate::registry::{Message, MessageTypeTable};
use crate::state::SocketState;
use crate::worker::Worker;

/// State shared between the endpoint facade and its worker thread.
///
/// The send and receive queues keep separate mutexes on purpose: a single
/// lock would serialize sending against receiving.
pub(crate) struct Shared {
    state: Mutex<SocketState>,
    last_error: Mutex<Option<SocketError>>,
    send_queue: MessageQueue,
    receive_queue: MessageQueue,
    listeners: Mutex<Vec<Box<dyn SocketListener>>>,
    registry: Mutex<MessageTypeTable>,
    close_requested: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock means a listener panicked mid-callback; the guarded
    // data itself has no invalid intermediate states.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SocketState::Initial),
            last_error: Mutex::new(None),
            send_queue: MessageQueue::new(),
            receive_queue: MessageQueue::new(),
            listeners: Mutex::new(Vec::new()),
            registry: Mutex::new(MessageTypeTable::new()),
            close_requested: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> SocketState {
        *lock(&self.state)
    }

    pub(crate) fn last_error(&self) -> Option<SocketError> {
        lock(&self.last_error).clone()
    }

    pub(crate) fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    pub(crate) fn enqueue_send(&self, message: Box<dyn Message>) {
        self.send_queue.push(message);
    }

    pub(crate) fn drain_sends(&self) -> Vec<Box<dyn Message>> {
        self.send_queue.drain_all()
    }

    pub(crate) fn push_received(&self, message: Box<dyn Message>) {
        self.receive_queue.push(message);
    }

    pub(crate) fn take_received(&self) -> Option<Box<dyn Message>> {
        self.receive_queue.pop()
    }

    pub(crate) fn with_registry<T>(&self, f: impl FnOnce(&MessageTypeTable) -> T) -> T {
        f(&lock(&self.registry))
    }

    /// Publishes a state transition and fans it out to the listeners.
    pub(crate) fn publish_state(&self, state: SocketState) {
        *lock(&self.state) = state;
        for listener in lock(&self.listeners).iter() {
            listener.state_changed(state);
        }
    }

    /// Records an error as last-error and fans it out to the listeners.
    pub(crate) fn record_error(&self, error: SocketError) {
        *lock(&self.last_error) = Some(error.clone());
        for listener in lock(&self.listeners).iter() {
            listener.error(&error);
        }
    }

    pub(crate) fn notify_message_received(&self) {
        for listener in lock(&self.listeners).iter() {
            listener.message_received();
        }
    }
}

/// A message-oriented TCP socket endpoint.
///
/// One peer calls [`Socket::listen`], the other [`Socket::connect`]; once
/// connected both sides are symmetric and may send while receiving. All
/// socket I/O runs on a dedicated worker thread owned by the endpoint;
/// application threads interact only through the queues and snapshots here.
///
/// # Example
///
/// ```ignore
/// let mut socket = Socket::new();
/// socket.register_message_type::<Ping>(1);
/// socket.connect("127.0.0.1", 7777)?;
/// socket.send(Box::new(Ping::default()));
/// while let Some(message) = socket.take_received() {
///     // ...
/// }
/// ```
pub struct Socket {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket {
    /// Creates an endpoint in the Initial state.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            worker: None,
        }
    }

    /// Registers message type `M` under `id`. Idempotent on re-register.
    pub fn register_message_type<M: Message + Default + 'static>(&self, id: u32) {
        lock(&self.shared.registry).register::<M>(id);
    }

    /// Adds a listener that receives all future notifications.
    pub fn add_listener(&self, listener: Box<dyn SocketListener>) {
        lock(&self.shared.listeners).push(listener);
    }

    /// Starts listening for exactly one inbound connection.
    ///
    /// Only legal from the Initial state. The worker thread is spawned and
    /// moves through Opening and Listening toward Connected.
    pub fn listen(&mut self, address: &str, port: u16) -> Result<(), SocketError> {
        let config = EndpointConfig::parse(address, port)?;
        self.start(config, SocketState::Opening)
    }

    /// Starts an outbound connection.
    ///
    /// Only legal from the Initial state. The worker thread is spawned and
    /// moves through Connecting toward Connected.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<(), SocketError> {
        let config = EndpointConfig::parse(address, port)?;
        self.start(config, SocketState::Connecting)
    }

    fn start(&mut self, config: EndpointConfig, target: SocketState) -> Result<(), SocketError> {
        if self.worker.is_some() || self.shared.state() != SocketState::Initial {
            return Err(SocketError::new(
                ErrorKind::InvalidState,
                "endpoint already started",
            ));
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("tether-worker".to_string())
            .spawn(move || Worker::new(shared, config, target).run())
            .map_err(|e| {
                SocketError::new(
                    ErrorKind::InvalidState,
                    format!("could not spawn worker thread: {e}"),
                )
            })?;

        self.worker = Some(handle);
        Ok(())
    }

    /// Enqueues a message for transmission and returns immediately.
    ///
    /// Messages enqueued while not Connected stay queued; if the endpoint
    /// reaches Closed or Error they are silently dropped with it.
    pub fn send(&self, message: Box<dyn Message>) {
        self.shared.enqueue_send(message);
    }

    /// Takes the next received message, if any. Non-blocking.
    ///
    /// Messages already received remain takeable after the endpoint closes.
    pub fn take_received(&self) -> Option<Box<dyn Message>> {
        self.shared.take_received()
    }

    /// Requests shutdown and returns immediately. Idempotent.
    ///
    /// A running worker observes the request at its next tick boundary and
    /// walks Closing → Closed. An endpoint that was never started goes to
    /// Closed directly.
    pub fn close(&self) {
        self.shared.request_close();

        if self.worker.is_none() && !self.shared.state().is_terminal() {
            debug!("closing never-started endpoint");
            self.shared.publish_state(SocketState::Closed);
        }
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.shared.state()
    }

    /// Snapshot of the most recent error, if any.
    pub fn last_error(&self) -> Option<SocketError> {
        self.shared.last_error()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}
