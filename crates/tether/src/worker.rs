//! The endpoint worker: lifecycle state machine and frame I/O.
//!
//! One worker thread owns the socket for the lifetime of the endpoint. Each
//! loop iteration (a tick) runs the current state's handler, applies a
//! pending close request, and publishes the state transition if one is due.
//! While Connected, a tick drains the send queue, advances the receive
//! parser by one pass, and probes liveness.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use tether_wire::{
    encode_frame, keepalive_frame, Frame, ParseFault, ParseStatus, WireMessage, FRAME_OVERHEAD,
    MAX_PAYLOAD_SIZE,
};

use crate::config::EndpointConfig;
use crate::error::{ErrorKind, SocketError};
use crate::registry::Message;
use crate::socket::Shared;
use crate::state::SocketState;

/// Receive timeout giving the Connected loop its cooperative tick cadence.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(250);

/// Delay before retrying a failed connect or bind.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Wall-clock interval between keep-alive probes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) struct Worker {
    shared: Arc<Shared>,
    config: EndpointConfig,
    state: SocketState,
    next_state: SocketState,
    stream: Option<TcpStream>,
    pending_listener: Option<TcpListener>,
    wire: WireMessage,
    last_keepalive: Instant,
}

impl Worker {
    /// Creates a worker whose first transition will be to `target`
    /// (Connecting or Opening), fired like any other state change.
    pub fn new(shared: Arc<Shared>, config: EndpointConfig, target: SocketState) -> Self {
        Self {
            shared,
            config,
            state: SocketState::Initial,
            next_state: target,
            stream: None,
            pending_listener: None,
            wire: WireMessage::new(),
            last_keepalive: Instant::now(),
        }
    }

    /// The worker thread body. Returns when a terminal state is reached.
    pub fn run(mut self) {
        debug!(
            address = %self.config.address(),
            port = self.config.port(),
            "worker started"
        );

        while !self.state.is_terminal() {
            self.tick();

            // A requested close overrides the pending state unless the
            // endpoint is already closing down or headed to a terminal
            // state.
            if self.shared.close_requested()
                && self.state != SocketState::Closing
                && !self.next_state.is_terminal()
            {
                self.next_state = SocketState::Closing;
            }

            if self.next_state != self.state {
                self.state = self.next_state;
                debug!(state = %self.state, "state changed");
                self.shared.publish_state(self.state);
            }
        }

        debug!(state = %self.state, "worker exiting");
    }

    fn tick(&mut self) {
        match self.state {
            // Nothing happens until the pending start state is applied.
            SocketState::Initial => {}
            SocketState::Connecting => self.tick_connecting(),
            SocketState::Opening => self.tick_opening(),
            SocketState::Listening => self.tick_listening(),
            SocketState::Connected => self.tick_connected(),
            SocketState::Closing => self.tick_closing(),
            SocketState::Closed | SocketState::Error => {}
        }
    }

    fn tick_connecting(&mut self) {
        let addr = self.config.socket_addr();
        match TcpStream::connect(addr) {
            Ok(stream) => {
                self.adopt_stream(stream);
                debug!(peer = %addr, "connected");
                self.next_state = SocketState::Connected;
            }
            Err(e) => {
                warn!(peer = %addr, error = %e, "connect failed, retrying");
                thread::sleep(RETRY_DELAY);
            }
        }
    }

    fn tick_opening(&mut self) {
        let addr = self.config.socket_addr();
        match TcpListener::bind(addr) {
            Ok(listener) => {
                debug!(address = %addr, "listening");
                self.pending_listener = Some(listener);
                self.next_state = SocketState::Listening;
            }
            Err(e) => {
                warn!(address = %addr, error = %e, "bind failed, retrying");
                thread::sleep(RETRY_DELAY);
            }
        }
    }

    fn tick_listening(&mut self) {
        let Some(listener) = self.pending_listener.take() else {
            self.fatal_error(
                ErrorKind::AcceptFailed,
                "Could not accept the incoming connection",
            );
            return;
        };

        // Exactly one peer; the listening socket is dropped either way.
        match listener.accept() {
            Ok((stream, peer)) => {
                self.adopt_stream(stream);
                debug!(peer = %peer, "accepted connection");
                self.next_state = SocketState::Connected;
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                self.fatal_error(
                    ErrorKind::AcceptFailed,
                    "Could not accept the incoming connection",
                );
            }
        }
    }

    fn tick_connected(&mut self) {
        // Drain the queue in one critical section, transmit outside it so
        // application threads can keep enqueueing.
        for message in self.shared.drain_sends() {
            self.send_message(message);
        }

        self.receive_next();

        if self.next_state != SocketState::Error {
            self.check_liveness();
        }
    }

    fn tick_closing(&mut self) {
        debug!("closing socket");
        self.stream = None;
        self.pending_listener = None;
        self.next_state = SocketState::Closed;
    }

    fn adopt_stream(&mut self, stream: TcpStream) {
        // The receive timeout is what keeps a quiet Connected loop ticking.
        if let Err(e) = stream.set_read_timeout(Some(RECEIVE_TIMEOUT)) {
            warn!(error = %e, "could not set receive timeout");
        }
        self.stream = Some(stream);
        self.wire.reset();
        self.last_keepalive = Instant::now();
    }

    /// Transmits one message: header word, size, type id, payload.
    fn send_message(&mut self, message: Box<dyn Message>) {
        let type_id = match self.shared.with_registry(|registry| registry.id_of(&*message)) {
            Some(id) => id,
            None => {
                self.error(ErrorKind::UnknownMessageType, "Unknown message type");
                return;
            }
        };

        let payload = message.serialize();
        debug_assert_eq!(payload.len(), message.encoded_len());
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            self.error(ErrorKind::SendFailed, "Message exceeds maximum payload size");
            return;
        }

        let mut frame = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
        encode_frame(type_id, &payload, &mut frame);

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        // The runtime ignores SIGPIPE, so a broken pipe surfaces here as an
        // ordinary io::Error.
        match stream.write_all(&frame) {
            Ok(()) => trace!(type_id, len = payload.len(), "message sent"),
            Err(e) => {
                warn!(error = %e, "send failed");
                self.error(ErrorKind::SendFailed, "Could not send message data");
            }
        }
    }

    /// One receive-parser tick. EAGAIN leaves all parser state in place for
    /// the next tick.
    fn receive_next(&mut self) {
        let status = match self.stream.as_mut() {
            Some(stream) => self.wire.advance(stream),
            None => return,
        };

        match status {
            ParseStatus::Idle => {}
            ParseStatus::KeepAlive => trace!("keep-alive received"),
            ParseStatus::Complete(frame) => self.dispatch(frame),
            ParseStatus::Rejected(fault) => self.handle_fault(fault),
            ParseStatus::OutOfMemory => self.fatal_error(ErrorKind::OutOfMemory, "Out of memory"),
        }
    }

    fn handle_fault(&mut self, fault: ParseFault) {
        match fault {
            ParseFault::SignatureMismatch { header } => {
                // Someone might be speaking a different protocol to us.
                trace!(header, "foreign header word");
                self.error(ErrorKind::ReceiveFailed, "Header mismatch");
            }
            ParseFault::NegativeSize { .. }
            | ParseFault::OversizedPayload { .. }
            | ParseFault::SizeUnreadable => {
                self.error(ErrorKind::ReceiveFailed, "Size invalid");
            }
            ParseFault::PayloadReadFailed(e) => {
                warn!(error = %e, "read failed mid-frame");
                self.error(ErrorKind::ReceiveFailed, "Receive failed");
            }
            // An invalid frame was consumed to keep the stream framed;
            // nothing to report.
            ParseFault::InvalidFrame => trace!("invalid frame discarded"),
        }
    }

    /// Hands a complete frame to the registry and the receive queue.
    fn dispatch(&mut self, frame: Frame) {
        let message = self
            .shared
            .with_registry(|registry| registry.create(frame.type_id));
        let Some(mut message) = message else {
            self.error(ErrorKind::UnknownMessageType, "Unknown message type");
            return;
        };

        if let Err(e) = message.parse(&frame.payload) {
            debug!(type_id = frame.type_id, error = %e, "payload rejected by codec");
            self.error(ErrorKind::ParseFailed, "Failed to parse message");
            return;
        }

        trace!(
            type_id = frame.type_id,
            len = frame.payload.len(),
            "message dispatched"
        );
        self.shared.push_received(message);
        self.shared.notify_message_received();
    }

    /// Sends a keep-alive probe every [`KEEPALIVE_INTERVAL`]. A failed probe
    /// means the peer is gone; the connection winds down through Closing.
    fn check_liveness(&mut self) {
        if self.last_keepalive.elapsed() < KEEPALIVE_INTERVAL {
            return;
        }
        self.last_keepalive = Instant::now();

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if let Err(e) = stream.write_all(&keepalive_frame()) {
            debug!(error = %e, "keep-alive probe failed");
            self.error(ErrorKind::ConnectionReset, "Connection reset by peer");
            self.next_state = SocketState::Closing;
        }
    }

    /// Records a non-fatal error: last-error plus listener fan-out. The
    /// endpoint stays in its current state.
    fn error(&self, kind: ErrorKind, message: &str) {
        self.shared.record_error(SocketError::new(kind, message));
    }

    /// Records a fatal error: clears the in-flight frame and aborts the
    /// connection through the Error state.
    fn fatal_error(&mut self, kind: ErrorKind, message: &str) {
        self.wire.reset();
        self.next_state = SocketState::Error;
        self.shared.record_error(SocketError::fatal(kind, message));
    }
}
