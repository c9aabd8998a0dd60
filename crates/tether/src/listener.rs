//! Listener notifications.

use crate::error::SocketError;
use crate::state::SocketState;

/// Receives endpoint notifications.
///
/// All callbacks are fired synchronously from the endpoint's worker thread;
/// implementations must not block for long. The default implementations do
/// nothing, so a listener only overrides what it cares about.
pub trait SocketListener: Send {
    /// The lifecycle state changed.
    fn state_changed(&self, state: SocketState) {
        let _ = state;
    }

    /// A message arrived. There is no payload here; the consumer pulls it
    /// with [`Socket::take_received`](crate::Socket::take_received).
    fn message_received(&self) {}

    /// An error was recorded.
    fn error(&self, error: &SocketError) {
        let _ = error;
    }
}
