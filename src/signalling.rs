//! Signaling Channel the orchestrator talks to the relay through.

use futures::stream::LocalBoxStream;
use meshroom_signalling_proto::{Command, Event};

/// Bidirectional, ordered, at-most-once message transport between a client
/// and the signalling relay.
///
/// Connection management (reconnects, serialization) is up to the
/// implementor.
#[cfg_attr(test, mockall::automock)]
pub trait SignallingChannel {
    /// Returns [`Stream`] of [`Event`]s received from the relay.
    ///
    /// [`Stream`]: futures::Stream
    fn subscribe(&self) -> LocalBoxStream<'static, Event>;

    /// Sends the provided [`Command`] to the relay.
    fn send_command(&self, command: Command);
}
