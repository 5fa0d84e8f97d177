//! Consumer-side contract for dispatched events.

use std::collections::HashMap;

use super::DispatchError;
use crate::domain::{Buffer, Line, Nick, Nicklist};
use crate::protocol::{DecodeError, Message};

/// Receives typed events from the [`super::Dispatcher`].
///
/// The four required methods are the whole contract. The defaulted ones are
/// additive hooks; overriding them is optional.
pub trait Handler {
    /// Buffers from a listing or a buffer-opened notification, keyed by
    /// identity. A notification carries a one-entry map.
    fn on_buffers(&mut self, buffers: HashMap<String, Buffer>);

    /// One line, called once per row in the configured order.
    fn on_line(&mut self, line: Line);

    /// Users of one buffer's nicklist, group headers excluded.
    fn on_nicks(&mut self, buffer: &str, nicks: Vec<Nick>);

    /// A message with no dedicated route (command echoes, unknown ids).
    fn on_unhandled(&mut self, message: Message);

    /// A frame that could not be decoded. The stream continues.
    fn on_decode_error(&mut self, _error: &DecodeError) {}

    /// A decoded message whose shape did not match its identifier.
    fn on_dispatch_error(&mut self, _error: &DispatchError) {}

    /// Full nicklist of one buffer, groups included.
    ///
    /// Forwards the users to [`Handler::on_nicks`] unless overridden.
    fn on_nicklist(&mut self, nicklist: Nicklist) {
        let users = nicklist.users().cloned().collect();
        self.on_nicks(&nicklist.buffer, users);
    }
}
