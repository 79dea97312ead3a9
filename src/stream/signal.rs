//! One-way signal channel from the bot logic to the media host.

use strum::Display;
use tokio::sync::mpsc;

use crate::error::{BotError, Result};

/// What the media host should do with the call's audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamCommand {
    /// Begin recording the remote audio of the call.
    Start,
    /// Emit the data buffered so far without stopping.
    Flush,
    /// Stop recording and write the assembled file.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSignal {
    pub conversation_id: String,
    pub rtc_session_id: String,
    pub command: StreamCommand,
}

/// Sending half. Delivery is not acknowledged.
#[derive(Debug, Clone)]
pub struct SignalSender(mpsc::UnboundedSender<StreamSignal>);

pub type SignalReceiver = mpsc::UnboundedReceiver<StreamSignal>;

impl SignalSender {
    /// Fire a signal at the media host.
    ///
    /// # Errors
    ///
    /// Returns `SignalClosed` when the host side has shut down.
    pub fn send(&self, conversation_id: &str, rtc_session_id: &str, command: StreamCommand) -> Result<()> {
        self.0
            .send(StreamSignal {
                conversation_id: conversation_id.to_string(),
                rtc_session_id: rtc_session_id.to_string(),
                command,
            })
            .map_err(|_| BotError::SignalClosed)
    }
}

#[must_use]
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender(tx), rx)
}
