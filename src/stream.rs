//! Call stream lifecycle: joining calls, attaching audio and keeping the
//! bridge alive.

mod keepalive;
mod orchestrator;
mod signal;

pub use keepalive::KeepaliveTimer;
pub use orchestrator::{CallSession, CallStreamOrchestrator, StreamSettings, StreamState};
pub use signal::{SignalReceiver, SignalSender, StreamCommand, StreamSignal, signal_channel};
