//! Call stream state machine.
//!
//! `start` records the desired state, arms the keepalive and reconciles once.
//! Each keepalive tick reconciles again, so a dropped call is rejoined on the
//! next tick and an intact one only gets a data flush. Reconciliation is
//! at-least-once: running it redundantly is always safe.
//!
//! The latest trigger wins. A reconcile that finds the desired conversation
//! changed, or a stop issued since it began, abandons its work without
//! touching the state or signalling the capture host.

use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use strum::Display;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{BotError, Result};
use crate::platform::Platform;
use crate::types::CallDescriptor;

use super::keepalive::KeepaliveTimer;
use super::signal::{SignalSender, StreamCommand};

const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StreamState {
    Idle,
    Joining,
    Streaming,
}

/// The one call the bot is bridging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub call_id: String,
    pub conversation_id: String,
    pub rtc_session_id: String,
    pub local_audio_attached: bool,
    pub is_remote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub keepalive_interval: Duration,
    /// Upper bound on the wait for media negotiation before attaching audio.
    pub settle_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: StreamState,
    session: Option<CallSession>,
    /// Conversation whose call should be streaming.
    desired: Option<String>,
    /// Bumped by every stop.
    generation: u64,
    keepalive: KeepaliveTimer,
}

pub struct CallStreamOrchestrator<P: Platform> {
    platform: Arc<P>,
    signals: SignalSender,
    settings: StreamSettings,
    inner: Mutex<Inner>,
}

impl<P: Platform> CallStreamOrchestrator<P> {
    #[must_use]
    pub fn new(platform: Arc<P>, signals: SignalSender, settings: StreamSettings) -> Arc<Self> {
        Arc::new(Self {
            platform,
            signals,
            settings,
            inner: Mutex::new(Inner {
                state: StreamState::Idle,
                session: None,
                desired: None,
                generation: 0,
                keepalive: KeepaliveTimer::new(),
            }),
        })
    }

    pub async fn state(&self) -> StreamState {
        self.inner.lock().await.state
    }

    pub async fn session(&self) -> Option<CallSession> {
        self.inner.lock().await.session.clone()
    }

    pub async fn keepalive_armed(&self) -> bool {
        self.inner.lock().await.keepalive.is_armed()
    }

    /// Start trigger: a call-started event or a start-stream command.
    ///
    /// The keepalive is armed even when this first attempt fails, so the
    /// next tick retries.
    ///
    /// # Errors
    ///
    /// Returns the error of the first reconciliation attempt.
    pub async fn start(self: &Arc<Self>, conv_id: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.desired = Some(conv_id.to_string());
            let weak = Arc::downgrade(self);
            inner
                .keepalive
                .arm(self.settings.keepalive_interval, move || keepalive_tick(weak.clone()));
        }
        self.reconcile(conv_id).await
    }

    /// Stop trigger. The keepalive is always cancelled, whatever else fails.
    ///
    /// # Errors
    ///
    /// Returns platform errors raised while leaving the call.
    pub async fn stop(&self, conv_id: &str) -> Result<()> {
        let session = {
            let mut inner = self.inner.lock().await;
            inner.keepalive.cancel();
            inner.desired = None;
            inner.generation += 1;
            inner.state = StreamState::Idle;
            inner.session.take()
        };

        let rtc_session_id = match session {
            Some(session) => session.rtc_session_id,
            None => self.rtc_session_id(conv_id).await?,
        };

        let left = match self.platform.find_call(&rtc_session_id).await {
            Ok(Some(call)) if !call.is_remote => {
                info!("Leaving call {}", call.call_id);
                self.platform.leave_conference(&call.call_id).await
            }
            Ok(_) => {
                debug!("No local call to leave for {rtc_session_id}");
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.signals
            .send(conv_id, &rtc_session_id, StreamCommand::Stop)?;
        info!("Stream stopped for conversation {conv_id}");
        left
    }

    /// The call of `conv_id` ended on the platform side.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::stop`].
    pub async fn call_ended(&self, conv_id: &str) -> Result<()> {
        let active = self.inner.lock().await.desired.as_deref() == Some(conv_id);
        if active {
            info!("Call in conversation {conv_id} ended");
            self.stop(conv_id).await
        } else {
            debug!("Ignoring end of call in conversation {conv_id}");
            Ok(())
        }
    }

    /// Bring the call of `conv_id` to the streaming state.
    ///
    /// Failures leave the state where it was. A superseded attempt returns
    /// `Ok` without changing anything.
    async fn reconcile(&self, conv_id: &str) -> Result<()> {
        let generation = self.inner.lock().await.generation;
        let rtc_session_id = self.rtc_session_id(conv_id).await?;
        let call = self.platform.find_call(&rtc_session_id).await?;

        let call = match call {
            None => {
                info!("No call in conversation {conv_id}, starting one");
                self.platform
                    .start_conference(conv_id)
                    .await
                    .map_err(|e| BotError::CallJoin(e.to_string()))?
            }
            Some(call) if call.is_remote => {
                info!("Joining remote call {}", call.call_id);
                self.platform
                    .join_conference(&call.call_id)
                    .await
                    .map_err(|e| BotError::CallJoin(e.to_string()))?;
                call
            }
            Some(call) if call.local_audio => {
                debug!("Call {} already streaming, requesting flush", call.call_id);
                let mut inner = self.inner.lock().await;
                if !inner.is_current(conv_id, generation) {
                    debug!("Flush for {conv_id} superseded");
                    return Ok(());
                }
                inner.enter_streaming(&call, &rtc_session_id);
                return self
                    .signals
                    .send(conv_id, &rtc_session_id, StreamCommand::Flush);
            }
            Some(call) => {
                debug!("Call {} joined without audio", call.call_id);
                call
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if !inner.is_current(conv_id, generation) {
                drop(inner);
                return self.abandon(conv_id, &call).await;
            }
            inner.enter_joining(&call, &rtc_session_id);
        }

        self.settle(&call.call_id).await;
        if !self.inner.lock().await.is_current(conv_id, generation) {
            return self.abandon(conv_id, &call).await;
        }

        self.platform
            .attach_local_audio(&call.call_id)
            .await
            .map_err(|e| BotError::MediaDevice(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(conv_id, generation) {
            drop(inner);
            return self.abandon(conv_id, &call).await;
        }
        self.signals
            .send(conv_id, &rtc_session_id, StreamCommand::Start)?;
        inner.enter_streaming(&call, &rtc_session_id);
        info!("Streaming call {}", call.call_id);
        Ok(())
    }

    /// Drop the work of a superseded reconcile. The call it joined is left
    /// when streaming was stopped meanwhile.
    async fn abandon(&self, conv_id: &str, call: &CallDescriptor) -> Result<()> {
        let stopped = self.inner.lock().await.desired.is_none();
        info!("Stream for conversation {conv_id} was superseded");
        if stopped {
            info!("Leaving call {} joined after stop", call.call_id);
            self.platform.leave_conference(&call.call_id).await?;
        }
        Ok(())
    }

    async fn rtc_session_id(&self, conv_id: &str) -> Result<String> {
        let conversation = self
            .platform
            .get_conversation_by_id(conv_id)
            .await?
            .ok_or_else(|| BotError::ConversationNotFound(conv_id.to_string()))?;
        conversation
            .rtc_session_id
            .ok_or_else(|| BotError::NoRtcSession(conv_id.to_string()))
    }

    async fn settle(&self, call_id: &str) {
        let connected = timeout(
            self.settings.settle_delay,
            self.platform.wait_media_connected(call_id),
        )
        .await;
        match connected {
            Ok(()) => debug!("Media connected for call {call_id}"),
            Err(_) => debug!("Settle delay elapsed for call {call_id}"),
        }
    }
}

impl Inner {
    fn is_current(&self, conv_id: &str, generation: u64) -> bool {
        self.generation == generation && self.desired.as_deref() == Some(conv_id)
    }

    fn enter_joining(&mut self, call: &CallDescriptor, rtc_session_id: &str) {
        self.state = StreamState::Joining;
        self.session = Some(CallSession {
            call_id: call.call_id.clone(),
            conversation_id: call.conv_id.clone(),
            rtc_session_id: rtc_session_id.to_string(),
            local_audio_attached: false,
            is_remote: call.is_remote,
        });
    }

    fn enter_streaming(&mut self, call: &CallDescriptor, rtc_session_id: &str) {
        self.state = StreamState::Streaming;
        self.session = Some(CallSession {
            call_id: call.call_id.clone(),
            conversation_id: call.conv_id.clone(),
            rtc_session_id: rtc_session_id.to_string(),
            local_audio_attached: true,
            is_remote: false,
        });
    }
}

/// Reconcile whatever conversation is desired at tick time.
async fn keepalive_tick<P: Platform>(orchestrator: Weak<CallStreamOrchestrator<P>>) {
    let Some(orchestrator) = orchestrator.upgrade() else {
        return;
    };
    let Some(conv_id) = orchestrator.inner.lock().await.desired.clone() else {
        return;
    };
    debug!("Keepalive tick for conversation {conv_id}");
    if let Err(e) = orchestrator.reconcile(&conv_id).await {
        match e {
            BotError::CallJoin(_) | BotError::MediaDevice(_) => {
                warn!("Keepalive could not restore stream: {e}");
            }
            _ => error!("Keepalive failed: {e}"),
        }
    }
}
