//! In-memory platform used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::{BotError, Result};
use crate::platform::Platform;
use crate::types::{CallDescriptor, Conversation, Identity, Profile, TextItem};

/// Platform operation recorded by [`FakePlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Logon,
    UpdateUser,
    GetConversation(String),
    GetDirect(String),
    CreateDirect(String),
    AddTextItem(String),
    FindCall(String),
    StartConference(String),
    JoinConference(String),
    LeaveConference(String),
    AttachLocalAudio(String),
}

#[derive(Default)]
pub struct FakePlatform {
    identity: Identity,
    conversations: HashMap<String, Conversation>,
    directs: HashMap<String, String>,
    calls: Mutex<HashMap<String, CallDescriptor>>,
    sent: Mutex<Vec<(String, TextItem)>>,
    log: Mutex<Vec<Call>>,
    fail_logon: AtomicBool,
    fail_joins: AtomicBool,
    fail_attach: AtomicBool,
    fail_send: AtomicBool,
    media_connected_signal: bool,
    keep_calls_on_leave: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            identity: Identity {
                user_id: "bot-1".to_string(),
                display_name: "Bot".to_string(),
            },
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conv_id: &str, rtc_session_id: Option<&str>) -> Self {
        self.conversations.insert(
            conv_id.to_string(),
            Conversation {
                conv_id: conv_id.to_string(),
                rtc_session_id: rtc_session_id.map(str::to_string),
            },
        );
        self
    }

    pub fn with_direct(mut self, owner: &str, conv_id: &str) -> Self {
        self.directs.insert(owner.to_string(), conv_id.to_string());
        self.with_conversation(conv_id, None)
    }

    pub fn with_remote_call(self, rtc_session_id: &str, call_id: &str) -> Self {
        let conv_id = self
            .conversations
            .values()
            .find(|c| c.rtc_session_id.as_deref() == Some(rtc_session_id))
            .map(|c| c.conv_id.clone())
            .unwrap_or_default();
        self.calls.lock().expect("calls lock").insert(
            rtc_session_id.to_string(),
            CallDescriptor {
                call_id: call_id.to_string(),
                conv_id,
                is_remote: true,
                local_audio: false,
            },
        );
        self
    }

    pub fn with_media_connected_signal(mut self) -> Self {
        self.media_connected_signal = true;
        self
    }

    /// Leaving records the call but keeps it findable, as a voice client
    /// that holds its connection handle after leaving does.
    pub fn with_calls_kept_on_leave(mut self) -> Self {
        self.keep_calls_on_leave = true;
        self
    }

    pub fn fail_logon(&self, fail: bool) {
        self.fail_logon.store(fail, Ordering::SeqCst);
    }

    pub fn fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Simulate the platform silently dropping the bot from a call.
    pub fn drop_call(&self, rtc_session_id: &str) {
        self.calls.lock().expect("calls lock").remove(rtc_session_id);
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.log.lock().expect("log lock").iter().filter(|c| predicate(c)).count()
    }

    pub fn sent(&self) -> Vec<(String, TextItem)> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn record(&self, call: Call) {
        self.log.lock().expect("log lock").push(call);
    }

    fn update_call(&self, call_id: &str, update: impl FnOnce(&mut CallDescriptor)) -> Result<()> {
        let mut calls = self.calls.lock().expect("calls lock");
        let call = calls
            .values_mut()
            .find(|c| c.call_id == call_id)
            .ok_or_else(|| BotError::CallJoin(format!("unknown call {call_id}")))?;
        update(call);
        Ok(())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn logon(&self) -> Result<Identity> {
        self.record(Call::Logon);
        if self.fail_logon.load(Ordering::SeqCst) {
            return Err(BotError::Logon("invalid credentials".into()));
        }
        Ok(self.identity.clone())
    }

    async fn update_user(&self, _profile: &Profile) -> Result<()> {
        self.record(Call::UpdateUser);
        Ok(())
    }

    async fn get_conversation_by_id(&self, conv_id: &str) -> Result<Option<Conversation>> {
        self.record(Call::GetConversation(conv_id.to_string()));
        Ok(self.conversations.get(conv_id).cloned())
    }

    async fn get_direct_conversation(&self, owner: &str) -> Result<Option<Conversation>> {
        self.record(Call::GetDirect(owner.to_string()));
        Ok(self
            .directs
            .get(owner)
            .and_then(|conv_id| self.conversations.get(conv_id))
            .cloned())
    }

    async fn create_direct_conversation(&self, owner: &str) -> Result<Conversation> {
        self.record(Call::CreateDirect(owner.to_string()));
        Ok(Conversation {
            conv_id: format!("direct-{owner}"),
            rtc_session_id: None,
        })
    }

    async fn add_text_item(&self, conv_id: &str, item: TextItem) -> Result<()> {
        self.record(Call::AddTextItem(conv_id.to_string()));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(BotError::Send("platform unavailable".into()));
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((conv_id.to_string(), item));
        Ok(())
    }

    async fn find_call(&self, rtc_session_id: &str) -> Result<Option<CallDescriptor>> {
        self.record(Call::FindCall(rtc_session_id.to_string()));
        Ok(self
            .calls
            .lock()
            .expect("calls lock")
            .get(rtc_session_id)
            .cloned())
    }

    async fn start_conference(&self, conv_id: &str) -> Result<CallDescriptor> {
        self.record(Call::StartConference(conv_id.to_string()));
        let rtc_session_id = self
            .conversations
            .get(conv_id)
            .and_then(|c| c.rtc_session_id.clone())
            .ok_or_else(|| BotError::CallJoin(format!("no rtc session for {conv_id}")))?;
        let call = CallDescriptor {
            call_id: format!("call-{conv_id}"),
            conv_id: conv_id.to_string(),
            is_remote: false,
            local_audio: false,
        };
        self.calls
            .lock()
            .expect("calls lock")
            .insert(rtc_session_id, call.clone());
        Ok(call)
    }

    async fn join_conference(&self, call_id: &str) -> Result<()> {
        self.record(Call::JoinConference(call_id.to_string()));
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(BotError::CallJoin("call is busy".into()));
        }
        self.update_call(call_id, |call| call.is_remote = false)
    }

    async fn leave_conference(&self, call_id: &str) -> Result<()> {
        self.record(Call::LeaveConference(call_id.to_string()));
        if self.keep_calls_on_leave {
            return Ok(());
        }
        self.calls
            .lock()
            .expect("calls lock")
            .retain(|_, call| call.call_id != call_id);
        Ok(())
    }

    async fn attach_local_audio(&self, call_id: &str) -> Result<()> {
        self.record(Call::AttachLocalAudio(call_id.to_string()));
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(BotError::MediaDevice("no capture device".into()));
        }
        self.update_call(call_id, |call| call.local_audio = true)
    }

    async fn wait_media_connected(&self, _call_id: &str) {
        if !self.media_connected_signal {
            std::future::pending::<()>().await;
        }
    }
}
