//! Boundary between the bot core and the collaboration platform.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CallDescriptor, Conversation, Identity, Profile, TextItem};

/// Platform operations the core relies on. Implementations are assumed correct;
/// the core only sequences them.
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Identity of the logged-on bot account.
    async fn logon(&self) -> Result<Identity>;

    /// Publish profile metadata and mark the bot as available.
    async fn update_user(&self, profile: &Profile) -> Result<()>;

    async fn get_conversation_by_id(&self, conv_id: &str) -> Result<Option<Conversation>>;

    async fn get_direct_conversation(&self, owner: &str) -> Result<Option<Conversation>>;

    async fn create_direct_conversation(&self, owner: &str) -> Result<Conversation>;

    async fn add_text_item(&self, conv_id: &str, item: TextItem) -> Result<()>;

    /// Look up a call by the RTC session id of its conversation.
    async fn find_call(&self, rtc_session_id: &str) -> Result<Option<CallDescriptor>>;

    /// Start an audio-only call in the conversation.
    async fn start_conference(&self, conv_id: &str) -> Result<CallDescriptor>;

    /// Join a remote call, audio only.
    async fn join_conference(&self, call_id: &str) -> Result<()>;

    async fn leave_conference(&self, call_id: &str) -> Result<()>;

    /// Acquire the local audio device and attach it to the call.
    async fn attach_local_audio(&self, call_id: &str) -> Result<()>;

    /// Resolves once media negotiation for the call has completed.
    ///
    /// Platforms without such a signal never resolve; callers bound the wait
    /// with the settle delay.
    async fn wait_media_connected(&self, _call_id: &str) {
        std::future::pending::<()>().await;
    }
}
