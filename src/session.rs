//! Resolves the single conversation the bot operates in.

use log::{debug, info};
use tokio::sync::OnceCell;

use crate::error::{BotError, Result};
use crate::platform::Platform;
use crate::types::Conversation;

/// Where the bot's conversation comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    /// A configured conversation that must already exist.
    Id(String),
    /// The direct conversation with the bot owner, created on demand.
    DirectWith(String),
}

/// Lazily resolved, process-lifetime conversation.
#[derive(Debug)]
pub struct ConversationSession {
    target: ConversationTarget,
    cached: OnceCell<Conversation>,
}

impl ConversationSession {
    #[must_use]
    pub fn new(target: ConversationTarget) -> Self {
        Self {
            target,
            cached: OnceCell::new(),
        }
    }

    /// Resolve the conversation, memoizing the first success.
    ///
    /// # Errors
    ///
    /// Returns `ConversationNotFound` when a configured conversation id does
    /// not exist, or any platform error raised while resolving.
    pub async fn resolve<P: Platform + ?Sized>(&self, platform: &P) -> Result<&Conversation> {
        self.cached
            .get_or_try_init(|| self.fetch(platform))
            .await
    }

    /// The conversation, if it has already been resolved.
    #[must_use]
    pub fn cached(&self) -> Option<&Conversation> {
        self.cached.get()
    }

    async fn fetch<P: Platform + ?Sized>(&self, platform: &P) -> Result<Conversation> {
        match &self.target {
            ConversationTarget::Id(conv_id) => {
                debug!("Fetching conversation {conv_id}");
                let conversation = platform
                    .get_conversation_by_id(conv_id)
                    .await?
                    .ok_or_else(|| BotError::ConversationNotFound(conv_id.clone()))?;
                info!("Conversation {} exists", conversation.conv_id);
                Ok(conversation)
            }
            ConversationTarget::DirectWith(owner) => {
                debug!("Looking up direct conversation with {owner}");
                if let Some(conversation) = platform.get_direct_conversation(owner).await? {
                    info!("Conversation {} exists", conversation.conv_id);
                    return Ok(conversation);
                }
                info!("Conversation does not exist, creating direct conversation with {owner}");
                platform.create_direct_conversation(owner).await
            }
        }
    }
}
