//! [`Platform`] implementation backed by the Discord HTTP API, the gateway
//! cache and Songbird voice connections.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use poise::serenity_prelude::{
    ActivityData, Cache, Channel, ChannelId, ChannelType, Context, CreateMessage, GuildId, Http,
    MessageId, OnlineStatus, Ready, ShardMessenger, UserId,
};
use songbird::Songbird;
use tokio::sync::Mutex;

use crate::error::{BotError, Result};
use crate::platform::Platform;
use crate::types::{CallDescriptor, Conversation, Identity, Profile, TextItem};

use super::events::humans_in;
use super::markup::{display_name, to_markdown};

pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    shard: ShardMessenger,
    manager: Arc<Songbird>,
    identity: Identity,
    /// Voice channels where the bot's audio is attached.
    attached: Mutex<HashSet<ChannelId>>,
}

impl DiscordPlatform {
    #[must_use]
    pub fn new(ctx: &Context, ready: &Ready, manager: Arc<Songbird>) -> Self {
        Self {
            http: ctx.http.clone(),
            cache: ctx.cache.clone(),
            shard: ctx.shard.clone(),
            manager,
            identity: Identity {
                user_id: ready.user.id.to_string(),
                display_name: display_name(&ready.user),
            },
            attached: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve a voice channel id to its guild and channel.
    async fn voice_channel(&self, id: &str) -> Result<(GuildId, ChannelId)> {
        let channel_id =
            parse_channel_id(id).ok_or_else(|| BotError::CallJoin(format!("invalid channel id {id}")))?;
        let channel = channel_id.to_channel(&self.http).await?;
        match channel.guild() {
            Some(channel) if is_voice(channel.kind) => Ok((channel.guild_id, channel.id)),
            _ => Err(BotError::CallJoin(format!("{id} is not a voice channel"))),
        }
    }

    async fn is_connected(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        match self.manager.get(guild_id) {
            Some(call) => {
                call.lock().await.current_channel() == Some(songbird::id::ChannelId::from(channel_id))
            }
            None => false,
        }
    }

    async fn connect(&self, id: &str) -> Result<CallDescriptor> {
        let (guild_id, channel_id) = self.voice_channel(id).await?;
        info!("Joining voice channel {channel_id} in guild {guild_id}");
        self.manager.join(guild_id, channel_id).await?;
        self.attached.lock().await.remove(&channel_id);
        Ok(local_call(channel_id, false))
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    /// The gateway session is established before the platform exists, so
    /// logging on only reports who the bot is.
    async fn logon(&self) -> Result<Identity> {
        if self.identity.user_id.is_empty() {
            return Err(BotError::Logon("gateway reported no current user".to_string()));
        }
        Ok(self.identity.clone())
    }

    async fn update_user(&self, profile: &Profile) -> Result<()> {
        let status = match (profile.job_title.as_str(), profile.company.as_str()) {
            ("", "") => None,
            (title, "") => Some(title.to_string()),
            ("", company) => Some(company.to_string()),
            (title, company) => Some(format!("{title} at {company}")),
        };
        debug!("Setting presence to {status:?}");
        self.shard
            .set_presence(status.map(ActivityData::custom), OnlineStatus::Online);
        Ok(())
    }

    async fn get_conversation_by_id(&self, conv_id: &str) -> Result<Option<Conversation>> {
        let Some(channel_id) = parse_channel_id(conv_id) else {
            return Ok(None);
        };
        match channel_id.to_channel(&self.http).await {
            Ok(channel) => Ok(Some(conversation(&channel))),
            Err(e) => {
                debug!("Channel {conv_id} unavailable: {e}");
                Ok(None)
            }
        }
    }

    /// Discord opens direct channels idempotently, so this never misses.
    async fn get_direct_conversation(&self, owner: &str) -> Result<Option<Conversation>> {
        self.create_direct_conversation(owner).await.map(Some)
    }

    async fn create_direct_conversation(&self, owner: &str) -> Result<Conversation> {
        let owner_id = owner
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(UserId::new)
            .ok_or_else(|| BotError::ConversationNotFound(format!("invalid owner id {owner}")))?;
        let channel = owner_id.create_dm_channel(&self.http).await?;
        Ok(Conversation {
            conv_id: channel.id.to_string(),
            rtc_session_id: None,
        })
    }

    async fn add_text_item(&self, conv_id: &str, item: TextItem) -> Result<()> {
        let channel_id = parse_channel_id(conv_id)
            .ok_or_else(|| BotError::Send(format!("invalid channel id {conv_id}")))?;
        let mut message = CreateMessage::new().content(to_markdown(&item));
        if let Some(parent) = item.parent_id.as_deref().and_then(parse_message_id) {
            message = message.reference_message((channel_id, parent));
        }
        channel_id
            .send_message(&self.http, message)
            .await
            .map_err(|e| BotError::Send(e.to_string()))?;
        Ok(())
    }

    async fn find_call(&self, rtc_session_id: &str) -> Result<Option<CallDescriptor>> {
        let (guild_id, channel_id) = self.voice_channel(rtc_session_id).await?;
        if self.is_connected(guild_id, channel_id).await {
            let attached = self.attached.lock().await.contains(&channel_id);
            return Ok(Some(local_call(channel_id, attached)));
        }
        if humans_in(&self.cache, guild_id, channel_id) > 0 {
            return Ok(Some(CallDescriptor {
                call_id: channel_id.to_string(),
                conv_id: channel_id.to_string(),
                is_remote: true,
                local_audio: false,
            }));
        }
        Ok(None)
    }

    async fn start_conference(&self, conv_id: &str) -> Result<CallDescriptor> {
        self.connect(conv_id).await
    }

    async fn join_conference(&self, call_id: &str) -> Result<()> {
        self.connect(call_id).await.map(|_| ())
    }

    async fn leave_conference(&self, call_id: &str) -> Result<()> {
        let (guild_id, channel_id) = self.voice_channel(call_id).await?;
        self.attached.lock().await.remove(&channel_id);
        self.manager.leave(guild_id).await?;
        info!("Left voice channel {channel_id} in guild {guild_id}");
        Ok(())
    }

    async fn attach_local_audio(&self, call_id: &str) -> Result<()> {
        let (guild_id, channel_id) = self
            .voice_channel(call_id)
            .await
            .map_err(|e| BotError::MediaDevice(e.to_string()))?;
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| BotError::MediaDevice(format!("no voice connection in {guild_id}")))?;
        {
            let mut handler = call.lock().await;
            handler
                .deafen(false)
                .await
                .map_err(|e| BotError::MediaDevice(e.to_string()))?;
            handler
                .mute(false)
                .await
                .map_err(|e| BotError::MediaDevice(e.to_string()))?;
        }
        self.attached.lock().await.insert(channel_id);
        Ok(())
    }

    /// Songbird resolves a join only once the voice connection is up.
    async fn wait_media_connected(&self, call_id: &str) {
        if let Ok((guild_id, channel_id)) = self.voice_channel(call_id).await
            && !self.is_connected(guild_id, channel_id).await
        {
            warn!("Voice connection to {channel_id} is not up yet");
            std::future::pending::<()>().await;
        }
    }
}

fn parse_channel_id(id: &str) -> Option<ChannelId> {
    id.parse::<u64>().ok().filter(|id| *id != 0).map(ChannelId::new)
}

fn parse_message_id(id: &str) -> Option<MessageId> {
    id.parse::<u64>().ok().filter(|id| *id != 0).map(MessageId::new)
}

fn is_voice(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Voice | ChannelType::Stage)
}

fn conversation(channel: &Channel) -> Conversation {
    let rtc_session_id = match channel {
        Channel::Guild(channel) if is_voice(channel.kind) => Some(channel.id.to_string()),
        _ => None,
    };
    Conversation {
        conv_id: channel.id().to_string(),
        rtc_session_id,
    }
}

fn local_call(channel_id: ChannelId, local_audio: bool) -> CallDescriptor {
    CallDescriptor {
        call_id: channel_id.to_string(),
        conv_id: channel_id.to_string(),
        is_remote: false,
        local_audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_nonzero_numbers() {
        assert_eq!(parse_channel_id("42"), Some(ChannelId::new(42)));
        assert_eq!(parse_channel_id("0"), None);
        assert_eq!(parse_channel_id("general"), None);
        assert_eq!(parse_message_id("7"), Some(MessageId::new(7)));
    }

    #[test]
    fn local_calls_use_the_channel_id() {
        let call = local_call(ChannelId::new(9), true);
        assert_eq!(call.call_id, "9");
        assert_eq!(call.conv_id, "9");
        assert!(!call.is_remote);
        assert!(call.local_audio);
    }

    #[test]
    fn stage_and_voice_channels_carry_calls() {
        assert!(is_voice(ChannelType::Voice));
        assert!(is_voice(ChannelType::Stage));
        assert!(!is_voice(ChannelType::Text));
    }
}
