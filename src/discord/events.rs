//! Gateway events translated into platform events for the router.

use poise::serenity_prelude::{
    Cache, ChannelId, Context, FullEvent, GuildId, Message, VoiceState,
};

use crate::types::{CallInfo, CallState, Identity, InboundEvent, Item, ItemText, RawEvent};

use super::markup::{display_name, to_rich_text};

/// Translate one gateway event. A voice channel move can end one call and
/// start another, so several events may come out.
#[must_use]
pub fn classify(ctx: &Context, event: &FullEvent) -> Vec<InboundEvent> {
    let raw = match event {
        FullEvent::Message { new_message } => vec![item_event("itemAdded", new_message)],
        FullEvent::MessageUpdate {
            new: Some(message), ..
        } => vec![item_event("itemUpdated", message)],
        FullEvent::VoiceStateUpdate { old, new } => voice_state_events(ctx, old.as_ref(), new),
        FullEvent::UserUpdate { new, .. } => vec![RawEvent {
            user: Some(Identity {
                user_id: new.id.to_string(),
                display_name: display_name(new),
            }),
            ..raw("userUpdated")
        }],
        other => vec![raw(other.snake_case_name())],
    };
    raw.into_iter().map(InboundEvent::from).collect()
}

/// Human participants in a voice channel, according to the gateway cache.
pub fn humans_in(cache: &Cache, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let me = cache.current_user().id;
    cache.guild(guild_id).map_or(0, |guild| {
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != me)
            .filter(|state| state.member.as_ref().is_none_or(|m| !m.user.bot))
            .count()
    })
}

fn raw(kind: &str) -> RawEvent {
    RawEvent {
        kind: kind.to_string(),
        item: None,
        call: None,
        user: None,
    }
}

fn item_event(kind: &str, message: &Message) -> RawEvent {
    RawEvent {
        item: Some(item(message)),
        ..raw(kind)
    }
}

fn item(message: &Message) -> Item {
    Item {
        item_id: message.id.to_string(),
        parent_item_id: message
            .message_reference
            .as_ref()
            .and_then(|reference| reference.message_id)
            .map(|id| id.to_string()),
        conv_id: message.channel_id.to_string(),
        creator_id: message.author.id.to_string(),
        text: Some(ItemText {
            content: Some(to_rich_text(&message.content, &message.mentions)),
        }),
    }
}

fn voice_state_events(ctx: &Context, old: Option<&VoiceState>, new: &VoiceState) -> Vec<RawEvent> {
    let is_bot = new.member.as_ref().is_some_and(|m| m.user.bot)
        || new.user_id == ctx.cache.current_user().id;
    let Some(guild_id) = new.guild_id.filter(|_| !is_bot) else {
        return vec![raw("voice_state_update")];
    };
    let old_channel = old.and_then(|state| state.channel_id);
    let transitions = call_transitions(old_channel, new.channel_id, |channel_id| {
        humans_in(&ctx.cache, guild_id, channel_id)
    });
    if transitions.is_empty() {
        return vec![raw("voice_state_update")];
    }
    transitions
        .into_iter()
        .map(|call| RawEvent {
            call: Some(call),
            ..raw("callStatus")
        })
        .collect()
}

/// Calls that ended or started when a participant moved from `old` to `new`.
/// `humans` counts participants after the move.
fn call_transitions(
    old: Option<ChannelId>,
    new: Option<ChannelId>,
    humans: impl Fn(ChannelId) -> usize,
) -> Vec<CallInfo> {
    if old == new {
        return Vec::new();
    }
    let mut calls = Vec::new();
    if let Some(left) = old
        && humans(left) == 0
    {
        calls.push(CallInfo {
            conv_id: left.to_string(),
            state: CallState::Ended,
        });
    }
    if let Some(joined) = new
        && humans(joined) == 1
    {
        calls.push(CallInfo {
            conv_id: joined.to_string(),
            state: CallState::Started,
        });
    }
    calls
}
