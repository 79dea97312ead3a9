//! Common types shared by the router, the orchestrator and the platform adapters.

use serde::Deserialize;

/// The bot's own identity on the platform.
///
/// Replaced wholesale on every user-updated event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// Profile metadata published once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
    pub company: String,
}

/// A conversation the bot can post into.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conv_id: String,
    /// Session id of the real-time media session tied to this conversation.
    pub rtc_session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemText {
    pub content: Option<String>,
}

/// A single message posted into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: String,
    #[serde(default)]
    pub parent_item_id: Option<String>,
    pub conv_id: String,
    pub creator_id: String,
    #[serde(default)]
    pub text: Option<ItemText>,
}

impl Item {
    /// Text content of the item, if it carries any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.text
            .as_ref()
            .and_then(|text| text.content.as_deref())
            .filter(|content| !content.is_empty())
    }

    /// The item a reply should thread under: the thread root when this item is
    /// itself a reply, otherwise the item.
    #[must_use]
    pub fn reply_target(&self) -> &str {
        self.parent_item_id.as_deref().unwrap_or(&self.item_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CallState {
    Started,
    Active,
    #[serde(alias = "Terminated")]
    Ended,
    #[serde(other)]
    Other,
}

/// Call descriptor carried by call status events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub conv_id: String,
    pub state: CallState,
}

/// A call as reported by the platform's call lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub call_id: String,
    pub conv_id: String,
    /// The call runs elsewhere and has not been joined locally.
    pub is_remote: bool,
    /// A local audio stream is attached to the call.
    pub local_audio: bool,
}

/// Event as delivered by the platform, before classification.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub item: Option<Item>,
    #[serde(default)]
    pub call: Option<CallInfo>,
    #[serde(default)]
    pub user: Option<Identity>,
}

/// Classified inbound platform event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    ItemAdded(Item),
    ItemUpdated(Item),
    CallStatus(CallInfo),
    UserUpdated(Identity),
    Unclassified(String),
}

impl InboundEvent {
    /// Category name used in logs.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            InboundEvent::ItemAdded(_) => "itemAdded",
            InboundEvent::ItemUpdated(_) => "itemUpdated",
            InboundEvent::CallStatus(_) => "callStatus",
            InboundEvent::UserUpdated(_) => "userUpdated",
            InboundEvent::Unclassified(kind) => kind,
        }
    }
}

impl From<RawEvent> for InboundEvent {
    fn from(raw: RawEvent) -> Self {
        match (raw.kind.as_str(), raw.item, raw.call, raw.user) {
            ("itemAdded", Some(item), _, _) => InboundEvent::ItemAdded(item),
            ("itemUpdated", Some(item), _, _) => InboundEvent::ItemUpdated(item),
            ("callStatus", _, Some(call), _) => InboundEvent::CallStatus(call),
            ("userUpdated", _, _, Some(user)) => InboundEvent::UserUpdated(user),
            _ => InboundEvent::Unclassified(raw.kind),
        }
    }
}

/// Outbound message item. The content is always rich text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub parent_id: Option<String>,
    pub subject: Option<String>,
    pub content: String,
}

impl TextItem {
    /// Rich-text item, threaded under `parent_id` when one is given.
    pub fn rich(parent_id: Option<&str>, subject: Option<&str>, content: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.map(str::to_string),
            subject: subject.map(str::to_string),
            content: content.into(),
        }
    }
}
