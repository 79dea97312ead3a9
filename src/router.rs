//! Event classifier and router.

pub mod handlers;

use std::sync::Arc;

use lazy_regex::regex;
use log::{debug, error, info, warn};
use tokio::sync::RwLock;

use crate::command::{self, Command, CommandName};
use crate::error::{BotError, Result};
use crate::mention::{MentionFilter, strip_mention};
use crate::platform::Platform;
use crate::session::ConversationSession;
use crate::stream::CallStreamOrchestrator;
use crate::types::{CallInfo, CallState, Conversation, Identity, InboundEvent, Item, TextItem};

/// Where a reply goes: threaded under the triggering item, or into the
/// resolved conversation when there is no item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyTarget {
    pub conv_id: Option<String>,
    pub item_id: Option<String>,
}

impl ReplyTarget {
    #[must_use]
    pub fn item(item: &Item) -> Self {
        Self {
            conv_id: Some(item.conv_id.clone()),
            item_id: Some(item.reply_target().to_string()),
        }
    }
}

/// Session context plus the collaborators every handler needs.
pub struct Router<P: Platform> {
    platform: Arc<P>,
    identity: RwLock<Identity>,
    session: ConversationSession,
    orchestrator: Arc<CallStreamOrchestrator<P>>,
}

impl<P: Platform> Router<P> {
    #[must_use]
    pub fn new(
        platform: Arc<P>,
        session: ConversationSession,
        orchestrator: Arc<CallStreamOrchestrator<P>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            identity: RwLock::new(Identity::default()),
            session,
            orchestrator,
        })
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<CallStreamOrchestrator<P>> {
        &self.orchestrator
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Replace the bot identity wholesale.
    pub async fn set_identity(&self, identity: Identity) {
        info!(
            "Bot identity is now {} ({})",
            identity.display_name, identity.user_id
        );
        *self.identity.write().await = identity;
    }

    /// The bot's conversation, resolved on first use.
    ///
    /// # Errors
    ///
    /// See [`ConversationSession::resolve`].
    pub async fn conversation(&self) -> Result<&Conversation> {
        self.session.resolve(self.platform.as_ref()).await
    }

    /// Handle one event. Failures are logged and never reach the caller.
    pub async fn route(&self, event: InboundEvent) {
        info!("{} event received", event.category());
        debug!("{event:?}");

        let category = event.category().to_string();
        let result = match event {
            InboundEvent::ItemAdded(item) => self.process_item(&item, false).await,
            InboundEvent::ItemUpdated(item) => self.process_item(&item, true).await,
            InboundEvent::CallStatus(call) => self.process_call_status(&call).await,
            InboundEvent::UserUpdated(user) => {
                self.set_identity(user).await;
                Ok(())
            }
            InboundEvent::Unclassified(kind) => {
                info!("Unhandled event {kind}");
                Ok(())
            }
        };

        if let Err(e) = result {
            match e {
                BotError::Send(_) => warn!("Reply dropped while handling {category}: {e}"),
                BotError::CallJoin(_) | BotError::MediaDevice(_) => {
                    warn!("Stream not ready after {category}, keepalive will retry: {e}");
                }
                _ => error!("Failed to handle {category} event: {e}"),
            }
        }
    }

    async fn process_item(&self, item: &Item, updated: bool) -> Result<()> {
        let identity = self.identity().await;
        if item.creator_id == identity.user_id {
            debug!("Ignoring own item {}", item.item_id);
            return Ok(());
        }
        let Some(content) = item.content() else {
            return Ok(());
        };

        let text = if updated { latest_edit(content) } else { content };
        info!("Processing item {} with content [{text}]", item.item_id);

        if !MentionFilter::new(&identity).is_addressed_to_bot(text) {
            info!("Ignoring item {}: it is not for me", item.item_id);
            return Ok(());
        }

        let stripped = strip_mention(text);
        info!("Item is for me, processing [{stripped}]");
        self.execute(command::parse(stripped), ReplyTarget::item(item))
            .await
    }

    async fn process_call_status(&self, call: &CallInfo) -> Result<()> {
        info!(
            "Call in conversation {} is {:?}",
            call.conv_id, call.state
        );
        match call.state {
            CallState::Started => self.orchestrator.start(&call.conv_id).await,
            CallState::Ended => self.orchestrator.call_ended(&call.conv_id).await,
            CallState::Active | CallState::Other => Ok(()),
        }
    }

    /// Run a parsed command and send its reply.
    ///
    /// # Errors
    ///
    /// Returns send failures and stream orchestration errors.
    pub async fn execute(&self, command: Command, target: ReplyTarget) -> Result<()> {
        let parent = target.item_id.as_deref();
        let (name, parameters) = match command {
            Command::Known { name, parameters } => (name, parameters),
            Command::Unrecognized(text) => {
                info!("I do not understand [{text}]");
                return self
                    .send(&target, handlers::not_understood(parent, &text))
                    .await;
            }
        };

        debug!("Interpreting command {name} with params {parameters:?}");
        match name {
            CommandName::Status => self.send(&target, handlers::status(parent)).await,
            CommandName::Version => self.send(&target, handlers::version(parent)).await,
            CommandName::Help => {
                info!("Displaying help");
                self.send(&target, handlers::help(parent)).await
            }
            CommandName::StartStream => {
                let conv_id = self.target_conversation(&target).await?;
                self.orchestrator.start(&conv_id).await
            }
            CommandName::StopStream => {
                let conv_id = self.target_conversation(&target).await?;
                self.orchestrator.stop(&conv_id).await
            }
        }
    }

    /// Send an item to the target's conversation, or to the resolved one.
    ///
    /// # Errors
    ///
    /// Returns `Send` when the platform rejects the item.
    pub async fn send(&self, target: &ReplyTarget, item: TextItem) -> Result<()> {
        let conv_id = self.target_conversation(target).await?;
        self.platform
            .add_text_item(&conv_id, item)
            .await
            .map_err(|e| match e {
                BotError::Send(_) => e,
                other => BotError::Send(other.to_string()),
            })
    }

    async fn target_conversation(&self, target: &ReplyTarget) -> Result<String> {
        match &target.conv_id {
            Some(conv_id) => Ok(conv_id.clone()),
            None => Ok(self.conversation().await?.conv_id.clone()),
        }
    }
}

/// Content after the last edit separator: the latest revision of an edited item.
fn latest_edit(content: &str) -> &str {
    let separator = regex!(r"(?i)<hr\s*/?>");
    separator.split(content).last().unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::ConversationTarget;
    use crate::stream::{SignalReceiver, StreamCommand, StreamSettings, StreamState, signal_channel};
    use crate::testing::{Call, FakePlatform};
    use crate::types::ItemText;

    const MENTION: &str = r#"<span class="mention" abbr="bot-1">Bot</span>"#;

    struct Harness {
        platform: Arc<FakePlatform>,
        router: Arc<Router<FakePlatform>>,
        signals: SignalReceiver,
    }

    async fn harness(platform: FakePlatform) -> Harness {
        let platform = Arc::new(platform.with_conversation("c1", Some("rtc-1")));
        let (tx, signals) = signal_channel();
        let orchestrator =
            CallStreamOrchestrator::new(Arc::clone(&platform), tx, StreamSettings::default());
        let router = Router::new(
            Arc::clone(&platform),
            ConversationSession::new(ConversationTarget::Id("c1".into())),
            orchestrator,
        );
        router
            .set_identity(Identity {
                user_id: "bot-1".into(),
                display_name: "Bot".into(),
            })
            .await;
        Harness {
            platform,
            router,
            signals,
        }
    }

    fn item(creator: &str, content: &str) -> Item {
        Item {
            item_id: "i1".into(),
            parent_item_id: None,
            conv_id: "c1".into(),
            creator_id: creator.into(),
            text: Some(ItemText {
                content: Some(content.into()),
            }),
        }
    }

    #[tokio::test]
    async fn status_command_replies_on() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::ItemAdded(item("u1", &format!("{MENTION} status"))))
            .await;

        let sent = h.platform.sent();
        assert_eq!(sent.len(), 1);
        let (conv_id, reply) = &sent[0];
        assert_eq!(conv_id, "c1");
        assert_eq!(reply.parent_id.as_deref(), Some("i1"));
        assert!(reply.content.contains("Status"));
        assert!(reply.content.contains("On"));
    }

    #[tokio::test]
    async fn reply_threads_under_parent_item() {
        let h = harness(FakePlatform::new()).await;
        let mut reply_item = item("u1", &format!("{MENTION} version"));
        reply_item.parent_item_id = Some("root".into());

        h.router.route(InboundEvent::ItemAdded(reply_item)).await;

        assert_eq!(h.platform.sent()[0].1.parent_id.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn message_without_mention_is_ignored() {
        let h = harness(FakePlatform::new()).await;

        h.router.route(InboundEvent::ItemAdded(item("u1", "foo bar"))).await;

        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn own_items_are_never_processed() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::ItemAdded(item("bot-1", &format!("{MENTION} status"))))
            .await;
        h.router
            .route(InboundEvent::ItemUpdated(item("bot-1", &format!("x<hr/>{MENTION} help"))))
            .await;

        assert!(h.platform.sent().is_empty());
        assert_eq!(h.platform.count(|c| matches!(c, Call::GetConversation(_))), 0);
    }

    #[tokio::test]
    async fn item_without_text_is_ignored() {
        let h = harness(FakePlatform::new()).await;
        let mut empty = item("u1", "");
        empty.text = None;

        h.router.route(InboundEvent::ItemAdded(empty)).await;

        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn updated_item_parses_only_latest_edit() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::ItemUpdated(item(
                "u1",
                &format!("{MENTION} status<hr/>{MENTION} new command text"),
            )))
            .await;

        let sent = h.platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.content,
            "I do not understand <b>[new command text]</b>"
        );
    }

    #[test]
    fn latest_edit_takes_last_revision() {
        assert_eq!(latest_edit("old<hr/>new command text"), "new command text");
        assert_eq!(latest_edit("a<hr>b<HR />c"), "c");
        assert_eq!(latest_edit("unchanged"), "unchanged");
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::ItemAdded(item("u1", &format!("{MENTION} help"))))
            .await;

        let reply = &h.platform.sent()[0].1;
        assert_eq!(reply.subject.as_deref(), Some("HELP"));
        for name in ["status", "version", "help", "start-stream", "stop-stream"] {
            assert!(reply.content.contains(name), "help is missing {name}");
        }
    }

    #[tokio::test]
    async fn empty_command_is_not_understood() {
        let h = harness(FakePlatform::new()).await;

        h.router.route(InboundEvent::ItemAdded(item("u1", MENTION))).await;

        assert_eq!(
            h.platform.sent()[0].1.content,
            "I do not understand <b>[]</b>"
        );
    }

    #[tokio::test]
    async fn send_failure_is_contained() {
        let h = harness(FakePlatform::new()).await;
        h.platform.fail_send(true);

        h.router
            .route(InboundEvent::ItemAdded(item("u1", &format!("{MENTION} status"))))
            .await;

        assert_eq!(h.platform.count(|c| matches!(c, Call::AddTextItem(_))), 1);
        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn execute_without_item_replies_to_resolved_conversation() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .execute(command::parse("status"), ReplyTarget::default())
            .await
            .expect("sent");

        let (conv_id, reply) = &h.platform.sent()[0];
        assert_eq!(conv_id, "c1");
        assert!(reply.parent_id.is_none());
    }

    #[tokio::test]
    async fn user_update_replaces_identity() {
        let h = harness(FakePlatform::new()).await;
        let renamed = Identity {
            user_id: "bot-1".into(),
            display_name: "Recorder".into(),
        };

        h.router
            .route(InboundEvent::UserUpdated(renamed.clone()))
            .await;
        assert_eq!(h.router.identity().await, renamed);

        h.router
            .route(InboundEvent::ItemAdded(item(
                "u1",
                r#"<span class="mention">Bot</span> status"#,
            )))
            .await;
        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn call_started_streams_with_one_timer() {
        let mut h = harness(FakePlatform::new()).await;
        let started = || {
            InboundEvent::CallStatus(CallInfo {
                conv_id: "c1".into(),
                state: CallState::Started,
            })
        };

        h.router.route(started()).await;
        assert_eq!(h.router.orchestrator().state().await, StreamState::Streaming);
        assert!(h.router.orchestrator().keepalive_armed().await);

        h.router.route(started()).await;
        let before = h.platform.count(|c| matches!(c, Call::FindCall(_)));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(h.platform.count(|c| matches!(c, Call::FindCall(_))), before + 1);

        let first = h.signals.try_recv().map(|s| s.command);
        assert_eq!(first, Ok(StreamCommand::Start));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_commands_drive_orchestrator() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::ItemAdded(item("u1", &format!("{MENTION} start-stream"))))
            .await;
        assert_eq!(h.router.orchestrator().state().await, StreamState::Streaming);

        h.router
            .route(InboundEvent::ItemAdded(item("u1", &format!("{MENTION} stop-stream"))))
            .await;
        assert_eq!(h.router.orchestrator().state().await, StreamState::Idle);
        assert!(!h.router.orchestrator().keepalive_armed().await);
        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn call_ended_stops_stream() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::CallStatus(CallInfo {
                conv_id: "c1".into(),
                state: CallState::Started,
            }))
            .await;
        h.router
            .route(InboundEvent::CallStatus(CallInfo {
                conv_id: "c1".into(),
                state: CallState::Ended,
            }))
            .await;

        assert!(!h.router.orchestrator().keepalive_armed().await);
    }

    #[tokio::test]
    async fn unclassified_event_has_no_side_effect() {
        let h = harness(FakePlatform::new()).await;

        h.router
            .route(InboundEvent::Unclassified("presenceChanged".into()))
            .await;

        assert_eq!(h.platform.count(|_| true), 0);
    }
}
