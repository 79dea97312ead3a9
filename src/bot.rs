//! Bot startup and Discord wiring.

use std::error::Error as StdError;
use std::sync::Arc;

use log::{debug, error, info, warn};
use poise::{
    Framework, FrameworkOptions,
    serenity_prelude::{ClientBuilder, Context, FullEvent, GatewayIntents},
};
use songbird::driver::DecodeMode;
use songbird::{SerenityInit, Songbird};
use tokio::sync::{OnceCell, oneshot};

use crate::capture::{CapturePipeline, FileSink};
use crate::config::Config;
use crate::discord::{self, DiscordPlatform, DiscordVoice};
use crate::error::{BotError, Result};
use crate::platform::Platform;
use crate::router::{ReplyTarget, Router, handlers};
use crate::session::ConversationSession;
use crate::stream::{CallStreamOrchestrator, StreamSettings, signal_channel};
use crate::types::Profile;

type EventResult = std::result::Result<(), Box<dyn StdError + Send + Sync>>;

struct Data {
    router: Arc<Router<DiscordPlatform>>,
}

/// Log on, publish the profile, resolve the conversation and say hi.
///
/// # Errors
///
/// Any failure here leaves the bot unusable and should end the process.
pub async fn start_up<P: Platform>(router: &Router<P>, profile: &Profile, nick_name: &str) -> Result<()> {
    info!("Logging on");
    let identity = router
        .platform()
        .logon()
        .await
        .map_err(|e| match e {
            BotError::Logon(_) => e,
            other => BotError::Logon(other.to_string()),
        })?;
    router.set_identity(identity).await;

    debug!("Updating user profile");
    router.platform().update_user(profile).await?;

    let conversation = router.conversation().await?;
    info!("Using conversation {}", conversation.conv_id);

    router
        .send(&ReplyTarget::default(), handlers::greeting(nick_name))
        .await?;
    info!("Bot is ready");
    Ok(())
}

/// Log a fatal startup error and end the process.
fn terminate(err: &BotError) -> ! {
    error!("Startup failed, terminating: {err}");
    std::process::exit(1)
}

/// Stop any active stream so its recording is written before exit.
async fn shut_down<P: Platform>(router: &Router<P>) {
    let Some(session) = router.orchestrator().session().await else {
        return;
    };
    info!("Stopping stream for {} before exit", session.conversation_id);
    if let Err(e) = router.orchestrator().stop(&session.conversation_id).await {
        warn!("Failed to leave call on shutdown: {e}");
    }
}

/// Run the Discord bot.
pub async fn run() -> Result<()> {
    info!("Initializing bot");
    let config = Config::from_env()?;

    debug!("Setting up gateway intents");
    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;

    debug!("Configuring voice receive");
    let manager = Songbird::serenity_from_config(
        songbird::Config::default().decode_mode(DecodeMode::Decode),
    );

    let (signals, signal_rx) = signal_channel();
    let router_slot: Arc<OnceCell<Arc<Router<DiscordPlatform>>>> = Arc::default();

    debug!("Building framework");
    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |ctx, event, _framework, data| Box::pin(event_handler(ctx, event, data)),
            ..Default::default()
        })
        .setup({
            let config = config.clone();
            let manager = manager.clone();
            let router_slot = router_slot.clone();
            move |ctx, ready, _framework| {
                Box::pin(async move {
                    info!("Connected to Discord as {}", ready.user.name);
                    let platform = Arc::new(DiscordPlatform::new(ctx, ready, manager));
                    let settings = StreamSettings {
                        keepalive_interval: config.keepalive_interval,
                        settle_delay: config.settle_delay,
                    };
                    let orchestrator =
                        CallStreamOrchestrator::new(platform.clone(), signals, settings);
                    let session = ConversationSession::new(config.conversation.clone());
                    let router = Router::new(platform, session, orchestrator);

                    if let Err(e) = start_up(&router, &config.profile, &config.nick_name).await {
                        terminate(&e);
                    }
                    if router_slot.set(router.clone()).is_err() {
                        warn!("Setup ran more than once");
                    }
                    Ok(Data { router })
                })
            }
        })
        .build();

    debug!("Creating Discord client");
    let mut client = ClientBuilder::new(config.discord_token.clone(), intents)
        .framework(framework)
        .register_songbird_with(manager.clone())
        .await?;

    debug!("Starting capture pipeline");
    let pipeline = CapturePipeline::new(
        DiscordVoice::new(client.http.clone(), manager),
        FileSink::new(config.recordings_dir.clone()),
        config.chunk_interval,
    );
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let capture = tokio::spawn(pipeline.run(signal_rx, shutdown_rx));

    info!("Starting Discord client");

    tokio::select! {
        result = client.start() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down...");
            if let Some(router) = router_slot.get() {
                shut_down(router).await;
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = capture.await {
        error!("Capture pipeline panicked: {e}");
    }

    Ok(())
}

async fn event_handler(ctx: &Context, event: &FullEvent, data: &Data) -> EventResult {
    for inbound in discord::classify(ctx, event) {
        let router = data.router.clone();
        tokio::spawn(async move { router.route(inbound).await });
    }
    Ok(())
}
