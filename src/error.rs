use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Serenity error: {0}")]
    Serenity(Box<poise::serenity_prelude::Error>),

    #[error("Voice connection error: {0}")]
    Join(#[from] songbird::error::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Logon failed: {0}")]
    Logon(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Conversation {0} has no RTC session")]
    NoRtcSession(String),

    #[error("Failed to join call: {0}")]
    CallJoin(String),

    #[error("Media device error: {0}")]
    MediaDevice(String),

    #[error("Failed to send item: {0}")]
    Send(String),

    #[error("Media host channel is closed")]
    SignalClosed,

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<poise::serenity_prelude::Error> for BotError {
    fn from(err: poise::serenity_prelude::Error) -> Self {
        BotError::Serenity(Box::new(err))
    }
}

impl BotError {
    /// Whether the error ends the process when raised during startup.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::Logon(_)
                | BotError::ConversationNotFound(_)
                | BotError::Config(_)
                | BotError::EnvVar(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
