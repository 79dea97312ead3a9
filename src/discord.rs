//! Discord binding of the platform seams: text channels and voice channels
//! act as conversations, Songbird voice connections act as calls.

pub mod events;
pub mod markup;
mod platform;
mod voice;

pub use events::classify;
pub use platform::DiscordPlatform;
pub use voice::DiscordVoice;
