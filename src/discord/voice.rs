//! Remote call audio received through Songbird.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use poise::serenity_prelude::{ChannelId, Http};
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler};
use songbird::{CoreEvent, Songbird};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::capture::{AudioFormat, RemoteAudio};
use crate::error::{BotError, Result};

/// Songbird decodes every speaker to 48 kHz stereo.
pub const FORMAT: AudioFormat = AudioFormat {
    sample_rate: 48_000,
    channels: 2,
};

/// Interleaved samples in one 20 ms voice tick.
const TICK_SAMPLES: usize = 960 * 2;

/// Frames buffered between the voice driver and the recorder.
const FRAME_BUFFER: usize = 256;

pub struct DiscordVoice {
    http: Arc<Http>,
    manager: Arc<Songbird>,
}

impl DiscordVoice {
    #[must_use]
    pub fn new(http: Arc<Http>, manager: Arc<Songbird>) -> Self {
        Self { http, manager }
    }
}

#[async_trait]
impl RemoteAudio for DiscordVoice {
    fn format(&self) -> AudioFormat {
        FORMAT
    }

    async fn subscribe(&self, rtc_session_id: &str) -> Result<mpsc::Receiver<Vec<i16>>> {
        let channel_id = rtc_session_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(ChannelId::new)
            .ok_or_else(|| BotError::MediaDevice(format!("invalid channel id {rtc_session_id}")))?;
        let guild_id = channel_id
            .to_channel(&self.http)
            .await?
            .guild()
            .map(|channel| channel.guild_id)
            .ok_or_else(|| BotError::MediaDevice(format!("{channel_id} is not in a guild")))?;
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| BotError::MediaDevice(format!("no voice connection in {guild_id}")))?;

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let mut handler = call.lock().await;
        handler.remove_all_global_events();
        handler.add_global_event(CoreEvent::VoiceTick.into(), Receiver { frames: tx });
        info!("Receiving audio from voice channel {channel_id}");
        Ok(rx)
    }
}

struct Receiver {
    frames: mpsc::Sender<Vec<i16>>,
}

#[async_trait]
impl VoiceEventHandler for Receiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::VoiceTick(tick) = ctx else {
            return None;
        };
        let frame = mix(
            tick.speaking
                .values()
                .filter_map(|data| data.decoded_voice.as_deref()),
        );
        match self.frames.try_send(frame) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => {
                debug!("Recorder is behind, dropping a voice frame");
                None
            }
            Err(TrySendError::Closed(_)) => Some(Event::Cancel),
        }
    }
}

/// Sum the decoded voices of one tick into a single frame. A tick without
/// speakers yields silence so the recording keeps wall-clock length.
fn mix<'a>(voices: impl Iterator<Item = &'a [i16]>) -> Vec<i16> {
    let mut frame = vec![0_i16; TICK_SAMPLES];
    for voice in voices {
        if voice.len() > frame.len() {
            frame.resize(voice.len(), 0);
        }
        for (out, sample) in frame.iter_mut().zip(voice) {
            *out = out.saturating_add(*sample);
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_fills_an_empty_tick() {
        let frame = mix(std::iter::empty());
        assert_eq!(frame.len(), TICK_SAMPLES);
        assert!(frame.iter().all(|s| *s == 0));
    }

    #[test]
    fn voices_are_summed_with_saturation() {
        let a = [100_i16, i16::MAX, -5];
        let b = [1_i16, 10, -5];
        let frame = mix([&a[..], &b[..]].into_iter());
        assert_eq!(&frame[..3], &[101, i16::MAX, -10]);
        assert_eq!(frame.len(), TICK_SAMPLES);
    }
}
