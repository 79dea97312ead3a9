//! Consumes stream signals and drives the recorder.

use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;

use crate::error::Result;
use crate::stream::{SignalReceiver, StreamCommand, StreamSignal};

use super::recorder::{Recorder, Recording};
use super::{AudioSink, RemoteAudio};

/// Default interval at which buffered audio becomes a chunk.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(1500);

struct ActiveRecording {
    conversation_id: String,
    rtc_session_id: String,
    recorder: Recorder,
}

pub struct CapturePipeline<A: RemoteAudio, S: AudioSink> {
    audio: A,
    sink: S,
    chunk_interval: Duration,
    active: Option<ActiveRecording>,
    /// Recordings handed to the sink so far.
    saved: u32,
}

impl<A: RemoteAudio, S: AudioSink> CapturePipeline<A, S> {
    pub fn new(audio: A, sink: S, chunk_interval: Duration) -> Self {
        Self {
            audio,
            sink,
            chunk_interval,
            active: None,
            saved: 0,
        }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Handle signals until the sending side closes or `shutdown` resolves,
    /// then save any recording still in progress.
    ///
    /// Signals already queued when `shutdown` resolves are still handled.
    /// Dropping the shutdown sender counts as a shutdown request.
    pub async fn run(mut self, mut signals: SignalReceiver, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle(signal).await,
                    None => {
                        debug!("Signal channel closed");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    debug!("Shutdown requested, draining queued signals");
                    while let Ok(signal) = signals.try_recv() {
                        self.handle(signal).await;
                    }
                    break;
                }
            }
        }
        if let Err(e) = self.finish().await {
            error!("Failed to save recording on shutdown: {e}");
        }
    }

    pub async fn handle(&mut self, signal: StreamSignal) {
        debug!(
            "Received stream command {} for {}",
            signal.command, signal.conversation_id
        );
        let result = match signal.command {
            StreamCommand::Start => self.start(&signal).await,
            StreamCommand::Flush => {
                match &self.active {
                    Some(active) => active.recorder.request_data().await,
                    None => debug!("Flush requested with no recording"),
                }
                Ok(())
            }
            StreamCommand::Stop => self.finish().await,
        };
        if let Err(e) = result {
            error!("Stream command {} failed: {e}", signal.command);
        }
    }

    async fn start(&mut self, signal: &StreamSignal) -> Result<()> {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.rtc_session_id != signal.rtc_session_id)
        {
            warn!("Recording of another call still active, saving it first");
            self.finish().await?;
        }

        let frames = self.audio.subscribe(&signal.rtc_session_id).await?;
        match &self.active {
            Some(active) => {
                info!("Reattaching remote audio for {}", signal.rtc_session_id);
                active.recorder.attach(frames).await;
            }
            None => {
                self.active = Some(ActiveRecording {
                    conversation_id: signal.conversation_id.clone(),
                    rtc_session_id: signal.rtc_session_id.clone(),
                    recorder: Recorder::start(frames, self.chunk_interval),
                });
                info!("Recording setup for {}", signal.rtc_session_id);
            }
        }
        Ok(())
    }

    /// Stop the active recording, if any, and hand the file to the sink.
    async fn finish(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            debug!("Stop requested with no recording");
            return Ok(());
        };

        let recording = Recording {
            format: self.audio.format(),
            chunks: active.recorder.stop().await?,
        };
        info!(
            "Assembling {} samples for conversation {}",
            recording.sample_count(),
            active.conversation_id
        );
        self.saved += 1;
        let name = recording_file_name(&active.conversation_id, self.saved);
        self.sink.write(&name, recording.to_wav()?).await
    }
}

/// `<conversation>-<UTC timestamp in ms>-<sequence>.wav`, restricted to
/// filename-safe characters.
fn recording_file_name(conversation_id: &str, sequence: u32) -> String {
    let safe: String = conversation_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "{safe}-{}-{sequence}.wav",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ")
    )
}
