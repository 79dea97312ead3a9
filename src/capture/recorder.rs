//! Chunked recorder fed by a remote audio source.

use std::io::Cursor;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::error::{BotError, Result};

use super::AudioFormat;

const CONTROL_CAPACITY: usize = 8;

enum Control {
    Flush,
    Attach(mpsc::Receiver<Vec<i16>>),
    Stop(oneshot::Sender<Vec<Vec<i16>>>),
}

/// Accumulates frames and moves them into the chunk list on every interval,
/// on explicit flushes and on stop.
pub struct Recorder {
    control: mpsc::Sender<Control>,
    handle: JoinHandle<()>,
}

impl Recorder {
    #[must_use]
    pub fn start(frames: mpsc::Receiver<Vec<i16>>, chunk_interval: Duration) -> Self {
        let (control, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let handle = tokio::spawn(record(frames, control_rx, chunk_interval));
        info!("Media recording started");
        Self { control, handle }
    }

    /// Emit the buffered data as a chunk now.
    pub async fn request_data(&self) {
        if self.control.send(Control::Flush).await.is_err() {
            warn!("Recorder is no longer running");
        }
    }

    /// Replace the audio source, continuing the same recording.
    pub async fn attach(&self, frames: mpsc::Receiver<Vec<i16>>) {
        if self.control.send(Control::Attach(frames)).await.is_err() {
            warn!("Recorder is no longer running");
        }
    }

    /// Stop recording and return every chunk recorded.
    ///
    /// # Errors
    ///
    /// Returns `MediaDevice` if the recording task died.
    pub async fn stop(self) -> Result<Vec<Vec<i16>>> {
        let (reply, chunks) = oneshot::channel();
        self.control
            .send(Control::Stop(reply))
            .await
            .map_err(|_| BotError::MediaDevice("recorder stopped unexpectedly".into()))?;
        let chunks = chunks
            .await
            .map_err(|_| BotError::MediaDevice("recorder dropped its chunks".into()))?;
        if let Err(e) = self.handle.await {
            warn!("Recorder task ended abnormally: {e}");
        }
        info!("Recording stop");
        Ok(chunks)
    }
}

async fn record(
    mut frames: mpsc::Receiver<Vec<i16>>,
    mut control: mpsc::Receiver<Control>,
    chunk_interval: Duration,
) {
    let mut pending: Vec<i16> = Vec::new();
    let mut chunks: Vec<Vec<i16>> = Vec::new();
    let mut source_open = true;
    let mut ticker = interval_at(Instant::now() + chunk_interval, chunk_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = frames.recv(), if source_open => match frame {
                Some(frame) => pending.extend_from_slice(&frame),
                None => {
                    warn!("Remote audio source ended");
                    source_open = false;
                }
            },
            _ = ticker.tick() => flush(&mut pending, &mut chunks),
            command = control.recv() => match command {
                Some(Control::Flush) => flush(&mut pending, &mut chunks),
                Some(Control::Attach(source)) => {
                    debug!("Remote audio source replaced");
                    frames = source;
                    source_open = true;
                }
                Some(Control::Stop(reply)) => {
                    flush(&mut pending, &mut chunks);
                    let _ = reply.send(chunks);
                    return;
                }
                None => return,
            },
        }
    }
}

fn flush(pending: &mut Vec<i16>, chunks: &mut Vec<Vec<i16>>) {
    if pending.is_empty() {
        return;
    }
    debug!("Recording data available ({} samples)", pending.len());
    chunks.push(std::mem::take(pending));
}

/// Chunks of one recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub format: AudioFormat,
    pub chunks: Vec<Vec<i16>>,
}

impl Recording {
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Assemble all chunks into one 16-bit PCM WAV file.
    ///
    /// # Errors
    ///
    /// Returns `Wav` if encoding fails.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for sample in self.chunks.iter().flatten() {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(bytes)
    }
}
