//! Media capture pipeline: the host-side counterpart of the stream
//! orchestrator. Records a call's remote audio in timed chunks and writes one
//! assembled file when the stream stops.

mod pipeline;
mod recorder;
mod sink;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use pipeline::CapturePipeline;
pub use recorder::{Recorder, Recording};
pub use sink::{AudioSink, FileSink};

/// PCM layout of the frames a [`RemoteAudio`] source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Source of a call's remote audio.
#[async_trait]
pub trait RemoteAudio: Send + Sync + 'static {
    fn format(&self) -> AudioFormat;

    /// Subscribe to the mixed remote audio of the call bound to
    /// `rtc_session_id`. Frames are interleaved signed 16-bit PCM.
    async fn subscribe(&self, rtc_session_id: &str) -> Result<mpsc::Receiver<Vec<i16>>>;
}
