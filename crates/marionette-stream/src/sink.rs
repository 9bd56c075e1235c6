//! Audio output sinks
//!
//! The audio server hands every negotiated stream to an [`AudioSink`]. Nodes
//! with an I2S amplifier implement it over their output driver; the sinks
//! here record, write to a file or discard.

use async_trait::async_trait;
use marionette_core::AudioHeader;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::error::{Result, StreamError};

/// Bit depths an I2S output can be configured for
pub const SUPPORTED_BITS: [u32; 2] = [16, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    Stereo,
}

impl ChannelMode {
    pub fn channels(self) -> u32 {
        match self {
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }
}

/// Output configuration negotiated from a stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub mode: ChannelMode,
    pub bits_per_sample: u32,
}

impl AudioFormat {
    pub fn from_header(header: &AudioHeader) -> Result<Self> {
        let mode = match header.channels {
            1 => ChannelMode::Mono,
            2 => ChannelMode::Stereo,
            n => {
                return Err(StreamError::UnsupportedFormat(format!("{} channels", n)));
            }
        };
        Ok(Self {
            sample_rate: header.sample_rate,
            mode,
            bits_per_sample: header.bits_per_sample,
        })
    }
}

#[async_trait]
pub trait AudioSink: Send {
    /// Whether the output can play `format`
    fn supports(&self, format: &AudioFormat) -> bool {
        SUPPORTED_BITS.contains(&format.bits_per_sample)
    }

    /// Configure the output for a new stream
    async fn open(&mut self, format: AudioFormat) -> Result<()>;

    /// Play one packet of interleaved PCM
    async fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Flush and release the output at the end of a stream
    async fn close(&mut self) -> Result<()>;
}

/// One stream captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub format: AudioFormat,
    pub packets: Vec<Vec<u8>>,
    pub closed: bool,
}

impl Recording {
    pub fn bytes(&self) -> usize {
        self.packets.iter().map(Vec::len).sum()
    }

    /// Sample frames received
    pub fn samples(&self) -> usize {
        let frame = (self.format.bits_per_sample / 8 * self.format.mode.channels()) as usize;
        if frame == 0 {
            return 0;
        }
        self.bytes() / frame
    }
}

/// Records every stream it is given; clones share the same recordings
#[derive(Clone, Default)]
pub struct MemorySink {
    recordings: Arc<Mutex<Vec<Recording>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recordings(&self) -> Vec<Recording> {
        self.recordings.lock().clone()
    }

    pub fn last(&self) -> Option<Recording> {
        self.recordings.lock().last().cloned()
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn open(&mut self, format: AudioFormat) -> Result<()> {
        self.recordings.lock().push(Recording {
            format,
            packets: Vec::new(),
            closed: false,
        });
        Ok(())
    }

    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let mut recordings = self.recordings.lock();
        let current = recordings
            .last_mut()
            .ok_or_else(|| StreamError::Sink("write before open".to_string()))?;
        current.packets.push(pcm.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(current) = self.recordings.lock().last_mut() {
            current.closed = true;
        }
        Ok(())
    }
}

/// Appends raw PCM to a file, truncating it when a stream opens
pub struct PcmFileSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl PcmFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }
}

#[async_trait]
impl AudioSink for PcmFileSink {
    async fn open(&mut self, format: AudioFormat) -> Result<()> {
        let file = File::create(&self.path)
            .await
            .map_err(|e| StreamError::Sink(format!("{}: {}", self.path.display(), e)))?;
        info!(
            "Writing {} Hz {:?} {}-bit PCM to {}",
            format.sample_rate,
            format.mode,
            format.bits_per_sample,
            self.path.display()
        );
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StreamError::Sink("write before open".to_string()))?;
        file.write_all(pcm).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Accepts any supported stream and discards it
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn open(&mut self, format: AudioFormat) -> Result<()> {
        debug!("Null sink opened: {:?}", format);
        Ok(())
    }

    async fn write(&mut self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
