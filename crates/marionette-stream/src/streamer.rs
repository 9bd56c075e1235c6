//! Master-side audio streamer

use bytes::{BufMut, Bytes, BytesMut};
use marionette_core::{AudioHeader, ACK_BYTE};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::{read_error, Result, StreamError};

/// Sample frames per packet when the caller has no preference
pub const DEFAULT_PACKET_SIZE: u32 = 512;

/// Interleaved 16-bit PCM ready to stream
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u32,
}

impl PcmClip {
    pub fn from_i16(samples: Vec<i16>, sample_rate: u32, channels: u32) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(StreamError::UnsupportedFormat(format!(
                "{} Hz, {} channels",
                sample_rate, channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(StreamError::Protocol(format!(
                "{} samples do not split into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Little-endian 16-bit PCM bytes; a trailing odd byte is ignored
    pub fn from_raw(raw: &[u8], sample_rate: u32, channels: u32) -> Result<Self> {
        let samples = raw
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::from_i16(samples, sample_rate, channels)
    }

    /// Scale every sample by `factor`, saturating at the 16-bit range
    pub fn amplify(&mut self, factor: f32) {
        for sample in &mut self.samples {
            let scaled = (*sample as f32 * factor).round();
            *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Sample frames (one sample per channel)
    pub fn total_samples(&self) -> u32 {
        (self.samples.len() / self.channels as usize) as u32
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_samples() as f64 / self.sample_rate as f64)
    }

    pub fn header(&self, packet_size: u32) -> AudioHeader {
        AudioHeader {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 16,
            total_samples: self.total_samples(),
            packet_size,
        }
    }

    /// PCM bytes of frames `start..start + count`
    fn frames(&self, start: u32, count: u32) -> Bytes {
        let channels = self.channels as usize;
        let from = start as usize * channels;
        let to = from + count as usize * channels;
        let mut buf = BytesMut::with_capacity((to - from) * 2);
        for sample in &self.samples[from..to] {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }
}

/// Streams clips to a node's audio listener
pub struct AudioStreamer {
    packet_size: u32,
}

impl AudioStreamer {
    pub fn new(packet_size: u32) -> Self {
        Self { packet_size }
    }

    /// Connect to `addr` and play `clip`
    pub async fn play(&self, addr: impl ToSocketAddrs, clip: &PcmClip) -> Result<u32> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true)?;
        info!(
            "Streaming {:.2}s of audio to {}",
            clip.duration().as_secs_f64(),
            stream.peer_addr()?
        );
        self.stream_to(stream, clip).await
    }

    /// Send `clip` over an established connection. Returns packets sent.
    ///
    /// Lock-step: each packet waits for the previous ack, then the sender
    /// sleeps for the packet's playback time so the node's buffer never runs
    /// far ahead.
    pub async fn stream_to<T>(&self, mut stream: T, clip: &PcmClip) -> Result<u32>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let header = clip.header(self.packet_size);
        header.validate()?;

        stream.write_all(&header.encode()).await?;
        expect_ack(&mut stream).await?;

        let mut sent = 0;
        let mut packets = 0;
        while sent < header.total_samples {
            let samples = header.packet_samples(sent);
            stream.write_all(&clip.frames(sent, samples)).await?;
            expect_ack(&mut stream).await?;

            sent += samples;
            packets += 1;
            debug!("Sent packet {} ({}/{})", packets, sent, header.total_samples);
            tokio::time::sleep(header.duration_of(samples)).await;
        }

        info!("Audio stream complete: {} packets", packets);
        Ok(packets)
    }
}

impl Default for AudioStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_SIZE)
    }
}

async fn expect_ack<T: AsyncRead + Unpin>(stream: &mut T) -> Result<()> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).await.map_err(read_error)?;
    if byte[0] != ACK_BYTE {
        return Err(StreamError::Protocol(format!(
            "expected ack 0x{:02x}, got 0x{:02x}",
            ACK_BYTE, byte[0]
        )));
    }
    Ok(())
}
