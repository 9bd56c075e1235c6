//! Binary codecs for the stream protocols
//!
//! Servo debug protocol (no framing, no version byte):
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ 0x00     │ read  -> reply f32 (4 bytes) │
//! │ 0x01 f32 │ write (no reply)             │
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! Audio stream protocol header (client -> server), followed by one ack:
//! ```text
//! ┌────────────┬──────────┬──────┬───────────────┬─────────────┐
//! │ u32 rate   │ u32 chan │ u32  │ u32 total     │ u32 packet  │
//! │            │          │ bits │ samples       │ samples     │
//! └────────────┴──────────┴──────┴───────────────┴─────────────┘
//! ```
//!
//! All integers and floats are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

use crate::{Error, Result};

/// Servo command: read cached value
pub const CMD_READ: u8 = 0;

/// Servo command: write new value
pub const CMD_WRITE: u8 = 1;

/// Size of an encoded servo value
pub const VALUE_SIZE: usize = 4;

/// Size of the audio stream header
pub const AUDIO_HEADER_SIZE: usize = 20;

/// Largest audio packet a server will buffer (1 MiB)
pub const MAX_PACKET_BYTES: u64 = 1024 * 1024;

pub fn encode_value(value: f32) -> [u8; VALUE_SIZE] {
    value.to_le_bytes()
}

pub fn decode_value(bytes: [u8; VALUE_SIZE]) -> f32 {
    f32::from_le_bytes(bytes)
}

/// A servo debug protocol command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoCommand {
    Read,
    Write(f32),
}

impl ServoCommand {
    /// Number of payload bytes following a command byte
    pub fn payload_len(command: u8) -> Result<usize> {
        match command {
            CMD_READ => Ok(0),
            CMD_WRITE => Ok(VALUE_SIZE),
            other => Err(Error::UnknownCommand(other)),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + VALUE_SIZE);
        match self {
            ServoCommand::Read => buf.put_u8(CMD_READ),
            ServoCommand::Write(value) => {
                buf.put_u8(CMD_WRITE);
                buf.put_f32_le(*value);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut buf: impl Buf) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(Error::BufferTooSmall { needed: 1, have: 0 });
        }
        let command = buf.get_u8();
        let needed = Self::payload_len(command)?;
        if buf.remaining() < needed {
            return Err(Error::BufferTooSmall {
                needed: 1 + needed,
                have: 1 + buf.remaining(),
            });
        }
        match command {
            CMD_READ => Ok(ServoCommand::Read),
            _ => Ok(ServoCommand::Write(buf.get_f32_le())),
        }
    }
}

/// Audio stream parameters announced by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// Total sample frames (one sample per channel) in the stream
    pub total_samples: u32,
    /// Sample frames per data packet
    pub packet_size: u32,
}

impl AudioHeader {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(AUDIO_HEADER_SIZE);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.channels);
        buf.put_u32_le(self.bits_per_sample);
        buf.put_u32_le(self.total_samples);
        buf.put_u32_le(self.packet_size);
        buf.freeze()
    }

    pub fn decode(mut buf: impl Buf) -> Result<Self> {
        if buf.remaining() < AUDIO_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: AUDIO_HEADER_SIZE,
                have: buf.remaining(),
            });
        }
        Ok(Self {
            sample_rate: buf.get_u32_le(),
            channels: buf.get_u32_le(),
            bits_per_sample: buf.get_u32_le(),
            total_samples: buf.get_u32_le(),
            packet_size: buf.get_u32_le(),
        })
    }

    /// Reject headers that cannot describe a PCM stream
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidHeader("sample rate is zero".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::InvalidHeader("channel count is zero".to_string()));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        if self.packet_size == 0 {
            return Err(Error::InvalidHeader("packet size is zero".to_string()));
        }
        match self.checked_packet_bytes(self.packet_size) {
            Some(bytes) if bytes <= MAX_PACKET_BYTES => Ok(()),
            Some(bytes) => Err(Error::InvalidHeader(format!(
                "packet of {} bytes exceeds {}",
                bytes, MAX_PACKET_BYTES
            ))),
            None => Err(Error::InvalidHeader(format!(
                "packet of {} frames of {} x {} bits overflows",
                self.packet_size, self.channels, self.bits_per_sample
            ))),
        }
    }

    fn checked_packet_bytes(&self, samples: u32) -> Option<u64> {
        (self.bits_per_sample as u64 / 8)
            .checked_mul(self.channels as u64)?
            .checked_mul(samples as u64)
    }

    /// Bytes in one sample frame (all channels). Saturates on headers that
    /// fail [`validate`](Self::validate).
    pub fn frame_bytes(&self) -> usize {
        self.packet_bytes(1)
    }

    /// Sample frames in the next packet once `sent` frames have been transferred
    pub fn packet_samples(&self, sent: u32) -> u32 {
        self.packet_size.min(self.total_samples.saturating_sub(sent))
    }

    /// Bytes in `samples` frames. Saturates on headers that fail
    /// [`validate`](Self::validate).
    pub fn packet_bytes(&self, samples: u32) -> usize {
        self.checked_packet_bytes(samples)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .unwrap_or(usize::MAX)
    }

    /// Playback time of `samples` frames
    pub fn duration_of(&self, samples: u32) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }

    /// Number of data packets in the whole stream
    pub fn packet_count(&self) -> u32 {
        if self.packet_size == 0 {
            return 0;
        }
        self.total_samples.div_ceil(self.packet_size)
    }
}
