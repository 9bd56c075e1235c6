//! Audio playback listener
//!
//! Session flow:
//! 1. Read the 20-byte header and configure the sink, then ack
//! 2. Read `min(packet_size, remaining)` frames, play them, ack
//! 3. Close the sink once `total_samples` frames have arrived

use marionette_core::wire::AUDIO_HEADER_SIZE;
use marionette_core::{AudioHeader, ACK_BYTE};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AudioServerConfig;
use crate::error::{read_error, Result, StreamError};
use crate::sink::{AudioFormat, AudioSink};

/// Outcome of one completed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub header: AudioHeader,
    pub packets: u32,
    pub samples: u32,
    pub bytes: u64,
}

pub struct AudioServer<S> {
    listener: TcpListener,
    sink: S,
    read_timeout: Option<Duration>,
}

impl<S: AudioSink> AudioServer<S> {
    pub async fn bind(config: &AudioServerConfig, sink: S) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| StreamError::BindFailed(format!("{}: {}", config.bind_addr, e)))?;
        info!("Audio server listening on {}", config.bind_addr);
        Ok(Self {
            listener,
            sink,
            read_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and play streams one at a time until `cancel` fires
    pub async fn serve(mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Audio accept failed: {}", e);
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);

            info!("Audio session from {}", peer);
            let session = AudioSession::new(&mut self.sink, self.read_timeout);
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = session.run(stream) => match result {
                    Ok(stats) => info!(
                        "Audio session from {} done: {} samples in {} packets",
                        peer, stats.samples, stats.packets
                    ),
                    Err(e) => warn!("Audio session from {} aborted: {}", peer, e),
                },
            }
        }
        info!("Audio server stopped");
        Ok(())
    }
}

/// One negotiated stream feeding a sink
pub struct AudioSession<'a, S: ?Sized> {
    sink: &'a mut S,
    read_timeout: Option<Duration>,
}

impl<'a, S: AudioSink + ?Sized> AudioSession<'a, S> {
    pub fn new(sink: &'a mut S, read_timeout: Option<Duration>) -> Self {
        Self { sink, read_timeout }
    }

    /// Handshake and pump packets until the announced sample count arrives.
    ///
    /// The sink is closed whenever it was opened, including on error.
    pub async fn run<T>(self, mut stream: T) -> Result<SessionStats>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = self.read_timeout;

        let mut raw = [0u8; AUDIO_HEADER_SIZE];
        with_timeout(timeout, stream.read_exact(&mut raw))
            .await?
            .map_err(read_error)?;
        let header = AudioHeader::decode(&raw[..])?;

        let format = AudioFormat::from_header(&header)?;
        if !self.sink.supports(&format) {
            return Err(StreamError::UnsupportedFormat(format!(
                "{} bits per sample",
                header.bits_per_sample
            )));
        }
        header.validate()?;
        info!(
            "Audio stream: {} Hz, {} ch, {} bit, {} samples in packets of {}",
            header.sample_rate,
            header.channels,
            header.bits_per_sample,
            header.total_samples,
            header.packet_size
        );

        self.sink.open(format).await?;
        let result = pump(&mut stream, &mut *self.sink, header, timeout).await;
        let closed = self.sink.close().await;
        let stats = result?;
        closed?;
        Ok(stats)
    }
}

async fn pump<T, S>(
    stream: &mut T,
    sink: &mut S,
    header: AudioHeader,
    timeout: Option<Duration>,
) -> Result<SessionStats>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: AudioSink + ?Sized,
{
    ack(stream).await?;

    let mut stats = SessionStats {
        header,
        packets: 0,
        samples: 0,
        bytes: 0,
    };
    let mut packet = vec![0u8; header.packet_bytes(header.packet_size)];

    while stats.samples < header.total_samples {
        let samples = header.packet_samples(stats.samples);
        let len = header.packet_bytes(samples);
        with_timeout(timeout, stream.read_exact(&mut packet[..len]))
            .await?
            .map_err(read_error)?;

        sink.write(&packet[..len]).await?;
        ack(stream).await?;

        stats.packets += 1;
        stats.samples += samples;
        stats.bytes += len as u64;
        debug!(
            "Audio packet {}: {} samples ({}/{})",
            stats.packets, samples, stats.samples, header.total_samples
        );
    }

    Ok(stats)
}

async fn ack<T: AsyncWrite + Unpin>(stream: &mut T) -> Result<()> {
    stream.write_all(&[ACK_BYTE]).await?;
    stream.flush().await?;
    Ok(())
}

async fn with_timeout<F: Future>(timeout: Option<Duration>, fut: F) -> Result<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StreamError::Timeout),
        None => Ok(fut.await),
    }
}
