//! Master-side servo debug client

use marionette_core::wire::{decode_value, ServoCommand, VALUE_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::{read_error, Result, StreamError};

pub struct ServoDebugClient {
    stream: TcpStream,
}

impl ServoDebugClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true)?;
        info!("Servo debug client connected to {}", stream.peer_addr()?);
        Ok(Self { stream })
    }

    /// Cached servo position on the node
    pub async fn read(&mut self) -> Result<f32> {
        self.stream.write_all(&ServoCommand::Read.encode()).await?;
        let mut reply = [0u8; VALUE_SIZE];
        self.stream
            .read_exact(&mut reply)
            .await
            .map_err(read_error)?;
        let value = decode_value(reply);
        debug!("Servo read {}", value);
        Ok(value)
    }

    /// Send a new position. The node does not acknowledge writes, and drops
    /// values outside 0.0..=1.0.
    pub async fn write(&mut self, value: f32) -> Result<()> {
        debug!("Servo write {}", value);
        self.stream
            .write_all(&ServoCommand::Write(value).encode())
            .await?;
        Ok(())
    }

    /// Close the write half so the node ends the session
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
