//! Servo debug listener
//!
//! Serves one client at a time; further connections wait in the listen
//! backlog until the current session ends.

use marionette_core::wire::{encode_value, ServoCommand, VALUE_SIZE};
use marionette_devices::{DeviceError, ServoChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServoServerConfig;
use crate::error::{read_error, Result, StreamError};

pub struct ServoServer {
    listener: TcpListener,
    servo: Arc<ServoChannel>,
}

impl ServoServer {
    pub async fn bind(config: &ServoServerConfig, servo: Arc<ServoChannel>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| StreamError::BindFailed(format!("{}: {}", config.bind_addr, e)))?;
        info!("Servo debug server listening on {}", config.bind_addr);
        Ok(Self { listener, servo })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve sessions until `cancel` fires.
    ///
    /// Session errors are logged and the server goes back to accepting.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Servo debug accept failed: {}", e);
                    continue;
                }
            };

            info!("Servo debug session from {}", peer);
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = run_session(stream, &self.servo) => match result {
                    Ok(()) => info!("Servo debug session from {} closed", peer),
                    Err(e) => warn!("Servo debug session from {} aborted: {}", peer, e),
                },
            }
        }
        info!("Servo debug server stopped");
        Ok(())
    }
}

/// Run the command loop until the peer closes the connection
pub async fn run_session<S>(mut stream: S, servo: &ServoChannel) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = [0u8; 1 + VALUE_SIZE];
    loop {
        if stream.read(&mut frame[..1]).await? == 0 {
            return Ok(());
        }

        let payload_len = match ServoCommand::payload_len(frame[0]) {
            Ok(len) => len,
            Err(e) => {
                warn!("Ignoring servo command: {}", e);
                continue;
            }
        };
        stream
            .read_exact(&mut frame[1..1 + payload_len])
            .await
            .map_err(read_error)?;

        match ServoCommand::decode(&frame[..1 + payload_len])? {
            ServoCommand::Read => {
                let value = servo.read();
                debug!("Servo debug read -> {}", value);
                stream.write_all(&encode_value(value)).await?;
                stream.flush().await?;
            }
            ServoCommand::Write(value) => {
                debug!("Servo debug write {}", value);
                match servo.write(value).await {
                    Ok(_) => {}
                    Err(DeviceError::Validation(e)) => warn!("Dropping servo debug write: {}", e),
                    Err(e) => warn!("Servo debug write failed: {}", e),
                }
            }
        }
    }
}
