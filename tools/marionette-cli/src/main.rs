//! Marionette CLI
//!
//! Master-side tool for driving nodes: move a servo over the debug protocol,
//! stream raw PCM audio, or publish a JSON command to a device topic.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use marionette_bus::{BusConfig, PubSubClient};
use marionette_core::{QoS, DEFAULT_AUDIO_PORT, DEFAULT_MQTT_PORT, DEFAULT_SERVO_PORT};
use marionette_stream::{AudioStreamer, PcmClip, ServoDebugClient, DEFAULT_PACKET_SIZE};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marionette")]
#[command(about = "Marionette CLI - drive puppet nodes from the master")]
#[command(version)]
struct Cli {
    /// Node or broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to a node's servo debug listener
    Servo {
        /// Debug listener port
        #[arg(short, long, default_value_t = DEFAULT_SERVO_PORT)]
        port: u16,

        #[command(subcommand)]
        action: ServoAction,
    },

    /// Stream a raw 16-bit little-endian PCM file to a node
    Audio {
        /// PCM file
        file: PathBuf,
        /// Sample rate in Hz
        #[arg(short, long, default_value = "16000")]
        rate: u32,
        /// Interleaved channels (1 or 2)
        #[arg(short, long, default_value = "1")]
        channels: u32,
        /// Sample frames per packet
        #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
        packet_size: u32,
        /// Gain applied before streaming
        #[arg(short, long, default_value = "1.0")]
        gain: f32,
        /// Audio listener port
        #[arg(short, long, default_value_t = DEFAULT_AUDIO_PORT)]
        port: u16,
    },

    /// Publish a JSON payload to a bus topic
    Publish {
        /// Topic (e.g., puppet/mouth/write)
        topic: String,
        /// Payload (JSON format)
        payload: String,
        /// Broker port
        #[arg(short, long, default_value_t = DEFAULT_MQTT_PORT)]
        port: u16,
        /// Ask the broker to retain the message
        #[arg(long)]
        retain: bool,
    },
}

#[derive(Subcommand)]
enum ServoAction {
    /// Print the node's cached position
    Read,
    /// Move to a position between 0.0 and 1.0
    Write { value: f32 },
    /// Sweep 0 -> 1 -> 0 in the given number of steps
    Sweep {
        #[arg(short, long, default_value = "90")]
        steps: u32,
        /// Delay between steps in milliseconds
        #[arg(short, long, default_value = "10")]
        delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Servo { port, action } => {
            let mut client = ServoDebugClient::connect((cli.host.as_str(), port)).await?;
            debug!("Connected to servo debug listener at {}:{}", cli.host, port);
            match action {
                ServoAction::Read => {
                    println!("{}", client.read().await?);
                }
                ServoAction::Write { value } => {
                    if !(0.0..=1.0).contains(&value) {
                        bail!("value must be between 0.0 and 1.0, got {}", value);
                    }
                    client.write(value).await?;
                    // Round trip so the write has been applied before we exit
                    println!("{}", client.read().await?);
                }
                ServoAction::Sweep { steps, delay } => {
                    let steps = steps.max(1);
                    let positions = (0..=steps).chain((0..steps).rev());
                    info!("Sweeping in {} steps, {} ms apart", steps, delay);
                    for step in positions {
                        let value = step as f32 / steps as f32;
                        debug!("Sweep -> {:.3}", value);
                        client.write(value).await?;
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    println!("{}", client.read().await?);
                }
            }
            client.close().await?;
        }

        Commands::Audio {
            file,
            rate,
            channels,
            packet_size,
            gain,
            port,
        } => {
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let mut clip = PcmClip::from_raw(&raw, rate, channels)?;
            if gain != 1.0 {
                debug!("Applying gain {}", gain);
                clip.amplify(gain);
            }
            println!(
                "Streaming {} ({:.2}s) to {}:{}",
                file.display(),
                clip.duration().as_secs_f64(),
                cli.host,
                port
            );
            let packets = AudioStreamer::new(packet_size)
                .play((cli.host.as_str(), port), &clip)
                .await?;
            println!("Done: {} packets", packets);
        }

        Commands::Publish {
            topic,
            payload,
            port,
            retain,
        } => {
            let json: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;

            let config = BusConfig {
                broker_host: cli.host.clone(),
                broker_port: port,
                ..Default::default()
            };
            let bus = PubSubClient::mqtt(config);
            bus.connect().await?;
            info!("Publishing {} bytes to {}", payload.len(), topic);
            bus.publish(&topic, serde_json::to_vec(&json)?, QoS::AtLeastOnce, retain)
                .await?;

            // Give the transport a moment to flush before exiting
            tokio::time::sleep(Duration::from_millis(200)).await;
            println!("Published to {}", topic);
        }
    }

    Ok(())
}
