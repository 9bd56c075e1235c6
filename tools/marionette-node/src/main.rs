//! Marionette Node
//!
//! Runs the devices of one puppet node: every configured servo, LED and strip
//! follows its bus topics, the servo debug listener drives one servo directly
//! and the audio listener plays streams from the master.
//!
//! Devices are driven through the simulated drivers, which log every write.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use marionette_bus::PubSubClient;
use marionette_devices::{LedChannel, ServoChannel, SimRgb, SimServo, SimStrip, StripChannel};
use marionette_stream::{AudioServer, AudioServerConfig, AudioSink, NullSink, PcmFileSink, ServoServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;

#[derive(Parser)]
#[command(name = "marionette-node")]
#[command(about = "Marionette device node")]
#[command(version)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker host, overrides the config file
    #[arg(short, long)]
    broker: Option<String>,

    /// Broker port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Client ID for the broker session
    #[arg(long)]
    client_id: Option<String>,

    /// Write received audio to a raw PCM file
    #[arg(long)]
    audio_output: Option<PathBuf>,

    /// Do not start the servo debug listener
    #[arg(long)]
    no_servo_server: bool,

    /// Do not start the audio listener
    #[arg(long)]
    no_audio_server: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

struct Devices {
    servos: Vec<Arc<ServoChannel>>,
    leds: Vec<Arc<LedChannel>>,
    strips: Vec<Arc<StripChannel>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&cli)?;
    info!("Starting Marionette node '{}'", config.bus.client_id);

    let bus = Arc::new(PubSubClient::mqtt(config.bus.clone()));
    bus.connect().await.with_context(|| {
        format!(
            "connecting to {}:{}",
            config.bus.broker_host, config.bus.broker_port
        )
    })?;

    let devices = attach_devices(&config, &bus).await?;
    info!(
        "{} servo(s), {} LED(s), {} strip(s) attached",
        devices.servos.len(),
        devices.leds.len(),
        devices.strips.len()
    );

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    bus.start_with_token(
        config.poll_interval(),
        config.ignore_handler_errors,
        cancel.child_token(),
    )?;

    if let Some(server_config) = &config.servo_server {
        let root = config.debug_servo_root().map(|r| r.trim_end_matches('/'));
        match devices.servos.iter().find(|s| Some(s.topics().root()) == root) {
            Some(servo) => {
                let server = ServoServer::bind(server_config, servo.clone()).await?;
                let cancel = cancel.clone();
                tracker.spawn(async move {
                    if let Err(e) = server.serve(cancel).await {
                        error!("Servo debug server failed: {}", e);
                    }
                });
            }
            None => warn!("No servo configured, servo debug listener disabled"),
        }
    }

    if let Some(audio_config) = &config.audio_server {
        match &config.audio_output {
            Some(path) => {
                spawn_audio(&tracker, audio_config, PcmFileSink::new(path), &cancel).await?
            }
            None => spawn_audio(&tracker, audio_config, NullSink, &cancel).await?,
        }
    }

    tracker.close();
    info!("Node ready");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    cancel.cancel();
    bus.stop().await;

    if tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .is_err()
    {
        warn!("Shutdown timed out after 5s");
    }

    // Channels only live as long as someone holds them
    drop(devices);
    info!("Node stopped");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    if let Some(host) = &cli.broker {
        config.bus.broker_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.bus.broker_port = port;
    }
    if let Some(id) = &cli.client_id {
        config.bus.client_id = id.clone();
    }
    if cli.audio_output.is_some() {
        config.audio_output = cli.audio_output.clone();
    }
    if cli.no_servo_server {
        config.servo_server = None;
    }
    if cli.no_audio_server {
        config.audio_server = None;
    }

    config.validate()?;
    Ok(config)
}

async fn attach_devices(config: &NodeConfig, bus: &Arc<PubSubClient>) -> Result<Devices> {
    let mut devices = Devices {
        servos: Vec::new(),
        leds: Vec::new(),
        strips: Vec::new(),
    };

    for servo in &config.servos {
        let channel = ServoChannel::attach(SimServo::new(&servo.root), bus.clone(), &servo.root)
            .await
            .with_context(|| format!("attaching servo '{}'", servo.root))?;
        devices.servos.push(channel);
    }
    for led in &config.leds {
        let channel = LedChannel::attach(SimRgb::new(&led.root), bus.clone(), &led.root)
            .await
            .with_context(|| format!("attaching LED '{}'", led.root))?;
        devices.leds.push(channel);
    }
    for strip in &config.strips {
        let driver = SimStrip::new(&strip.root, strip.length);
        let channel = StripChannel::attach(driver, bus.clone(), &strip.root)
            .await
            .with_context(|| format!("attaching strip '{}'", strip.root))?;
        devices.strips.push(channel);
    }

    Ok(devices)
}

async fn spawn_audio<S: AudioSink + 'static>(
    tracker: &TaskTracker,
    config: &AudioServerConfig,
    sink: S,
    cancel: &CancellationToken,
) -> Result<()> {
    let server = AudioServer::bind(config, sink).await?;
    let cancel = cancel.clone();
    tracker.spawn(async move {
        if let Err(e) = server.serve(cancel).await {
            error!("Audio server failed: {}", e);
        }
    });
    Ok(())
}
