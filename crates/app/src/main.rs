use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use pinky_core::{
    Message, MemoryUniverse, Pinky, PinkyConfig, PinkyDisplay, PinkyError, RunnerContext,
    SheepModel, UdpLink,
};
use tracing_subscriber::EnvFilter;

mod shows;

#[tokio::main]
async fn main() -> pinky_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            model,
            show,
            bpm,
        } => run(config, model, show, bpm).await,
        Commands::Decode { hex } => decode(&hex),
    }
}

async fn run(
    config_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    show: Option<String>,
    bpm: Option<f32>,
) -> pinky_core::Result<()> {
    let mut config = match &config_path {
        Some(path) => PinkyConfig::load(path)?,
        None => PinkyConfig::default(),
    };
    if let Some(bpm) = bpm {
        config.timing.bpm = bpm;
    }
    config.validate()?;

    let model = match &model_path {
        Some(path) => SheepModel::load(path, &config.model)?,
        None => {
            tracing::warn!("no model given; running without panels");
            SheepModel::default()
        }
    };

    tracing::info!(
        ?config_path,
        ?model_path,
        panels = model.panels.len(),
        bpm = config.timing.bpm,
        "starting pinky"
    );

    let link = Arc::new(UdpLink::bind(&config.network.bind_address, config.network.pinky_port).await?);
    let display = Arc::new(PinkyDisplay::new());
    display.select_show(show);

    let context = RunnerContext {
        link: link.clone(),
        dmx: Arc::new(MemoryUniverse::new(config.dmx.channel_count)),
        display,
        brain_port: config.network.brain_port,
        dmx_devices: config.dmx.devices.clone(),
    };
    let pinky = Pinky::new(&config, model, shows::catalog(), context);
    let listener = link.listen(pinky.receiver());

    tokio::select! {
        _ = pinky.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, shutting down");
        }
    }

    listener.abort();
    Ok(())
}

fn decode(hex: &str) -> pinky_core::Result<()> {
    let bytes = hex::decode(hex.trim())
        .map_err(|err| PinkyError::msg(format!("invalid hex input: {err}")))?;
    let message = Message::decode(&bytes)?;
    println!("{message:#?}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Pinky LED rig controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover Brains and stream the selected show to them.
    Run {
        /// JSON configuration file; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON sheep model listing panels and moving heads.
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Show to start with; a random one is picked otherwise.
        #[arg(short, long)]
        show: Option<String>,
        /// Overrides the configured tempo.
        #[arg(long)]
        bpm: Option<f32>,
    },
    /// Decode a hex-encoded datagram and print it.
    Decode {
        /// Datagram bytes as hex, e.g. captured from the wire.
        hex: String,
    },
}
