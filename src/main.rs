mod demo;
mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use demo::DemoSession;
use signalroute_engine::message::{Action, Message};
use signalroute_engine::{BounceMode, BounceState, BounceStep, EngineConfig, PortOperationLock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::channel;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "signalroute")]
#[command(about = "Drive the signalroute routing engine offline")]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the demo session through the bounce path into a stereo WAV
    Bounce {
        /// Number of frames to render
        #[arg(long, default_value_t = 96_000)]
        frames: usize,

        /// Block length in frames
        #[arg(long, default_value_t = 256)]
        block: usize,

        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,

        #[arg(long)]
        out: PathBuf,

        /// Let the regular mix reach the master instead of tapping tracks
        #[arg(long)]
        with_parents: bool,

        /// Where in each track's chain the bounce taps
        #[arg(long, value_enum, default_value = "post-fader")]
        step: Step,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Step {
    BeforeInserts,
    PreFader,
    PostFader,
}

impl From<Step> for BounceStep {
    fn from(step: Step) -> Self {
        match step {
            Step::BeforeInserts => BounceStep::BeforeInserts,
            Step::PreFader => BounceStep::PreFader,
            Step::PostFader => BounceStep::PostFader,
        }
    }
}

async fn bounce(
    frames: usize,
    config: EngineConfig,
    out: PathBuf,
    with_parents: bool,
    step: Step,
) -> Result<(), String> {
    if config.block_length == 0 {
        return Err("block length must be positive".to_string());
    }
    let lock = Arc::new(PortOperationLock::default());
    let (tx, handle) = signalroute_engine::init(lock.clone());
    let (client_tx, mut client_rx) = channel::<Message>(32);
    tx.send(Message::Channel(client_tx))
        .await
        .map_err(|e| e.to_string())?;

    let mut session = DemoSession::new(config, lock);
    session.set_bounce_to_master(!with_parents);
    for &(src, dest, multiplier) in &session.connections {
        tx.send(Message::Request(Action::Connect {
            src,
            dest,
            multiplier,
            locked: false,
            enabled: true,
        }))
        .await
        .map_err(|e| e.to_string())?;
        match client_rx.recv().await {
            Some(Message::Response(Ok(_))) => {}
            Some(Message::Response(Err(e))) => return Err(e),
            _ => return Err("engine closed the response channel".to_string()),
        }
    }
    info!("registered {} connections", session.connections.len());

    let bounce = BounceState {
        mode: BounceMode::On,
        step: step.into(),
        with_parents,
    };
    let samples = tokio::task::spawn_blocking(move || session.render(bounce, frames))
        .await
        .map_err(|e| e.to_string())??;

    wavers::write::<f32, _>(&out, &samples, config.sample_rate as i32, 2)
        .map_err(|e| format!("Failed to write '{}': {e}", out.display()))?;
    info!("wrote {} frames to {}", samples.len() / 2, out.display());

    tx.send(Message::Request(Action::Quit))
        .await
        .map_err(|e| e.to_string())?;
    handle.await.map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Bounce {
            frames,
            block,
            sample_rate,
            out,
            with_parents,
            step,
        } => {
            bounce(
                frames,
                EngineConfig::new(block, sample_rate),
                out,
                with_parents,
                step,
            )
            .await
        }
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}
