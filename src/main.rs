mod camera;
mod capture;
mod cli;
mod config;
mod connection;
mod protocol;
mod relay;
mod scheduler;
mod session;
mod sink;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cli::{Cli, Commands};

use camera::{screen::ScreenAcquirer, FacingMode};
use config::WatchConfig;
use sink::{CommandSpeech, ConsoleSink, NullSpeech, SpeechEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Watch {
            page,
            interval_ms,
            facing,
            quality,
            locale,
            speech_cmd,
            max_width,
        } => {
            let facing: FacingMode = facing.parse()?;
            let config = WatchConfig {
                page,
                capture_period: Duration::from_millis(interval_ms),
                facing,
                jpeg_quality: quality,
                speech_locale: locale,
                max_width,
            };
            start_watch(config, speech_cmd).await?;
        }
        Commands::Serve { addr } => {
            relay::start_relay(addr).await?;
        }
    }

    Ok(())
}

async fn start_watch(config: WatchConfig, speech_cmd: Option<String>) -> Result<()> {
    println!("📷 socketcam");
    println!("🔌 page: {}  period: {:?}", config.page, config.capture_period);
    println!("⏎  empty line takes a snapshot, \"flip\" toggles the facing mode");
    println!();

    let speech: Box<dyn SpeechEngine> = match speech_cmd {
        Some(program) => Box::new(CommandSpeech::new(program)),
        None => Box::new(NullSpeech),
    };
    let sink = Arc::new(ConsoleSink::new(speech, config.speech_locale.clone()));
    let acquirer = Arc::new(ScreenAcquirer::new(config.max_width));

    session::run(config, acquirer, sink).await
}
