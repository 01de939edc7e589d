use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "socketcam")]
#[command(about = "📷 Live camera snapshots over WebSocket, with spoken replies", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture snapshots and relay them to the remote endpoint
    Watch {
        /// URL of the hosting page (its scheme selects ws vs wss)
        #[arg(short, long, default_value = "http://localhost:8080", env = "SOCKETCAM_PAGE")]
        page: String,

        /// Capture period in milliseconds
        #[arg(long, default_value_t = 3000, env = "SOCKETCAM_INTERVAL_MS")]
        interval_ms: u64,

        /// Camera to request: "user" or "environment"
        #[arg(long, default_value = "environment", env = "SOCKETCAM_FACING")]
        facing: String,

        /// JPEG quality (1-100)
        #[arg(long, default_value_t = 80)]
        quality: u8,

        /// Speech synthesis locale tag
        #[arg(long, default_value = "en-US", env = "SOCKETCAM_LOCALE")]
        locale: String,

        /// External speech synthesizer command (omit to disable speech)
        #[arg(long, env = "SOCKETCAM_SPEECH_CMD")]
        speech_cmd: Option<String>,

        /// Cap on the rendered capture width
        #[arg(long, default_value_t = 1280)]
        max_width: u32,
    },

    /// Run a local relay server that acknowledges received frames
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:8080", env = "SOCKETCAM_LISTEN")]
        addr: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
