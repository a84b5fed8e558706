// Command-line interface definitions for recstream

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "recstream")]
#[command(author, version, about = "Stream a recording to an upload server while it is captured")]
#[command(long_about = "
Recstream records from a capture source and streams the encoded media to an
upload server over a websocket while recording is still in progress. When
the recording is saved, the server-stored copy is offered for playback.

USAGE:
  recstream run --source clip.webm --duration 10
      Record for ten seconds, save, and print the playback URL.

  recstream run
      Wait for external control:
        recstream control record   (or SIGUSR1)
        recstream control save     (or SIGUSR2)
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the server base URL used to build playback links
    #[arg(long, value_name = "URL")]
    pub server_url: Option<String>,

    /// Override the websocket URL of the control channel
    #[arg(long, value_name = "URL")]
    pub socket_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one recording session (default if no command specified)
    Run {
        /// Capture source: a media file, or "test-pattern"
        #[arg(long, value_name = "FILE")]
        source: Option<String>,

        /// Record as soon as the device is ready and save after SECS
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Control a running session (sends a signal to it)
    Control {
        #[command(subcommand)]
        action: ControlAction,
    },

    /// Show the state of the current or last session
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = StatusFormat::Text)]
        format: StatusFormat,
    },

    /// Show current configuration
    Config {
        /// Write the default config file instead of showing the current one
        #[arg(long)]
        init: bool,

        /// With --init, replace an existing config file
        #[arg(long, requires = "init")]
        force: bool,
    },

    /// Print a freshly generated session id
    Id {
        /// Number of characters (defaults to session.id_length)
        #[arg(long, value_name = "N")]
        length: Option<usize>,
    },
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ControlAction {
    /// Start recording (SIGUSR1)
    Record,
    /// Stop recording and save (SIGUSR2)
    Save,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq, Debug)]
pub enum StatusFormat {
    Text,
    Json,
}
