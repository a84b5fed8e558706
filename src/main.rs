//! Recstream - stream a recording to an upload server while it is captured
//!
//! Run with `recstream` or `recstream run` to start a session.
//! Use `recstream control record|save` to drive a running session.
//! Use `recstream status` to inspect it.
//! Use `recstream config --init` to create the config file.

use clap::Parser;
use recstream::cli::{Cli, Commands, ControlAction, StatusFormat};
use recstream::config::{self, Config};
use recstream::runner::{RunOutcome, SessionCommand, SessionRunner};
use recstream::{control, identity, status};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("recstream={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(url) = cli.server_url {
        config.server.base_url = url;
    }
    if let Some(url) = cli.socket_url {
        config.server.socket_url = url;
    }

    let command = cli.command.unwrap_or(Commands::Run {
        source: None,
        duration: None,
    });

    match command {
        Commands::Run { source, duration } => {
            if let Some(source) = source {
                config.capture.source = Some(source);
            }
            config.validate()?;
            run_session(config, duration.map(Duration::from_secs)).await?;
        }

        Commands::Control { action } => {
            control::send(action)?;
            let verb = match action {
                ControlAction::Record => "record",
                ControlAction::Save => "save",
            };
            eprintln!("Sent {} to running session", verb);
        }

        Commands::Status { format } => {
            show_status(&config, format)?;
        }

        Commands::Config { init: true, force } => {
            init_config(cli.config.as_deref(), force)?;
        }

        Commands::Config { init: false, .. } => {
            show_config(&config)?;
        }

        Commands::Id { length } => {
            let length = length.unwrap_or(config.session.id_length);
            if length == 0 {
                anyhow::bail!("Session id length must be > 0");
            }
            println!("{}", identity::generate(length));
        }
    }

    Ok(())
}

/// Run one session to Saved (or until interrupted)
async fn run_session(config: Config, duration: Option<Duration>) -> anyhow::Result<()> {
    let session_id = identity::generate(config.session.id_length);
    let runner = SessionRunner::from_config(&config, session_id.clone())?;
    let snapshots = runner.subscribe();

    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(8);

    let signals = control::SignalListener::new()?;
    tokio::spawn(signals.forward(cmd_tx.clone()));
    let pid_file = control::write_pid_file();

    match duration {
        Some(duration) => {
            tokio::spawn(control::record_for(snapshots.clone(), cmd_tx.clone(), duration));
        }
        None => {
            tracing::info!(
                "Session {} ready. Use 'recstream control record' and 'recstream control save'",
                session_id
            );
        }
    }
    drop(cmd_tx);

    let outcome = runner.run(cmd_rx).await;

    if let Some(ref path) = pid_file {
        control::cleanup_pid_file(path);
    }

    match outcome {
        RunOutcome::Saved(url) => {
            println!("{}", url);
            Ok(())
        }
        RunOutcome::Interrupted(state) => {
            if let Some(err) = snapshots.borrow().device_error.clone() {
                anyhow::bail!("Session {} could not record: {}", session_id, err);
            }
            eprintln!("Session {} stopped while {}", session_id, state);
            Ok(())
        }
    }
}

/// Show the state of the current or last session
fn show_status(config: &Config, format: StatusFormat) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    match status::read_state_file(&state_path) {
        Ok(snapshot) => match format {
            StatusFormat::Json => println!("{}", serde_json::to_string(&snapshot)?),
            StatusFormat::Text => println!("{}", snapshot.render_text()),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match format {
            StatusFormat::Json => println!(r#"{{"state":"stopped"}}"#),
            StatusFormat::Text => println!("stopped"),
        },
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Create the config file from the commented defaults
fn init_config(path: Option<&std::path::Path>, force: bool) -> anyhow::Result<()> {
    let Some(path) = path.map(PathBuf::from).or_else(Config::default_path) else {
        anyhow::bail!("Could not determine the config directory");
    };

    if config::write_default_config(&path, force)? {
        println!("Created: {:?}", path);
    } else {
        println!("Config file exists: {:?}", path);
        println!("Use --force to replace it with the defaults.");
    }
    Ok(())
}

/// Show current configuration
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[server]");
    println!("  base_url = {:?}", config.server.base_url);
    println!("  socket_url = {:?}", config.server.socket_url);

    println!("\n[capture]");
    match config.capture.source {
        Some(ref source) => println!("  source = {:?}", source),
        None => println!("  source = (none)"),
    }
    println!("  interval_ms = {}", config.capture.interval_ms);
    println!("  mime_type = {:?}", config.capture.mime_type);
    println!(
        "  audio = {} ({} bps)",
        config.capture.audio, config.capture.audio_bits_per_second
    );
    println!(
        "  video = {} ({} bps)",
        config.capture.video, config.capture.video_bits_per_second
    );
    println!("  echo_cancellation = {}", config.capture.echo_cancellation);

    println!("\n[session]");
    println!("  id_length = {}", config.session.id_length);
    println!("  flush_interval_ms = {}", config.session.flush_interval_ms);
    println!("  fallback_timeout_secs = {}", config.session.fallback_timeout_secs);
    println!("  fallback_retry_secs = {}", config.session.fallback_retry_secs);

    println!("\n[channel]");
    println!("  reconnect_delay_secs = {}", config.channel.reconnect_delay_secs);
    println!("  reconnect_backoff = {:?}", config.channel.reconnect_backoff);
    println!(
        "  reconnect_max_delay_secs = {}",
        config.channel.reconnect_max_delay_secs
    );

    println!("\n[notification]");
    println!("  on_device_error = {}", config.notification.on_device_error);
    println!("  on_saved = {}", config.notification.on_saved);

    if let Some(ref state_file) = config.state_file {
        println!("\nstate_file = {:?}", state_file);
        if let Some(resolved) = config.resolve_state_file() {
            println!("  (resolves to: {:?})", resolved);
        }
    }

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );

    Ok(())
}
