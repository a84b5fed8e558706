//! Recstream: record from a capture source and stream it to an upload server
//!
//! This library provides the core functionality for:
//! - Acquiring a capture source and emitting encoded chunks on an interval
//! - Streaming chunks over a websocket control channel that reconnects on failure
//! - Tracking one recording session through Idle, Recording, Saving and Saved
//! - Pointing playback at the server-stored artifact once the upload completes
//!
//! # Architecture
//!
//! ```text
//!      signals / --duration                 ┌──────────────────┐
//!   ───── SessionCommand ─────────────────▶ │  SessionRunner   │ ──▶ state file
//!                                           │  (select! loop)  │     (JSON)
//!                                           └──────────────────┘
//!                                             │   ▲        │  ▲
//!                                 Event       │   │ Effect │  │ ChannelEvent
//!                                             ▼   │        │  │
//!                                           ┌─────────┐    │  │
//!                                           │ Session │    │  │
//!                                           │ (pure)  │    │  │
//!                                           └─────────┘    │  │
//!                                    chunks ▲              ▼  │
//!                           ┌──────────────────┐    ┌──────────────────┐
//!                           │  CaptureSource   │    │  Control channel │
//!                           │ (file / pattern) │    │ (tokio-tungst.)  │
//!                           └──────────────────┘    └──────────────────┘
//!                                                          │  ▲
//!                                          id, binary chunks  │ "<id>.webm"
//!                                                          ▼  │
//!                                                     upload server
//! ```

pub mod capture;
pub mod channel;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod identity;
pub mod notification;
pub mod playback;
pub mod runner;
pub mod session;
pub mod state;
pub mod status;

pub use cli::{Cli, Commands, ControlAction, StatusFormat};
pub use config::Config;
pub use error::{RecstreamError, Result};
pub use runner::{RunOutcome, SessionCommand, SessionRunner};
pub use session::Session;
