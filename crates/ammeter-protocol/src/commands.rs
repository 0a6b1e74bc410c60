//! Commands that can be sent to the ammeter.
//!
//! Every command is a single `CMD:`-prefixed line. Query commands (`STATUS`,
//! `CONFIG`) are answered with the matching record; action commands change
//! the device state and are confirmed by a later `STATUS` query.

use crate::codec::LineCodec;

/// Prefix shared by every host → device command.
pub const COMMAND_PREFIX: &str = "CMD";

/// Commands understood by the ammeter firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request a `STATUS` record.
    Status,

    /// Request a `CONFIG` record.
    Config,

    /// Start the baseline initialization of every configured pin.
    Init,

    /// Start a sampling run.
    Start {
        /// Capture time in seconds; the device default is used when `None`.
        timeout: Option<u32>,
    },

    /// Stop the current sampling run.
    Stop,

    /// Change the sampling interval.
    Interval {
        /// New interval in seconds.
        seconds: u32,
    },

    /// Take a single reading outside of a sampling run.
    ReadOnce,
}

impl Command {
    /// Encode the command as a line to send to the device.
    /// Returns the bytes to send (including the `\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_command(&self.to_command_string())
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Status => format!("{}:STATUS", COMMAND_PREFIX),
            Command::Config => format!("{}:CONFIG", COMMAND_PREFIX),
            Command::Init => format!("{}:INIT", COMMAND_PREFIX),
            Command::Start { timeout: None } => format!("{}:START", COMMAND_PREFIX),
            Command::Start { timeout: Some(secs) } => format!("{}:START:{}", COMMAND_PREFIX, secs),
            Command::Stop => format!("{}:STOP", COMMAND_PREFIX),
            Command::Interval { seconds } => format!("{}:INTERVAL:{}", COMMAND_PREFIX, seconds),
            Command::ReadOnce => format!("{}:ONE", COMMAND_PREFIX),
        }
    }

    /// Short lowercase name, used as a log and metric label.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Config => "config",
            Command::Init => "init",
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::Interval { .. } => "interval",
            Command::ReadOnce => "one",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_command_string())
    }
}
