pub mod catalog;
pub mod controller;
pub mod dialogue;
pub mod dispatch;
pub mod planner;
pub mod session;
pub mod ssml;
pub mod uploads;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Commands the dialogue issues to the booth hardware.
///
/// This enum is the only vocabulary shared with the device: each variant is
/// published as its token under the `cmd` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Take the picture now.
    Capture,
    /// Apply the style transfer to the current picture.
    Style,
    /// Print the current picture.
    Finish,
    /// Print the current picture and upload it for sharing.
    FinishAndShare,
    /// Drop the current picture and return to the live preview.
    #[serde(rename = "startover")]
    StartOver,
    /// Return to the live preview, share-enabled booth firmware.
    Preview,
}

impl Command {
    pub fn token(self) -> &'static str {
        match self {
            Command::Capture => "capture",
            Command::Style => "style",
            Command::Finish => "finish",
            Command::FinishAndShare => "finish_and_share",
            Command::StartOver => "startover",
            Command::Preview => "preview",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A command together with how long to wait before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCommand {
    pub command: Command,
    pub delay: Option<Duration>,
}

impl ScheduledCommand {
    pub fn now(command: Command) -> Self {
        Self {
            command,
            delay: None,
        }
    }

    pub fn after(command: Command, delay: Duration) -> Self {
        Self {
            command,
            delay: Some(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_command_matches_token() {
        for command in [
            Command::Capture,
            Command::Style,
            Command::Finish,
            Command::FinishAndShare,
            Command::StartOver,
            Command::Preview,
        ] {
            let json = serde_json::to_value(command).unwrap();
            assert_eq!(json, serde_json::Value::String(command.token().to_string()));
        }
    }
}
