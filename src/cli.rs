//! Command-line interface for grounded
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Turn-taking dialogue orchestrator for voice-driven grounding sessions
#[derive(Parser, Debug)]
#[command(
    name = "grounded",
    version,
    about = "Turn-taking dialogue orchestrator for voice-driven grounding sessions"
)]
pub struct Cli {
    /// Subcommand to execute (default: interactive session on stdin)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Conversational backend base URL
    #[arg(long, global = true, value_name = "URL")]
    pub backend: Option<String>,

    /// External audio player command (e.g. "espeak-ng", "mpv -")
    #[arg(long, value_name = "COMMAND")]
    pub player: Option<String>,

    /// End the session after this much silence from the agent. Examples: 90s, 5m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub inactivity: Option<u64>,
}

/// Parse a duration string into seconds.
///
/// Accepts bare numbers (seconds) and anything `humantime` understands
/// (`30s`, `5m`, `1m30s`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session daemon (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Start a session via IPC
    Start {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// End the running session via IPC
    Stop {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Get session status via IPC
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Feed a transcript update to the running session
    Say {
        /// Recognized text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Send as a partial (non-final) update
        #[arg(long)]
        partial: bool,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Report the latest heart-rate sample
    HeartRate {
        /// Beats per minute
        bpm: u32,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Shut the daemon down
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/grounded.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Check configuration and backend health
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["grounded"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.backend.is_none());
        assert!(cli.player.is_none());
        assert!(cli.inactivity.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["grounded", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(["grounded", "-v", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_inactivity_durations() {
        let cli = Cli::try_parse_from(["grounded", "--inactivity", "5m"]).unwrap();
        assert_eq!(cli.inactivity, Some(300));
        let cli = Cli::try_parse_from(["grounded", "--inactivity", "90"]).unwrap();
        assert_eq!(cli.inactivity, Some(90));
        let cli = Cli::try_parse_from(["grounded", "--inactivity", "1m30s"]).unwrap();
        assert_eq!(cli.inactivity, Some(90));
        assert!(Cli::try_parse_from(["grounded", "--inactivity", "soon"]).is_err());
    }

    #[test]
    fn test_parse_daemon_with_socket() {
        let cli = Cli::try_parse_from(["grounded", "daemon", "--socket", "/tmp/g.sock"]).unwrap();
        match cli.command {
            Some(Commands::Daemon { socket }) => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/g.sock")));
            }
            other => panic!("Expected Daemon command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_say_joins_words() {
        let cli = Cli::try_parse_from(["grounded", "say", "I", "feel", "dizzy"]).unwrap();
        match cli.command {
            Some(Commands::Say { text, partial, .. }) => {
                assert_eq!(text.join(" "), "I feel dizzy");
                assert!(!partial);
            }
            other => panic!("Expected Say command, got {:?}", other),
        }

        let cli = Cli::try_parse_from(["grounded", "say", "--partial", "I feel"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Say { partial: true, .. })
        ));
        assert!(Cli::try_parse_from(["grounded", "say"]).is_err());
    }

    #[test]
    fn test_parse_heart_rate() {
        let cli = Cli::try_parse_from(["grounded", "heart-rate", "104"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::HeartRate { bpm: 104, .. })
        ));
        assert!(Cli::try_parse_from(["grounded", "heart-rate", "fast"]).is_err());
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "grounded",
            "check",
            "--config",
            "/tmp/config.toml",
            "--backend",
            "http://10.0.0.2:5000",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert_eq!(cli.backend.as_deref(), Some("http://10.0.0.2:5000"));
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["grounded", "toggle"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["grounded", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
