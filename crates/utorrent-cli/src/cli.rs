use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use utorrent_types::TorrentAction;

/// Top-level CLI struct for the binary.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Daemon host, optionally with a scheme.
    #[arg(long, env = "UTORRENT_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,

    /// WebUI port.
    #[arg(short, long, env = "UTORRENT_PORT", default_value_t = 8080)]
    pub(crate) port: u16,

    /// How to authenticate.
    #[command(flatten)]
    pub(crate) auth: CliAuth,

    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Either Basic auth credentials, or a stored cookie/token pair (optionally with Basic auth).
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct CliAuth {
    #[arg(short, long, env = "UTORRENT_USERNAME")]
    pub(crate) username: Option<String>,

    #[arg(long, env = "UTORRENT_PASSWORD", hide_env_values = true)]
    pub(crate) password: Option<String>,

    /// `GUID` cookie of a previous session.
    #[arg(long, env = "UTORRENT_COOKIE", hide_env_values = true, requires = "token")]
    pub(crate) cookie: Option<String>,

    /// Token of a previous session.
    #[arg(long, env = "UTORRENT_TOKEN", hide_env_values = true, requires = "cookie")]
    pub(crate) token: Option<String>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Authenticate and print the session's token and cookie.
    Login,
    /// List torrents and labels as JSON.
    List,
    /// List the files of a torrent as JSON.
    Files {
        /// Torrent hash.
        hash: String,
    },
    /// Run a lifecycle action on a torrent.
    Action {
        #[arg(value_enum)]
        action: CliAction,
        /// Torrent hash.
        hash: String,
    },
    /// Set the priority of one file (0 = skip, 1 = low, 2 = normal, 3 = high).
    Priority {
        /// Torrent hash.
        hash: String,
        /// Index of the file in `files` output.
        file_index: usize,
        priority: u8,
    },
    /// Upload a local .torrent file.
    AddFile { path: PathBuf },
    /// Add a torrent from a URL or magnet link.
    AddUrl { url: String },
}

/// CLI representation of [`TorrentAction`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum CliAction {
    Start,
    Stop,
    Pause,
    ForceStart,
    Unpause,
    Recheck,
    Remove,
    RemoveData,
}

impl From<CliAction> for TorrentAction {
    fn from(cli: CliAction) -> Self {
        match cli {
            CliAction::Start => Self::Start,
            CliAction::Stop => Self::Stop,
            CliAction::Pause => Self::Pause,
            CliAction::ForceStart => Self::ForceStart,
            CliAction::Unpause => Self::Unpause,
            CliAction::Recheck => Self::Recheck,
            CliAction::Remove => Self::Remove,
            CliAction::RemoveData => Self::RemoveData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_credentials_and_action() {
        let cli = Cli::try_parse_from([
            "utorrent-cli",
            "--host",
            "nas",
            "-p",
            "35653",
            "-u",
            "admin",
            "--password",
            "secret",
            "action",
            "force-start",
            "ABC",
        ])
        .unwrap();

        assert_eq!(cli.host, "nas");
        assert_eq!(cli.port, 35653);
        assert_eq!(cli.auth.username.as_deref(), Some("admin"));
        match cli.command {
            Command::Action { action, hash } => {
                assert_eq!(TorrentAction::from(action), TorrentAction::ForceStart);
                assert_eq!(hash, "ABC");
            }
            other => panic!("Expected Action, got {other:?}"),
        }
    }

    #[test]
    fn cookie_requires_token() {
        assert!(Cli::try_parse_from(["utorrent-cli", "--cookie", "xyz", "list"]).is_err());
        assert!(
            Cli::try_parse_from(["utorrent-cli", "--cookie", "xyz", "--token", "t", "list"])
                .is_ok()
        );
    }
}
