//! # uTorrent WebUI Types
//!
//! This crate defines the records, error taxonomy and status codec shared by
//! uTorrent WebUI clients, together with the [`TorrentControl`] trait they implement.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

pub mod codec;

pub use codec::{
    decode_file, decode_files, decode_label, decode_snapshot, decode_status, decode_torrent,
    TORRENT_FIELD_COUNT,
};

/// Result of every client operation. `Ok` is the success payload, `Err` tags the failure kind.
pub type Outcome<T> = Result<T, WebUiError>;

/// Error type for WebUI operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebUiError {
    /// An action was attempted without a valid session. Re-authenticate before retrying.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication is blocked until the user solves the captcha at the given image URL.
    #[error("captcha required: {0}")]
    CaptchaRequired(String),

    /// The daemon rejected the supplied credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Connectivity-level failure (DNS, refused, reset, timeout, unreadable local file).
    #[error("transport error: {0}")]
    Transport(String),

    /// The daemon answered with something that does not match the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl WebUiError {
    /// Whether the caller may retry the same call (with its own backoff policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Ways a daemon response can fail to match the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A fixed-position array was too short or carried a value of the wrong type.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// The body was not valid JSON.
    #[error("malformed json: {0}")]
    Json(String),

    /// The daemon answered with an HTTP status the protocol does not define for this call.
    #[error("unexpected http status {0}")]
    UnexpectedStatus(u16),

    /// The daemon answered with its own `{"error": ...}` object.
    #[error("daemon error: {0}")]
    Daemon(String),
}

/// Per-torrent lifecycle actions understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorrentAction {
    /// Start (queued) the torrent.
    Start,
    /// Stop the torrent.
    Stop,
    /// Pause the torrent.
    Pause,
    /// Start the torrent ignoring the queue.
    ForceStart,
    /// Resume a paused torrent.
    Unpause,
    /// Re-check the downloaded data.
    Recheck,
    /// Remove the torrent, keeping its data.
    Remove,
    /// Remove the torrent and delete its data.
    RemoveData,
}

impl TorrentAction {
    /// The value of the `action` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::ForceStart => "forcestart",
            Self::Unpause => "unpause",
            Self::Recheck => "recheck",
            Self::Remove => "remove",
            Self::RemoveData => "removedata",
        }
    }
}

/// The four documented file priority levels.
///
/// [`TorrentControl::set_priority`] takes the raw integer and does not check it,
/// this enum only names the values the daemon documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FilePriority {
    /// Do not download.
    Skip = 0,
    #[allow(missing_docs)]
    Low = 1,
    #[allow(missing_docs)]
    Normal = 2,
    #[allow(missing_docs)]
    High = 3,
}

impl From<FilePriority> for u8 {
    fn from(priority: FilePriority) -> Self {
        priority as u8
    }
}

/// TorrentControl defines the operations a WebUI client offers once authenticated.
#[allow(async_fn_in_trait)]
pub trait TorrentControl {
    /// Fetch a complete snapshot of torrents and labels.
    async fn list_torrents(&self) -> Outcome<TorrentListSnapshot>;
    /// List the files of a torrent, in daemon order. `hash` is the torrent hash.
    async fn get_files(&self, hash: &str) -> Outcome<Vec<FileRecord>>;
    /// Run a lifecycle action on a torrent.
    async fn perform(&self, action: TorrentAction, hash: &str) -> Outcome<()>;
    /// Set the priority of one file. `priority` is passed to the daemon unchecked.
    async fn set_priority(&self, hash: &str, file_index: usize, priority: u8) -> Outcome<()>;
    /// Upload a local .torrent file.
    async fn add_by_file(&self, path: &Path) -> Outcome<()>;
    /// Add a torrent from an HTTP URL or a magnet link.
    async fn add_by_url(&self, url: &str) -> Outcome<()>;

    /// Start a torrent.
    async fn start(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Start, hash).await
    }
    /// Stop a torrent.
    async fn stop(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Stop, hash).await
    }
    /// Pause a torrent.
    async fn pause(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Pause, hash).await
    }
    /// Force-start a torrent.
    async fn force_start(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::ForceStart, hash).await
    }
    /// Unpause a torrent.
    async fn unpause(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Unpause, hash).await
    }
    /// Re-check a torrent.
    async fn recheck(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Recheck, hash).await
    }
    /// Remove a torrent, keeping its data.
    async fn remove(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::Remove, hash).await
    }
    /// Remove a torrent together with its data.
    async fn remove_data(&self, hash: &str) -> Outcome<()> {
        self.perform(TorrentAction::RemoveData, hash).await
    }
}

/// Status bitmask of a torrent. Bit 0 is `started`, bit 7 is `loaded`; higher bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StatusFlags {
    started: bool,
    checking: bool,
    start_after_check: bool,
    checked: bool,
    error: bool,
    paused: bool,
    queued: bool,
    loaded: bool,
}

impl StatusFlags {
    /// Flags in bit order, starting at bit 0.
    pub(crate) fn from_bits(bits: [bool; 8]) -> Self {
        let [
            started,
            checking,
            start_after_check,
            checked,
            error,
            paused,
            queued,
            loaded,
        ] = bits;
        Self {
            started,
            checking,
            start_after_check,
            checked,
            error,
            paused,
            queued,
            loaded,
        }
    }

    #[allow(missing_docs)]
    pub fn started(&self) -> bool {
        self.started
    }

    #[allow(missing_docs)]
    pub fn checking(&self) -> bool {
        self.checking
    }

    #[allow(missing_docs)]
    pub fn start_after_check(&self) -> bool {
        self.start_after_check
    }

    #[allow(missing_docs)]
    pub fn checked(&self) -> bool {
        self.checked
    }

    #[allow(missing_docs)]
    pub fn error(&self) -> bool {
        self.error
    }

    #[allow(missing_docs)]
    pub fn paused(&self) -> bool {
        self.paused
    }

    #[allow(missing_docs)]
    pub fn queued(&self) -> bool {
        self.queued
    }

    #[allow(missing_docs)]
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// All flags in bit order.
    pub fn bits(&self) -> [bool; 8] {
        [
            self.started,
            self.checking,
            self.start_after_check,
            self.checked,
            self.error,
            self.paused,
            self.queued,
            self.loaded,
        ]
    }
}

// Field order below is the order of the daemon's torrent array.

/// Torrent information, decoded from the daemon's 19-element torrent array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(missing_docs)] // rationale: the fields are the positions of the WebUI torrent array
pub struct TorrentRecord {
    pub hash: String,

    pub status: StatusFlags,

    pub name: String,

    pub size: i64,

    /// Per-mille.
    pub progress: i64,

    pub downloaded: i64,

    pub uploaded: i64,

    /// Per-mille.
    pub ratio: i64,

    /// Bytes per second.
    pub upload_speed: i64,

    /// Bytes per second.
    pub download_speed: i64,

    /// Seconds. The daemon uses `-1` for "unknown".
    pub eta: i64,

    pub label: String,

    pub peers_connected: i64,

    pub peers_in_swarm: i64,

    pub seeds_connected: i64,

    pub seeds_in_swarm: i64,

    /// Fraction scaled to 65535.
    pub availability: i64,

    pub queue_order: i64,

    pub remaining: i64,
}

/// A label and the number of torrents carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LabelRecord {
    /// Label name.
    pub name: String,
    /// Torrents in this label.
    pub count: i64,
}

/// A file inside a torrent, as listed by `getfiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct FileRecord {
    pub name: String,

    pub size: i64,

    pub downloaded: i64,

    /// Raw priority, see [`FilePriority`] for the documented levels.
    pub priority: i64,
}

/// One complete listing of torrents and labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentListSnapshot {
    /// Daemon build number.
    pub build: i64,
    /// Labels in daemon order.
    pub labels: Vec<LabelRecord>,
    /// Torrents in daemon order.
    pub torrents: Vec<TorrentRecord>,
    /// Cache id of this listing, when the daemon sent one.
    pub cache_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_protocol() {
        let names: Vec<_> = [
            TorrentAction::Start,
            TorrentAction::Stop,
            TorrentAction::Pause,
            TorrentAction::ForceStart,
            TorrentAction::Unpause,
            TorrentAction::Recheck,
            TorrentAction::Remove,
            TorrentAction::RemoveData,
        ]
        .iter()
        .map(TorrentAction::as_str)
        .collect();
        assert_eq!(
            names,
            [
                "start",
                "stop",
                "pause",
                "forcestart",
                "unpause",
                "recheck",
                "remove",
                "removedata"
            ]
        );
    }

    #[test]
    fn priority_levels() {
        assert_eq!(u8::from(FilePriority::Skip), 0);
        assert_eq!(u8::from(FilePriority::High), 3);
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(WebUiError::Transport("refused".into()).is_retryable());
        assert!(!WebUiError::InvalidCredentials.is_retryable());
        assert!(!WebUiError::AuthRequired.is_retryable());
        assert!(
            !WebUiError::Protocol(ProtocolError::UnexpectedStatus(500)).is_retryable()
        );
    }
}
