use crate::audio::track::TrackRef;
use serde::Serialize;
use std::fmt;

pub const PLAYBACK_STATE_CHANGED: &str = "playback:state-changed";
pub const PLAYBACK_QUEUE_CHANGED: &str = "playback:queue-changed";
pub const PLAYBACK_TRACK_CHANGED: &str = "playback:track-changed";
pub const PLAYBACK_TRACK_ENDED: &str = "playback:track-ended";
pub const PLAYBACK_STATUS: &str = "playback:status";
pub const PLAYBACK_VOLUME_CHANGED: &str = "playback:volume-changed";
pub const PLAYBACK_REPLAY_CHANGED: &str = "playback:replay-changed";
pub const PLAYBACK_ERROR: &str = "playback:error";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", content = "index", rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Loading(usize),
    Playing(usize),
    Paused(usize),
}

impl PlaybackState {
    pub fn index(&self) -> Option<usize> {
        match self {
            PlaybackState::Stopped => None,
            PlaybackState::Loading(i) | PlaybackState::Playing(i) | PlaybackState::Paused(i) => {
                Some(*i)
            }
        }
    }
}

/// The one-line label a UI shows under the transport controls.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum PlayerStatus {
    NotPlaying,
    Loading(String),
    NowPlaying(String),
    Paused(String),
    EndOfQueue,
    NoResults(String),
    /// Every search backend failed for this query.
    SearchFailed(String),
    Error(String),
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerStatus::NotPlaying => write!(f, "Not Playing"),
            PlayerStatus::Loading(title) => write!(f, "Loading: {}", title),
            PlayerStatus::NowPlaying(title) => write!(f, "Now Playing: {}", title),
            PlayerStatus::Paused(title) => write!(f, "Paused: {}", title),
            PlayerStatus::EndOfQueue => write!(f, "End of Queue"),
            PlayerStatus::NoResults(_) => write!(f, "No results found"),
            PlayerStatus::SearchFailed(_) => write!(f, "Could not find song"),
            PlayerStatus::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        state: PlaybackState,
        current_index: Option<usize>,
    },
    QueueChanged {
        length: usize,
    },
    TrackChanged {
        index: usize,
        track: TrackRef,
    },
    #[serde(rename_all = "camelCase")]
    TrackFinished {
        index: usize,
        track_id: String,
    },
    StatusChanged {
        status: PlayerStatus,
    },
    VolumeChanged {
        level: u8,
    },
    ReplayModeChanged {
        enabled: bool,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl PlayerEvent {
    /// Channel name a UI adapter forwards this event on.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => PLAYBACK_STATE_CHANGED,
            PlayerEvent::QueueChanged { .. } => PLAYBACK_QUEUE_CHANGED,
            PlayerEvent::TrackChanged { .. } => PLAYBACK_TRACK_CHANGED,
            PlayerEvent::TrackFinished { .. } => PLAYBACK_TRACK_ENDED,
            PlayerEvent::StatusChanged { .. } => PLAYBACK_STATUS,
            PlayerEvent::VolumeChanged { .. } => PLAYBACK_VOLUME_CHANGED,
            PlayerEvent::ReplayModeChanged { .. } => PLAYBACK_REPLAY_CHANGED,
            PlayerEvent::Error { .. } => PLAYBACK_ERROR,
        }
    }

    pub fn error(err: &crate::error::AppError) -> Self {
        PlayerEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
