//! Playback queue controller for a link/search driven music player.
//!
//! The crate owns the ordered playlist, the "current entry" cursor and the
//! transport state machine. Fetching runs on background tasks and reports
//! back to a single control task; end of track is detected by polling the
//! audio session. Audio output itself is supplied by the embedder through
//! [`AudioSession`].

pub mod audio;
pub mod config;
pub mod error;
pub mod events;

pub use audio::fetch::{Downloader, FetchPipeline, Fetcher, HttpDownloader, ResourceHandle};
pub use audio::player::{Command, PlaybackController, PlayerHandle, PlayerSnapshot};
pub use audio::queue::{QueueState, QueueStore};
pub use audio::resolver::{DirectLinkResolver, HttpSearchResolver, ResolverChain, TrackResolver};
pub use audio::session::AudioSession;
pub use audio::track::TrackRef;
pub use config::{AppConfig, PlayerTuning};
pub use error::{AppError, AppResult, ResolveError};
pub use events::{PlaybackState, PlayerEvent, PlayerStatus};

use std::sync::Arc;

/// Install the `env_logger` backend. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("tubequeue=info"),
    )
    .try_init();
}

/// Wire the default fetch pipeline and resolver chain from `config` around
/// `session` and start the controller. Must be called inside a tokio runtime.
pub fn start(config: &AppConfig, session: Box<dyn AudioSession>) -> AppResult<PlayerHandle> {
    let fetcher = FetchPipeline::from_config(config)?;
    let resolver = ResolverChain::from_config(config)?;
    log::info!(
        "Starting player (cache: {})",
        fetcher.cache_dir().display()
    );
    Ok(PlaybackController::spawn(
        session,
        Arc::new(fetcher),
        Arc::new(resolver),
        config.tuning(),
    ))
}
