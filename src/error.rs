use serde::Serialize;

/// Why a query or link could not be turned into a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no results found for '{0}'")]
    NoResults(String),

    #[error("search service error: {0}")]
    Service(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resolve failed: {0}")]
    ResolveFailed(#[from] ResolveError),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Index {index} out of range for queue of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("Audio session error: {0}")]
    Session(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Playback controller is no longer running")]
    ControllerClosed,
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ResolveFailed(ResolveError::NoResults(_)) => "no_results",
            AppError::ResolveFailed(ResolveError::Service(_)) => "resolve_failed",
            AppError::FetchFailed(_) => "fetch_failed",
            AppError::OutOfRange { .. } => "out_of_range",
            AppError::Session(_) => "session",
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::ControllerClosed => "controller_closed",
        }
    }

    /// Collapse any error raised while producing a playable resource into
    /// the single `FetchFailed` outcome the orchestrator reacts to.
    pub fn into_fetch_failure(self) -> AppError {
        match self {
            AppError::FetchFailed(_) => self,
            other => AppError::FetchFailed(other.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
