use crate::audio::track::TrackRef;
use crate::config::{AppConfig, TranscodeConfig};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A locally playable copy of a track, ready to hand to the audio session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub track_id: String,
    pub path: PathBuf,
    /// True when the file was already on disk and nothing was downloaded.
    pub from_cache: bool,
}

/// Turns a queue entry into a playable resource. May take seconds.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, track: &TrackRef) -> AppResult<ResourceHandle>;
}

/// Retrieves the bytes behind a locator into `dest`.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, locator: &str, dest: &Path) -> AppResult<()>;
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(user_agent: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, locator: &str, dest: &Path) -> AppResult<()> {
        log::info!(
            "Starting audio download: {}...",
            locator.chars().take(100).collect::<String>()
        );
        let response = self.client.get(locator).send().await?;
        let status = response.status();
        let content_len = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        log::info!(
            "Audio download response: status={}, content-length={}",
            status,
            content_len
        );

        if !status.is_success() {
            return Err(AppError::FetchFailed(format!(
                "Download failed: HTTP {}",
                status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut total_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                log::error!(
                    "Audio download stream error after {} bytes: {}",
                    total_bytes,
                    e
                );
                AppError::FetchFailed(format!("Download error: {}", e))
            })?;
            total_bytes += bytes.len() as u64;
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        log::info!("Audio download complete: {} bytes", total_bytes);
        Ok(())
    }
}

/// FFmpeg wrapper that re-encodes a downloaded file into the cache format.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    codec: String,
    bitrate: String,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            codec: config.codec.clone(),
            bitrate: config.bitrate.clone(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.codec
    }

    pub async fn transcode(&self, input: &Path, output: &Path) -> AppResult<()> {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        cmd.arg("-i")
            .arg(input)
            .arg("-y")
            .arg("-vn")
            .arg("-b:a")
            .arg(&self.bitrate)
            .arg("-f")
            .arg(&self.codec)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let result = cmd.output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AppError::FetchFailed(format!("FFmpeg failed: {}", stderr)));
        }
        Ok(())
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<ResourceHandle, String>>>;

struct PipelineInner {
    cache_dir: PathBuf,
    downloader: Arc<dyn Downloader>,
    transcoder: Option<FfmpegTranscoder>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

/// Download-and-cache pipeline.
///
/// Files are cached under a key derived from the track id, so a second fetch
/// of the same track is served from disk. Concurrent fetches of one key share
/// a single download, and that download runs on its own task: it finishes and
/// fills the cache even when every caller has lost interest.
#[derive(Clone)]
pub struct FetchPipeline {
    inner: Arc<PipelineInner>,
}

impl FetchPipeline {
    pub fn new(
        cache_dir: PathBuf,
        downloader: Arc<dyn Downloader>,
        transcoder: Option<FfmpegTranscoder>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                cache_dir,
                downloader,
                transcoder,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let downloader = HttpDownloader::new(&config.user_agent)?;
        Ok(Self::new(
            config.resolved_cache_dir(),
            Arc::new(downloader),
            config.transcode.as_ref().map(FfmpegTranscoder::new),
        ))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Where the resource for `track_id` lives once fetched.
    pub fn cache_path(&self, track_id: &str) -> PathBuf {
        self.inner.cache_path(&cache_key(track_id))
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PipelineInner {
    fn cache_path(&self, key: &str) -> PathBuf {
        let ext = self
            .transcoder
            .as_ref()
            .map(FfmpegTranscoder::extension)
            .unwrap_or("audio");
        self.cache_dir.join(format!("{}.{}", key, ext))
    }

    async fn cached(&self, key: &str, track: &TrackRef) -> Option<ResourceHandle> {
        let path = self.cache_path(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Some(ResourceHandle {
                track_id: track.id().to_string(),
                path,
                from_cache: true,
            })
        } else {
            None
        }
    }

    async fn download_and_store(&self, key: &str, track: &TrackRef) -> AppResult<ResourceHandle> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let part = self
            .cache_dir
            .join(format!("{}.{}.part", key, Uuid::new_v4()));
        log::info!("[fetch] downloading {} -> {}", track, part.display());

        if let Err(e) = self.downloader.download(track.locator(), &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        let final_path = self.cache_path(key);
        match &self.transcoder {
            Some(transcoder) => {
                let staged = self
                    .cache_dir
                    .join(format!("{}.{}.transcode", key, Uuid::new_v4()));
                let result = transcoder.transcode(&part, &staged).await;
                let _ = tokio::fs::remove_file(&part).await;
                if let Err(e) = result {
                    let _ = tokio::fs::remove_file(&staged).await;
                    return Err(e);
                }
                tokio::fs::rename(&staged, &final_path).await?;
            }
            None => tokio::fs::rename(&part, &final_path).await?,
        }

        log::info!("[fetch] cached {} at {}", track, final_path.display());
        Ok(ResourceHandle {
            track_id: track.id().to_string(),
            path: final_path,
            from_cache: false,
        })
    }

    fn forget(&self, key: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[async_trait]
impl Fetcher for FetchPipeline {
    async fn fetch(&self, track: &TrackRef) -> AppResult<ResourceHandle> {
        let key = cache_key(track.id());
        if let Some(handle) = self.inner.cached(&key, track).await {
            log::debug!("[fetch] cache hit for {}", track);
            return Ok(handle);
        }
        self.join_or_start(key, track).await
    }
}

impl FetchPipeline {
    /// Share the in-flight download for `key`, starting one if there is none.
    ///
    /// The started task looks at the cache again before downloading: a
    /// download that finished between the caller's cache miss and this
    /// lookup has already been forgotten from the in-flight map.
    async fn join_or_start(&self, key: String, track: &TrackRef) -> AppResult<ResourceHandle> {
        let shared = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match in_flight.get(&key) {
                Some(existing) => {
                    log::debug!("[fetch] joining in-flight download for {}", track);
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task_key = key.clone();
                    let task_track = track.clone();
                    let task = tokio::spawn(async move {
                        let result = match inner.cached(&task_key, &task_track).await {
                            Some(handle) => Ok(handle),
                            None => inner.download_and_store(&task_key, &task_track).await,
                        };
                        inner.forget(&task_key);
                        result.map_err(|e| match e.into_fetch_failure() {
                            AppError::FetchFailed(reason) => reason,
                            other => other.to_string(),
                        })
                    });
                    let fut = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(format!("fetch task aborted: {}", e)),
                        }
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, fut.clone());
                    fut
                }
            }
        };

        shared.await.map_err(AppError::FetchFailed)
    }
}

/// Stable cache key for a track id: lowercase hex SHA-256.
pub fn cache_key(track_id: &str) -> String {
    let digest = Sha256::digest(track_id.as_bytes());
    format!("{:x}", digest)
}
