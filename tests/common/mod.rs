#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tubequeue::{
    AppError, AppResult, AudioSession, Fetcher, PlaybackController, PlaybackState, PlayerEvent,
    PlayerHandle, PlayerTuning, ResolveError, ResourceHandle, TrackRef, TrackResolver,
};

pub fn track(n: u32) -> TrackRef {
    TrackRef::new(
        format!("t{n}"),
        format!("https://media.example/t{n}"),
        format!("T{n}"),
    )
}

pub fn resource(track_id: &str) -> ResourceHandle {
    ResourceHandle {
        track_id: track_id.to_string(),
        path: PathBuf::from(format!("/cache/{track_id}.audio")),
        from_cache: false,
    }
}

// ---------------------------------------------------------------------------
// Audio session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SessionLog {
    pub loaded: Option<String>,
    pub active: bool,
    pub paused: bool,
    pub position_ms: u64,
    pub volume: u8,
    /// Track ids in the order they were bound.
    pub loads: Vec<String>,
    /// Loads issued while another resource was still bound.
    pub double_binds: usize,
    pub seeks: usize,
    pub stops: usize,
    pub fail_load: HashSet<String>,
    /// Number of upcoming `is_active` probes that report idle even though a
    /// track is playing.
    pub transient_idle_probes: usize,
}

#[derive(Clone, Default)]
pub struct MockSession {
    pub log: Arc<Mutex<SessionLog>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SessionLog) -> R) -> R {
        f(&mut self.log.lock().unwrap())
    }

    /// Simulate the current track running out on its own.
    pub fn finish_track(&self) {
        self.with(|log| log.active = false);
    }

    pub fn loads(&self) -> Vec<String> {
        self.with(|log| log.loads.clone())
    }
}

impl AudioSession for MockSession {
    fn load(&mut self, resource: &ResourceHandle) -> AppResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_load.contains(&resource.track_id) {
            return Err(AppError::Session(format!(
                "cannot decode {}",
                resource.path.display()
            )));
        }
        if log.loaded.is_some() {
            log.double_binds += 1;
        }
        log.loaded = Some(resource.track_id.clone());
        log.loads.push(resource.track_id.clone());
        Ok(())
    }

    fn play(&mut self) -> AppResult<()> {
        let mut log = self.log.lock().unwrap();
        log.active = true;
        log.paused = false;
        log.position_ms = 0;
        Ok(())
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().paused = true;
    }

    fn resume(&mut self) {
        self.log.lock().unwrap().paused = false;
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.loaded = None;
        log.active = false;
        log.paused = false;
        log.stops += 1;
    }

    fn seek_to_start(&mut self) -> AppResult<()> {
        let mut log = self.log.lock().unwrap();
        log.position_ms = 0;
        log.seeks += 1;
        Ok(())
    }

    fn is_active(&self) -> bool {
        let mut log = self.log.lock().unwrap();
        if log.transient_idle_probes > 0 {
            log.transient_idle_probes -= 1;
            return false;
        }
        log.active && log.loaded.is_some()
    }

    fn position_millis(&self) -> u64 {
        self.log.lock().unwrap().position_ms
    }

    fn set_volume(&mut self, level: u8) {
        self.log.lock().unwrap().volume = level;
    }
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// Resolves immediately, failing for ids in `failing`.
#[derive(Default)]
pub struct InstantFetcher {
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl InstantFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn calls_for(&self, track_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(track_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for InstantFetcher {
    async fn fetch(&self, track: &TrackRef) -> AppResult<ResourceHandle> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(track.id().to_string())
            .or_default() += 1;
        if self.failing.contains(track.id()) {
            return Err(AppError::FetchFailed(format!("extraction failed for {}", track.id())));
        }
        Ok(resource(track.id()))
    }
}

/// Holds every fetch open until the test releases it.
#[derive(Default)]
pub struct GatedFetcher {
    pending: Mutex<Vec<(String, oneshot::Sender<AppResult<ResourceHandle>>)>>,
    calls: AtomicUsize,
}

impl GatedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn wait_pending(&self, track_id: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let n = self
                    .pending_ids()
                    .iter()
                    .filter(|id| id.as_str() == track_id)
                    .count();
                if n >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fetch never started");
    }

    /// Release every pending fetch for `track_id` successfully.
    pub fn complete(&self, track_id: &str) -> usize {
        self.release(track_id, || Ok(resource(track_id)))
    }

    pub fn fail(&self, track_id: &str) -> usize {
        self.release(track_id, || {
            Err(AppError::FetchFailed(format!("network error for {}", track_id)))
        })
    }

    fn release(
        &self,
        track_id: &str,
        outcome: impl Fn() -> AppResult<ResourceHandle>,
    ) -> usize {
        let mut pending = self.pending.lock().unwrap();
        let (matching, rest): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|(id, _)| id == track_id);
        *pending = rest;
        let released = matching.len();
        for (_, tx) in matching {
            let _ = tx.send(outcome());
        }
        released
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, track: &TrackRef) -> AppResult<ResourceHandle> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .push((track.id().to_string(), tx));
        self.calls.fetch_add(1, Ordering::SeqCst);
        rx.await
            .unwrap_or_else(|_| Err(AppError::FetchFailed("gate dropped".into())))
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StubResolver {
    hits: HashMap<String, Result<TrackRef, ResolveError>>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(mut self, query: &str, track: TrackRef) -> Self {
        self.hits.insert(query.to_string(), Ok(track));
        self
    }

    pub fn error(mut self, query: &str, err: ResolveError) -> Self {
        self.hits.insert(query.to_string(), Err(err));
        self
    }
}

#[async_trait]
impl TrackResolver for StubResolver {
    async fn resolve(&self, query_or_url: &str) -> AppResult<TrackRef> {
        match self.hits.get(query_or_url) {
            Some(Ok(track)) => Ok(track.clone()),
            Some(Err(e)) => Err(e.clone().into()),
            None => Err(ResolveError::NoResults(query_or_url.to_string()).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub player: PlayerHandle,
    pub session: MockSession,
    pub events: broadcast::Receiver<PlayerEvent>,
}

impl Harness {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_parts(fetcher, Arc::new(StubResolver::new()), PlayerTuning::default())
    }

    pub fn with_parts(
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn TrackResolver>,
        tuning: PlayerTuning,
    ) -> Self {
        let session = MockSession::new();
        let player =
            PlaybackController::spawn(Box::new(session.clone()), fetcher, resolver, tuning);
        let events = player.subscribe();
        Self {
            player,
            session,
            events,
        }
    }

    pub async fn wait_for<F>(&mut self, mut pred: F) -> PlayerEvent
    where
        F: FnMut(&PlayerEvent) -> bool,
    {
        let events = &mut self.events;
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_for_state(&mut self, state: PlaybackState) {
        self.wait_for(|e| matches!(e, PlayerEvent::StateChanged { state: s, .. } if *s == state))
            .await;
    }

    /// Append tracks 1..=n and wait until track 1 is playing.
    pub async fn start_with(&mut self, n: u32) {
        for i in 1..=n {
            self.player.append(track(i)).unwrap();
        }
        self.wait_for_state(PlaybackState::Playing(0)).await;
    }

    pub async fn state(&self) -> PlaybackState {
        self.player.snapshot().await.unwrap().state
    }

    pub async fn titles(&self) -> Vec<String> {
        self.player
            .snapshot()
            .await
            .unwrap()
            .queue
            .tracks
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }
}
