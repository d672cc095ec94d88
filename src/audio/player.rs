use crate::audio::fetch::{Fetcher, ResourceHandle};
use crate::audio::queue::{QueueState, QueueStore};
use crate::audio::resolver::TrackResolver;
use crate::audio::session::AudioSession;
use crate::audio::track::TrackRef;
use crate::audio::watcher::{CompletionWatcher, EndOfTrackProbe};
use crate::config::PlayerTuning;
use crate::error::{AppError, AppResult, ResolveError};
use crate::events::{PlaybackState, PlayerEvent, PlayerStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const EVENT_CAPACITY: usize = 256;

/// Transport and queue commands a UI can issue.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Append(TrackRef),
    AddQuery(String),
    PlayOrPause,
    Next,
    Previous,
    Stop,
    SelectIndex(usize),
    RemoveAt(usize),
    ToggleReplay,
    SetVolume(u8),
    VolumeUp,
    VolumeDown,
}

enum ControlMessage {
    Command(Command),
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    FetchFinished {
        generation: u64,
        result: AppResult<ResourceHandle>,
    },
    Resolved {
        query: String,
        result: AppResult<TrackRef>,
    },
    RetrySkip {
        generation: u64,
    },
    WatchTick,
    EndConfirm {
        generation: u64,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub queue: QueueState,
    pub state: PlaybackState,
    pub replay: bool,
    pub volume: u8,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Loading,
    Playing,
    Paused,
}

/// Cheap, cloneable front door to the controller. Every method only queues
/// a message and returns; the work happens on the control task.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerHandle {
    pub fn send(&self, command: Command) -> AppResult<()> {
        self.tx
            .send(ControlMessage::Command(command))
            .map_err(|_| AppError::ControllerClosed)
    }

    pub fn append(&self, track: TrackRef) -> AppResult<()> {
        self.send(Command::Append(track))
    }

    pub fn add_query(&self, query: impl Into<String>) -> AppResult<()> {
        self.send(Command::AddQuery(query.into()))
    }

    pub fn play_or_pause(&self) -> AppResult<()> {
        self.send(Command::PlayOrPause)
    }

    pub fn next(&self) -> AppResult<()> {
        self.send(Command::Next)
    }

    pub fn previous(&self) -> AppResult<()> {
        self.send(Command::Previous)
    }

    pub fn stop(&self) -> AppResult<()> {
        self.send(Command::Stop)
    }

    pub fn select(&self, index: usize) -> AppResult<()> {
        self.send(Command::SelectIndex(index))
    }

    pub fn remove(&self, index: usize) -> AppResult<()> {
        self.send(Command::RemoveAt(index))
    }

    pub fn toggle_replay(&self) -> AppResult<()> {
        self.send(Command::ToggleReplay)
    }

    pub fn set_volume(&self, level: u8) -> AppResult<()> {
        self.send(Command::SetVolume(level))
    }

    pub fn volume_up(&self) -> AppResult<()> {
        self.send(Command::VolumeUp)
    }

    pub fn volume_down(&self) -> AppResult<()> {
        self.send(Command::VolumeDown)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> AppResult<PlayerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMessage::Snapshot(reply))
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)
    }

    /// Stops playback and ends the control task.
    pub async fn shutdown(&self) -> AppResult<()> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(ControlMessage::Shutdown(ack))
            .map_err(|_| AppError::ControllerClosed)?;
        rx.await.map_err(|_| AppError::ControllerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Playback state machine. Owns the queue, the cursor, the replay flag and
/// the audio session, and is only ever touched from its own control task.
///
/// Every load-and-play bumps `generation`. Background work (fetches, retry
/// timers, end-of-track confirmations) carries the generation it was started
/// under and is dropped on arrival if the controller has moved on.
pub struct PlaybackController {
    queue: QueueStore,
    phase: Phase,
    replay: bool,
    volume: u8,
    status: PlayerStatus,
    generation: u64,
    bound: Option<ResourceHandle>,
    probe: EndOfTrackProbe,
    tuning: PlayerTuning,
    session: Box<dyn AudioSession>,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn TrackResolver>,
    tx: mpsc::WeakUnboundedSender<ControlMessage>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlaybackController {
    /// Start the control task (and its completion watcher) on the current
    /// tokio runtime.
    pub fn spawn(
        session: Box<dyn AudioSession>,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn TrackResolver>,
        tuning: PlayerTuning,
    ) -> PlayerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut controller = Self {
            queue: QueueStore::new(),
            phase: Phase::Stopped,
            replay: false,
            volume: tuning.volume.min(100),
            status: PlayerStatus::NotPlaying,
            generation: 0,
            bound: None,
            probe: EndOfTrackProbe::new(),
            tuning,
            session,
            fetcher,
            resolver,
            tx: tx.downgrade(),
            events: events.clone(),
        };
        controller.session.set_volume(controller.volume);

        tokio::spawn(controller.run(rx));
        PlayerHandle { tx, events }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlMessage>) {
        let weak = self.tx.clone();
        let watcher = CompletionWatcher::spawn(self.tuning.poll_interval, move || {
            weak.upgrade()
                .map_or(false, |tx| tx.send(ControlMessage::WatchTick).is_ok())
        });

        log::info!("[controller] started");
        while let Some(message) = rx.recv().await {
            if let ControlMessage::Shutdown(ack) = message {
                log::info!("[controller] shutting down");
                watcher.cancel();
                self.halt();
                let _ = ack.send(());
                return;
            }
            self.handle(message);
        }

        watcher.cancel();
        self.halt();
        log::info!("[controller] all handles dropped, stopped");
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Command(command) => self.apply(command),
            ControlMessage::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ControlMessage::FetchFinished { generation, result } => {
                self.on_fetch_finished(generation, result)
            }
            ControlMessage::Resolved { query, result } => self.on_resolved(query, result),
            ControlMessage::RetrySkip { generation } => {
                if generation == self.generation && self.phase == Phase::Stopped {
                    log::info!("[load] skipping ahead after failed track");
                    self.next();
                }
            }
            ControlMessage::WatchTick => self.on_watch_tick(),
            ControlMessage::EndConfirm { generation } => self.on_end_confirm(generation),
            ControlMessage::Shutdown(_) => {}
        }
    }

    fn apply(&mut self, command: Command) {
        log::debug!("[controller] {:?}", command);
        match command {
            Command::Append(track) => self.append(track),
            Command::AddQuery(query) => self.add_query(query),
            Command::PlayOrPause => self.play_or_pause(),
            Command::Next => self.next(),
            Command::Previous => self.previous(),
            Command::Stop => {
                self.halt();
                self.set_status(PlayerStatus::NotPlaying);
            }
            Command::SelectIndex(index) => self.select(index),
            Command::RemoveAt(index) => self.remove(index),
            Command::ToggleReplay => {
                self.replay = !self.replay;
                log::info!("[controller] replay mode {}", self.replay);
                self.emit(PlayerEvent::ReplayModeChanged {
                    enabled: self.replay,
                });
            }
            Command::SetVolume(level) => self.set_volume(level),
            Command::VolumeUp => self.set_volume(self.volume.saturating_add(self.tuning.volume_step)),
            Command::VolumeDown => {
                self.set_volume(self.volume.saturating_sub(self.tuning.volume_step))
            }
        }
    }

    fn state(&self) -> PlaybackState {
        match (self.phase, self.queue.cursor()) {
            (Phase::Loading, Some(i)) => PlaybackState::Loading(i),
            (Phase::Playing, Some(i)) => PlaybackState::Playing(i),
            (Phase::Paused, Some(i)) => PlaybackState::Paused(i),
            _ => PlaybackState::Stopped,
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            queue: self.queue.state(),
            state: self.state(),
            replay: self.replay,
            volume: self.volume,
            status: self.status.clone(),
        }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    fn emit_state(&self) {
        self.emit(PlayerEvent::StateChanged {
            state: self.state(),
            current_index: self.queue.cursor(),
        });
    }

    fn set_status(&mut self, status: PlayerStatus) {
        log::debug!("[controller] status: {}", status);
        self.status = status.clone();
        self.emit(PlayerEvent::StatusChanged { status });
    }

    fn report(&self, err: &AppError) {
        log::warn!("[controller] {}", err);
        self.emit(PlayerEvent::error(err));
    }

    fn current_title(&self) -> String {
        self.queue
            .current()
            .map(|t| t.title().to_string())
            .unwrap_or_default()
    }

    /// Post `message` back to the control task after `delay`.
    fn schedule(&self, delay: Duration, message: ControlMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(message);
            }
        });
    }

    fn unbind(&mut self) {
        if let Some(resource) = self.bound.take() {
            log::debug!("[session] releasing {}", resource.path.display());
            self.session.stop();
        }
    }

    /// Release the session and return to Stopped. The cursor stays put and
    /// any outstanding fetch, retry or end confirmation is invalidated.
    fn halt(&mut self) {
        self.generation += 1;
        self.probe.reset();
        self.unbind();
        if self.phase != Phase::Stopped {
            self.phase = Phase::Stopped;
            self.emit_state();
        }
    }

    fn begin_load(&mut self, index: usize) {
        let track = match self.queue.get(index).cloned() {
            Ok(track) => track,
            Err(e) => {
                self.report(&e);
                return;
            }
        };
        if let Err(e) = self.queue.set_cursor(index) {
            self.report(&e);
            return;
        }

        self.generation += 1;
        self.probe.reset();
        self.unbind();
        self.phase = Phase::Loading;
        self.emit_state();
        self.set_status(PlayerStatus::Loading(track.title().to_string()));

        log::info!(
            "[load] index={} generation={} track={}",
            index,
            self.generation,
            track
        );

        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.tuning.fetch_timeout;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match limit {
                Some(limit) => match tokio::time::timeout(limit, fetcher.fetch(&track)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::FetchFailed(format!(
                        "timed out after {}s",
                        limit.as_secs_f64()
                    ))),
                },
                None => fetcher.fetch(&track).await,
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(ControlMessage::FetchFinished { generation, result });
            }
        });
    }

    fn bind(&mut self, resource: ResourceHandle) -> AppResult<()> {
        self.unbind();
        self.session.load(&resource)?;
        self.bound = Some(resource);
        self.session.set_volume(self.volume);
        if let Err(e) = self.session.play() {
            self.unbind();
            return Err(e);
        }
        Ok(())
    }

    fn on_fetch_finished(&mut self, generation: u64, result: AppResult<ResourceHandle>) {
        if generation != self.generation || self.phase != Phase::Loading {
            log::debug!(
                "[load] discarding stale fetch result (generation {} != {})",
                generation,
                self.generation
            );
            return;
        }
        let Some(index) = self.queue.cursor() else {
            return;
        };

        match result.and_then(|resource| self.bind(resource)) {
            Ok(()) => {
                self.phase = Phase::Playing;
                log::info!("[load] playing index={}", index);
                self.emit_state();
                if let Some(track) = self.queue.current().cloned() {
                    self.set_status(PlayerStatus::NowPlaying(track.title().to_string()));
                    self.emit(PlayerEvent::TrackChanged { index, track });
                }
            }
            Err(e) => {
                log::error!("[load] index={} failed: {}", index, e);
                self.unbind();
                self.phase = Phase::Stopped;
                self.emit_state();
                self.report(&e);
                self.set_status(PlayerStatus::Error(e.to_string()));

                if index + 1 < self.queue.len() {
                    self.schedule(
                        self.tuning.skip_retry_delay,
                        ControlMessage::RetrySkip {
                            generation: self.generation,
                        },
                    );
                }
            }
        }
    }

    fn append(&mut self, track: TrackRef) {
        let was_empty = self.queue.is_empty();
        let index = self.queue.append(track);
        log::info!("[queue] appended at {}", index);
        self.emit(PlayerEvent::QueueChanged {
            length: self.queue.len(),
        });

        if was_empty && self.phase == Phase::Stopped {
            self.begin_load(0);
        }
    }

    fn add_query(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            return;
        }

        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&query).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(ControlMessage::Resolved { query, result });
            }
        });
    }

    fn on_resolved(&mut self, query: String, result: AppResult<TrackRef>) {
        match result {
            Ok(track) => {
                log::info!("[resolve] '{}' -> {}", query, track);
                self.append(track);
            }
            Err(AppError::ResolveFailed(ResolveError::NoResults(_))) => {
                log::info!("[resolve] no results for '{}'", query);
                self.set_status(PlayerStatus::NoResults(query));
            }
            Err(e) => {
                self.report(&e);
                self.set_status(PlayerStatus::SearchFailed(query));
            }
        }
    }

    fn play_or_pause(&mut self) {
        match self.phase {
            Phase::Paused => {
                self.session.resume();
                self.phase = Phase::Playing;
                self.emit_state();
                self.set_status(PlayerStatus::NowPlaying(self.current_title()));
            }
            Phase::Playing => {
                self.session.pause();
                self.probe.reset();
                self.phase = Phase::Paused;
                self.emit_state();
                self.set_status(PlayerStatus::Paused(self.current_title()));
            }
            Phase::Stopped => {
                if !self.queue.is_empty() {
                    self.begin_load(self.queue.cursor().unwrap_or(0));
                }
            }
            Phase::Loading => log::debug!("[controller] play/pause ignored while loading"),
        }
    }

    fn next(&mut self) {
        let len = self.queue.len();
        let candidate = self.queue.cursor().map_or(0, |c| c + 1);

        if candidate < len {
            self.begin_load(candidate);
        } else if self.replay && len > 0 {
            log::info!("[controller] end of queue, wrapping to start");
            self.begin_load(0);
        } else {
            log::info!("[controller] end of queue");
            self.halt();
            self.set_status(PlayerStatus::EndOfQueue);
        }
    }

    fn previous(&mut self) {
        let Some(cursor) = self.queue.cursor() else {
            return;
        };

        let engaged = matches!(self.phase, Phase::Playing | Phase::Paused);
        let threshold = self.tuning.restart_threshold.as_millis() as u64;
        if engaged && self.session.position_millis() > threshold {
            self.restart_current(cursor);
            return;
        }

        if cursor > 0 {
            self.begin_load(cursor - 1);
            return;
        }

        match self.phase {
            Phase::Playing | Phase::Paused => self.restart_current(cursor),
            Phase::Stopped => self.begin_load(cursor),
            Phase::Loading => {}
        }
    }

    fn restart_current(&mut self, index: usize) {
        if let Err(e) = self.session.seek_to_start() {
            log::warn!("[controller] restart failed ({}), reloading", e);
            self.begin_load(index);
            return;
        }
        if self.phase == Phase::Paused {
            self.session.resume();
        }
        self.probe.reset();
        self.phase = Phase::Playing;
        self.emit_state();
        self.set_status(PlayerStatus::NowPlaying(self.current_title()));
    }

    fn select(&mut self, index: usize) {
        if index >= self.queue.len() {
            let err = AppError::OutOfRange {
                index,
                len: self.queue.len(),
            };
            self.report(&err);
            return;
        }
        self.begin_load(index);
    }

    fn remove(&mut self, index: usize) {
        let old_cursor = self.queue.cursor();
        let removed = match self.queue.remove_at(index) {
            Ok(track) => track,
            Err(e) => {
                self.report(&e);
                return;
            }
        };
        log::info!("[queue] removed {} from {}", removed, index);
        self.emit(PlayerEvent::QueueChanged {
            length: self.queue.len(),
        });

        if old_cursor != Some(index) {
            if old_cursor != self.queue.cursor() {
                self.emit_state();
            }
            return;
        }

        self.halt();
        match self.queue.cursor() {
            // Whatever slid into the removed slot becomes current.
            Some(cursor) if cursor == index => self.begin_load(cursor),
            // The tail went away and the cursor is parked on the new last
            // entry: carry on as if that entry had just finished.
            Some(_) => self.next(),
            None => self.set_status(PlayerStatus::NotPlaying),
        }
    }

    fn set_volume(&mut self, level: u8) {
        let level = level.min(100);
        self.volume = level;
        self.session.set_volume(level);
        self.emit(PlayerEvent::VolumeChanged { level });
    }

    fn on_watch_tick(&mut self) {
        let playing = self.phase == Phase::Playing;
        let active = playing && self.session.is_active();
        if let Some(generation) = self.probe.on_tick(playing, active, self.generation) {
            log::debug!("[watcher] session idle, confirming end of track");
            self.schedule(
                self.tuning.end_confirm_delay,
                ControlMessage::EndConfirm { generation },
            );
        }
    }

    fn on_end_confirm(&mut self, generation: u64) {
        let playing = self.phase == Phase::Playing;
        let active = playing && self.session.is_active();
        if !self
            .probe
            .on_confirm(generation, self.generation, playing, active)
        {
            return;
        }

        if let (Some(index), Some(track)) = (self.queue.cursor(), self.queue.current()) {
            log::info!("[watcher] track finished: {}", track);
            let track_id = track.id().to_string();
            self.emit(PlayerEvent::TrackFinished { index, track_id });
        }
        self.next();
    }
}
