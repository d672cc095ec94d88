use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Periodic end-of-track probe.
///
/// Audio backends rarely report completion reliably, so the controller is
/// poked on a fixed interval and asks the session itself. The task stops as
/// soon as `tick` reports that nobody is listening any more.
pub struct CompletionWatcher {
    handle: JoinHandle<()>,
}

impl CompletionWatcher {
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    log::debug!("[watcher] controller gone, stopping");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CompletionWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Two-step end detection: an idle session on a tick only arms a
/// confirmation, and the track counts as finished only if the session is
/// still idle when that confirmation comes back for the same generation.
#[derive(Debug, Default)]
pub struct EndOfTrackProbe {
    pending: Option<u64>,
}

impl EndOfTrackProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the generation to confirm when a confirmation should be
    /// scheduled.
    pub fn on_tick(&mut self, playing: bool, session_active: bool, generation: u64) -> Option<u64> {
        if !playing || session_active || self.pending.is_some() {
            return None;
        }
        self.pending = Some(generation);
        Some(generation)
    }

    /// True when the confirmation stands and the track really ended.
    pub fn on_confirm(
        &mut self,
        generation: u64,
        current_generation: u64,
        playing: bool,
        session_active: bool,
    ) -> bool {
        if self.pending != Some(generation) {
            return false;
        }
        self.pending = None;
        generation == current_generation && playing && !session_active
    }

    /// Drop any armed confirmation (pause, stop, restart, new load).
    pub fn reset(&mut self) {
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn active_session_never_arms() {
        let mut probe = EndOfTrackProbe::new();
        assert_eq!(probe.on_tick(true, true, 1), None);
        assert!(!probe.is_armed());
    }

    #[test]
    fn not_playing_never_arms() {
        let mut probe = EndOfTrackProbe::new();
        assert_eq!(probe.on_tick(false, false, 1), None);
    }

    #[test]
    fn idle_then_still_idle_confirms() {
        let mut probe = EndOfTrackProbe::new();
        assert_eq!(probe.on_tick(true, false, 4), Some(4));
        // A second tick while armed does not schedule another confirmation.
        assert_eq!(probe.on_tick(true, false, 4), None);
        assert!(probe.on_confirm(4, 4, true, false));
        assert!(!probe.is_armed());
    }

    #[test]
    fn transient_idle_is_ignored() {
        let mut probe = EndOfTrackProbe::new();
        probe.on_tick(true, false, 2);
        assert!(!probe.on_confirm(2, 2, true, true));
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut probe = EndOfTrackProbe::new();
        probe.on_tick(true, false, 2);
        assert!(!probe.on_confirm(2, 3, true, false));
    }

    #[test]
    fn reset_cancels_confirmation() {
        let mut probe = EndOfTrackProbe::new();
        probe.on_tick(true, false, 7);
        probe.reset();
        assert!(!probe.on_confirm(7, 7, true, false));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_told_to_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let watcher = CompletionWatcher::spawn(Duration::from_secs(1), move || {
            seen.fetch_add(1, Ordering::SeqCst) < 2
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(watcher.is_finished());
    }
}
