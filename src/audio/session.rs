use crate::audio::fetch::ResourceHandle;
use crate::error::AppResult;

/// The single audio output the controller drives.
///
/// At most one resource is loaded at a time. Loading a new resource is only
/// done after `stop()` has released the previous one.
pub trait AudioSession: Send {
    fn load(&mut self, resource: &ResourceHandle) -> AppResult<()>;

    /// Start the loaded resource from position 0.
    fn play(&mut self) -> AppResult<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Stop playback and release the loaded resource.
    fn stop(&mut self);

    fn seek_to_start(&mut self) -> AppResult<()>;

    /// False once the loaded resource has run out or nothing is loaded.
    fn is_active(&self) -> bool;

    fn position_millis(&self) -> u64;

    /// Level in 0..=100.
    fn set_volume(&mut self, level: u8);
}
