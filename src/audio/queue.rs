use crate::audio::track::TrackRef;
use crate::error::{AppError, AppResult};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    pub tracks: Vec<TrackRef>,
    pub current_index: Option<usize>,
}

/// Ordered playlist plus the cursor marking the current entry.
///
/// `None` is the "nothing current" cursor and the only legal value while the
/// queue is empty. Otherwise the cursor always indexes a live entry. The
/// store does no locking; the playback controller owns it exclusively.
#[derive(Debug, Default)]
pub struct QueueStore {
    tracks: Vec<TrackRef>,
    cursor: Option<usize>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to the end and returns the new entry's index.
    pub fn append(&mut self, track: TrackRef) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Removes the entry at `index`, keeping the cursor on the same logical
    /// track when an earlier entry goes away. Removing the current entry
    /// leaves the cursor on whatever slid into its slot, or on the new last
    /// entry if the tail was removed.
    pub fn remove_at(&mut self, index: usize) -> AppResult<TrackRef> {
        if index >= self.tracks.len() {
            return Err(self.out_of_range(index));
        }

        let removed = self.tracks.remove(index);

        if let Some(current) = self.cursor {
            if index < current {
                self.cursor = Some(current - 1);
            } else if index == current && current >= self.tracks.len() {
                self.cursor = if self.tracks.is_empty() {
                    None
                } else {
                    Some(self.tracks.len() - 1)
                };
            }
        }

        Ok(removed)
    }

    pub fn get(&self, index: usize) -> AppResult<&TrackRef> {
        self.tracks
            .get(index)
            .ok_or_else(|| self.out_of_range(index))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn set_cursor(&mut self, index: usize) -> AppResult<()> {
        if index >= self.tracks.len() {
            return Err(self.out_of_range(index));
        }
        self.cursor = Some(index);
        Ok(())
    }

    pub fn current(&self) -> Option<&TrackRef> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            tracks: self.tracks.clone(),
            current_index: self.cursor,
        }
    }

    fn out_of_range(&self, index: usize) -> AppError {
        AppError::OutOfRange {
            index,
            len: self.tracks.len(),
        }
    }
}
