//! Playback transport used by the practice sessions.
//!
//! Transports only signal the end of the whole track, so sessions poll
//! [`PlaybackTransport::position`] to stop at phrase boundaries.

use bytes::Bytes;
use uuid::Uuid;

/// A synthesized phrase clip owned by the session that requested it.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub id: Uuid,
    pub index: usize,
    pub bytes: Bytes,
    /// Seconds
    pub duration: f64,
}

impl AudioClip {
    pub fn new(index: usize, bytes: Bytes, duration: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            bytes,
            duration,
        }
    }
}

/// Audio output as seen by a session.
///
/// Methods take `&self`: implementations keep their own interior state and
/// are shared between a session and its position watchers.
pub trait PlaybackTransport: Send + Sync {
    /// Replaces the current media with a synthesized clip, positioned at 0.
    fn load_clip(&self, clip: &AudioClip);

    /// Drops a previously loaded clip and frees its resources.
    fn unload_clip(&self, clip_id: Uuid);

    fn play(&self);

    fn pause(&self);

    fn seek(&self, position: f64);

    /// Current position in seconds.
    fn position(&self) -> f64;

    /// Duration of the current media in seconds.
    fn duration(&self) -> f64;

    /// True once the current media has played to its end.
    fn is_ended(&self) -> bool;

    fn set_playback_rate(&self, rate: f32);
}
