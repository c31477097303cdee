//! Уведомления о ходе практической сессии
//!
//! Наблюдатели (UI, логирование) подписываются на широковещательный канал
//! и получают события в порядке переходов сессии.

use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::text::scorer::ScoreResult;

/// Размер буфера канала событий
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Something observers may want to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionUpdate {
    /// Началось воспроизведение фразы
    #[serde(rename_all = "camelCase")]
    PhraseStarted { index: usize, loop_iteration: u32 },
    /// Пауза для повторения после фразы
    GapStarted { index: usize, duration: f64 },
    /// Фраза пропущена из-за ошибки синтеза
    PhraseSkipped { index: usize, reason: String },
    Paused { index: usize },
    Resumed { index: usize },
    /// Ответ в диктанте оценён
    Scored { index: usize, result: ScoreResult },
    Completed,
    Stopped,
}

/// Broadcast side of a session.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionUpdate>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.tx.subscribe()
    }

    /// Sends an update; having no subscribers is fine.
    pub fn notify(&self, update: SessionUpdate) {
        if self.tx.send(update).is_err() {
            trace!("No subscribers for session update");
        }
    }
}
