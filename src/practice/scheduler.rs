//! Отменяемые ожидания для сессий
//!
//! Таймеры пауз и слежение за позицией воспроизведения сведены к одному
//! примитиву: "ждать, пока условие не выполнится или не истечёт время".
//! Все ожидания сессии отменяются одним вызовом [`Scheduler::cancel_all`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

type Predicate = Box<dyn Fn() -> bool + Send + Sync>;

/// What a wait is waiting for.
pub enum WaitCondition {
    /// A plain timer
    After(Duration),
    /// Polls `predicate` every `poll` until it returns true
    Until { predicate: Predicate, poll: Duration },
    /// Like `Until`, but gives up after `timeout`
    UntilOrAfter {
        predicate: Predicate,
        poll: Duration,
        timeout: Duration,
    },
}

impl WaitCondition {
    pub fn after(duration: Duration) -> Self {
        WaitCondition::After(duration)
    }

    pub fn until<F>(predicate: F, poll: Duration) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        WaitCondition::Until {
            predicate: Box::new(predicate),
            poll,
        }
    }

    pub fn until_or_after<F>(predicate: F, poll: Duration, timeout: Duration) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        WaitCondition::UntilOrAfter {
            predicate: Box::new(predicate),
            poll,
            timeout,
        }
    }
}

impl fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::After(d) => write!(f, "After({:?})", d),
            WaitCondition::Until { poll, .. } => write!(f, "Until(poll={:?})", poll),
            WaitCondition::UntilOrAfter { poll, timeout, .. } => {
                write!(f, "UntilOrAfter(poll={:?}, timeout={:?})", poll, timeout)
            }
        }
    }
}

/// How a wait finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The duration ran out
    Elapsed,
    /// The predicate became true
    Reached,
    Cancelled,
}

/// Owner of every pending wait of one session.
pub struct Scheduler {
    token: Mutex<CancellationToken>,
    /// Увеличивается при каждой отмене; события со старой эпохой устарели
    epoch: AtomicU64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(CancellationToken::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Token of the current generation. Work guarded by it stops on the next
    /// [`cancel_all`](Self::cancel_all).
    pub fn token(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// Cancels every pending wait and returns the new epoch.
    pub fn cancel_all(&self) -> u64 {
        let mut token = self.token.lock();
        token.cancel();
        *token = CancellationToken::new();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Cancelled pending waits, epoch is now {}", epoch);
        epoch
    }

    /// Waits on the current generation.
    pub async fn wait(&self, condition: WaitCondition) -> WaitOutcome {
        wait_with(self.token(), condition).await
    }

    /// Runs a wait in the background and hands its outcome to `on_done`.
    ///
    /// `on_done` also runs on cancellation, with [`WaitOutcome::Cancelled`].
    pub fn spawn<F>(&self, condition: WaitCondition, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(WaitOutcome) + Send + 'static,
    {
        let token = self.token();
        tokio::spawn(async move {
            let outcome = wait_with(token, condition).await;
            on_done(outcome);
        })
    }
}

/// Waits for `condition` unless `token` is cancelled first.
pub async fn wait_with(token: CancellationToken, condition: WaitCondition) -> WaitOutcome {
    match condition {
        WaitCondition::After(duration) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => WaitOutcome::Cancelled,
                _ = sleep(duration) => WaitOutcome::Elapsed,
            }
        }
        WaitCondition::Until { predicate, poll } => loop {
            if token.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if predicate() {
                return WaitOutcome::Reached;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return WaitOutcome::Cancelled,
                _ = sleep(poll) => {}
            }
        },
        WaitCondition::UntilOrAfter {
            predicate,
            poll,
            timeout,
        } => {
            let deadline = Instant::now() + timeout;
            loop {
                if token.is_cancelled() {
                    return WaitOutcome::Cancelled;
                }
                if predicate() {
                    return WaitOutcome::Reached;
                }
                let now = Instant::now();
                if now >= deadline {
                    return WaitOutcome::Elapsed;
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return WaitOutcome::Cancelled,
                    _ = sleep(poll.min(deadline - now)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(50);

    #[tokio::test(start_paused = true)]
    async fn test_timer_elapses() {
        let scheduler = Scheduler::new();
        let started = Instant::now();

        let outcome = scheduler.wait(WaitCondition::after(Duration::from_secs(3))).await;

        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_is_reached() {
        let scheduler = Scheduler::new();
        let flag = Arc::new(AtomicBool::new(false));

        let setter = flag.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let watched = flag.clone();
        let outcome = scheduler
            .wait(WaitCondition::until(move || watched.load(Ordering::SeqCst), POLL))
            .await;
        assert_eq!(outcome, WaitOutcome::Reached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_or_after_times_out() {
        let scheduler = Scheduler::new();
        let outcome = scheduler
            .wait(WaitCondition::until_or_after(|| false, POLL, Duration::from_secs(1)))
            .await;
        assert_eq!(outcome, WaitOutcome::Elapsed);

        let outcome = scheduler
            .wait(WaitCondition::until_or_after(|| true, POLL, Duration::from_secs(1)))
            .await;
        assert_eq!(outcome, WaitOutcome::Reached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_every_wait() {
        let scheduler = Scheduler::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for _ in 0..3 {
            let tx = tx.clone();
            scheduler.spawn(WaitCondition::after(Duration::from_secs(10)), move |outcome| {
                let _ = tx.send(outcome);
            });
        }
        let tx2 = tx.clone();
        scheduler.spawn(WaitCondition::until(|| false, POLL), move |outcome| {
            let _ = tx2.send(outcome);
        });
        drop(tx);

        tokio::task::yield_now().await;
        assert_eq!(scheduler.cancel_all(), 1);

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        assert_eq!(outcomes, vec![WaitOutcome::Cancelled; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_after_cancel_use_fresh_token() {
        let scheduler = Scheduler::new();
        scheduler.cancel_all();

        let outcome = scheduler.wait(WaitCondition::after(Duration::from_millis(10))).await;
        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert_eq!(scheduler.epoch(), 1);
    }
}
