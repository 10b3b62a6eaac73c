//! Highscore bookkeeping: inline update on reset, periodic sweep, sweep clock.

use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{domain::ChannelId, store::CountingStore, Error, Result};

/// What happened to the highscore after a count was lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighscoreEvent {
    /// The lost count beat the stored highscore and was persisted.
    NewHighscore { highscore: i64 },
    /// The stored highscore still stands.
    Unchanged { highscore: i64 },
}

impl HighscoreEvent {
    pub fn highscore(&self) -> i64 {
        match self {
            HighscoreEvent::NewHighscore { highscore } | HighscoreEvent::Unchanged { highscore } => {
                *highscore
            }
        }
    }
}

/// Compare a just-lost count against the stored highscore.
pub fn judge_lost_count(lost_count: i64, stored: i64) -> HighscoreEvent {
    if lost_count > stored {
        HighscoreEvent::NewHighscore {
            highscore: lost_count,
        }
    } else {
        HighscoreEvent::Unchanged { highscore: stored }
    }
}

/// Process-wide timestamp of the last completed sweep.
///
/// Stored as unix milliseconds; `0` means no sweep has run yet.
#[derive(Debug, Default)]
pub struct SweepClock {
    last_sweep_ms: AtomicI64,
}

impl SweepClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, at: DateTime<Utc>) {
        self.last_sweep_ms
            .store(at.timestamp_millis().max(1), Ordering::SeqCst);
    }

    pub fn last_sweep(&self) -> Option<DateTime<Utc>> {
        match self.last_sweep_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::<Utc>::from_timestamp_millis(ms),
        }
    }
}

/// Data shown by the highscore command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HighscoreView {
    pub highscore: i64,
    pub last_sweep: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct HighscoreTracker {
    store: Arc<dyn CountingStore>,
    clock: Arc<SweepClock>,
}

impl HighscoreTracker {
    pub fn new(store: Arc<dyn CountingStore>, clock: Arc<SweepClock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<SweepClock> {
        &self.clock
    }

    /// Reset `channel` after a lost count, persisting `lost_count` if it beats
    /// the stored highscore. One store write covers both.
    pub async fn record_reset(
        &self,
        channel: ChannelId,
        lost_count: i64,
    ) -> Result<HighscoreEvent> {
        let event = self.store.reject_and_record(channel, lost_count).await?;
        if let HighscoreEvent::NewHighscore { highscore } = event {
            info!(channel_id = channel.0, highscore, "New highscore");
        }
        Ok(event)
    }

    /// Raise every stored highscore to its channel's live count where that is larger.
    ///
    /// Taking the max is order-independent, so this can race inline updates freely.
    pub async fn sweep(&self) -> Result<usize> {
        let raised = self.store.raise_highscores().await?;
        self.clock.record(Utc::now());
        info!(raised, "Highscore sweep finished");
        Ok(raised)
    }

    /// Administrative reset to 0. The only way a highscore ever decreases.
    ///
    /// Callers serialize this with the channel's game; see
    /// [`crate::game::CountingGame::reset_highscore`].
    pub async fn reset(&self, channel: ChannelId) -> Result<()> {
        if !self.store.channel_is_registered(channel).await? {
            return Err(Error::ChannelNotRegistered(channel));
        }
        self.store.set_highscore(channel, 0).await?;
        info!(channel_id = channel.0, "Highscore reset");
        Ok(())
    }

    pub async fn view(&self, channel: ChannelId) -> Result<HighscoreView> {
        if !self.store.channel_is_registered(channel).await? {
            return Err(Error::ChannelNotRegistered(channel));
        }
        Ok(HighscoreView {
            highscore: self.store.get_highscore(channel).await?,
            last_sweep: self.clock.last_sweep(),
        })
    }
}

/// Background task running [`HighscoreTracker::sweep`] on a fixed interval.
///
/// The first sweep runs immediately on start.
pub struct HighscoreSweeper {
    tracker: HighscoreTracker,
    interval: Duration,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HighscoreSweeper {
    pub fn new(tracker: HighscoreTracker, interval: Duration) -> Self {
        Self {
            tracker,
            interval,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the sweep loop, if not already running.
    pub async fn start(&self) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }

        let tracker = self.tracker.clone();
        let cancel = self.cancel.clone();
        let period = self.interval.max(Duration::from_secs(1));
        *slot = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = tracker.sweep().await {
                            error!(error = %e, "Highscore sweep failed");
                        }
                    }
                }
            }
            debug!("Highscore sweeper stopped");
        }));
        info!(interval_secs = period.as_secs(), "Highscore sweeper started");
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::ChannelState, store::MemoryStore};

    async fn setup() -> (Arc<MemoryStore>, HighscoreTracker) {
        let store = Arc::new(MemoryStore::new());
        let tracker = HighscoreTracker::new(store.clone(), Arc::new(SweepClock::new()));
        (store, tracker)
    }

    #[test]
    fn judge_only_raises_on_strictly_greater() {
        assert_eq!(
            judge_lost_count(5, 4),
            HighscoreEvent::NewHighscore { highscore: 5 }
        );
        assert_eq!(
            judge_lost_count(4, 4),
            HighscoreEvent::Unchanged { highscore: 4 }
        );
        assert_eq!(
            judge_lost_count(0, 0),
            HighscoreEvent::Unchanged { highscore: 0 }
        );
    }

    #[test]
    fn sweep_clock_starts_empty() {
        let clock = SweepClock::new();
        assert_eq!(clock.last_sweep(), None);

        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        clock.record(at);
        assert_eq!(clock.last_sweep(), Some(at));
    }

    #[tokio::test]
    async fn record_reset_never_lowers_highscore() {
        let (store, tracker) = setup().await;
        let ch = ChannelId(1);
        store.register_channel(ch).await.unwrap();

        assert_eq!(
            tracker.record_reset(ch, 8).await.unwrap(),
            HighscoreEvent::NewHighscore { highscore: 8 }
        );
        assert_eq!(
            tracker.record_reset(ch, 3).await.unwrap(),
            HighscoreEvent::Unchanged { highscore: 8 }
        );
        assert_eq!(store.get_highscore(ch).await.unwrap(), 8);
        assert_eq!(
            store.get_channel_state(ch).await.unwrap(),
            Some(ChannelState::reset())
        );
    }

    #[tokio::test]
    async fn sweep_is_idempotent_and_stamps_clock() {
        let (store, tracker) = setup().await;
        let (a, b) = (ChannelId(1), ChannelId(2));
        store.register_channel(a).await.unwrap();
        store.register_channel(b).await.unwrap();
        store
            .set_channel_state(
                a,
                ChannelState {
                    count: 12,
                    contributor: None,
                },
            )
            .await
            .unwrap();
        store.set_highscore(b, 30).await.unwrap();

        assert_eq!(tracker.sweep().await.unwrap(), 1);
        assert_eq!(store.get_highscore(a).await.unwrap(), 12);
        assert_eq!(store.get_highscore(b).await.unwrap(), 30);
        assert!(tracker.clock().last_sweep().is_some());

        assert_eq!(tracker.sweep().await.unwrap(), 0);
        assert_eq!(store.get_highscore(a).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn reset_and_view_require_registration() {
        let (store, tracker) = setup().await;
        let ch = ChannelId(5);
        assert!(matches!(
            tracker.view(ch).await,
            Err(Error::ChannelNotRegistered(_))
        ));
        assert!(matches!(
            tracker.reset(ch).await,
            Err(Error::ChannelNotRegistered(_))
        ));

        store.register_channel(ch).await.unwrap();
        store.set_highscore(ch, 40).await.unwrap();
        assert_eq!(tracker.view(ch).await.unwrap().highscore, 40);
        tracker.reset(ch).await.unwrap();
        assert_eq!(tracker.view(ch).await.unwrap().highscore, 0);
    }

    #[tokio::test]
    async fn sweeper_runs_immediately_and_stops() {
        let (store, tracker) = setup().await;
        let ch = ChannelId(9);
        store.register_channel(ch).await.unwrap();
        store
            .set_channel_state(
                ch,
                ChannelState {
                    count: 4,
                    contributor: None,
                },
            )
            .await
            .unwrap();

        let sweeper = HighscoreSweeper::new(tracker.clone(), Duration::from_secs(3600));
        sweeper.start().await;
        for _ in 0..50 {
            if tracker.clock().last_sweep().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.stop().await;

        assert!(tracker.clock().last_sweep().is_some());
        assert_eq!(store.get_highscore(ch).await.unwrap(), 4);
    }
}
