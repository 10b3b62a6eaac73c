use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    config::Config,
    domain::{ChannelId, MessageRef},
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls into the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_channel_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

impl From<&Config> for ThrottleConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            global_min_interval: cfg.global_min_interval,
            per_channel_min_interval: cfg.chat_min_interval,
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces out outbound calls.
///
/// A busy counting channel produces one acknowledgment per message, so without
/// this the bot runs straight into Telegram's per-chat flood limit.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<ChannelId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, channel: ChannelId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_channel.lock().await;
        map.entry(channel)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_channel_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, channel: ChannelId) {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let lim = self.limiter_for(channel).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(channel_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, channel: ChannelId, html: &str) -> Result<MessageRef> {
        self.throttle(channel).await;
        self.inner.send_html(channel, html).await
    }

    async fn reply_html(&self, msg: MessageRef, html: &str) -> Result<MessageRef> {
        self.throttle(msg.channel_id).await;
        self.inner.reply_html(msg, html).await
    }

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.throttle(msg.channel_id).await;
        self.inner.set_reaction(msg, emoji).await
    }
}
