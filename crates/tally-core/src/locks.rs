use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ChannelId;

/// One async mutex per channel.
///
/// Holding the guard makes the caller the single writer of that channel's
/// `{count, contributor}`; different channels never contend.
#[derive(Default)]
pub struct ChannelLocks {
    inner: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    pub async fn lock(&self, channel: ChannelId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(channel)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
