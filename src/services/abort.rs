//! Abort Coordinator
//!
//! Owns the fallback timer that cancels a generation locally when the server
//! never acknowledges an abort. There is at most one armed timer per channel;
//! each arming gets a fresh generation number, and an expiring timer only
//! acts if its generation is still the current one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    token: CancellationToken,
}

/// Per-channel abort timeout registry
#[derive(Debug, Default)]
pub struct AbortCoordinator {
    timers: Mutex<HashMap<String, ArmedTimer>>,
    next_generation: AtomicU64,
}

impl AbortCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for a channel, replacing (and cancelling) any previous one.
    ///
    /// After `timeout`, `on_expire` is called with the timer's generation. The
    /// callback must confirm the generation with [`take_if_current`] before
    /// acting.
    ///
    /// [`take_if_current`]: AbortCoordinator::take_if_current
    pub async fn arm<F, Fut>(&self, channel_id: &str, timeout: Duration, on_expire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        let previous = self.timers.lock().await.insert(
            channel_id.to_string(),
            ArmedTimer {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let channel = channel_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("[AbortCoordinator] Timer {} for {} disarmed", generation, channel);
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::debug!("[AbortCoordinator] Timer {} for {} expired", generation, channel);
                    on_expire(generation).await;
                }
            }
        });

        generation
    }

    /// Cancel the channel's timer. Returns whether one was armed.
    pub async fn disarm(&self, channel_id: &str) -> bool {
        match self.timers.lock().await.remove(channel_id) {
            Some(timer) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Claim an expired timer: removes the entry and returns `true` only if
    /// `generation` is still the armed one for the channel.
    pub async fn take_if_current(&self, channel_id: &str, generation: u64) -> bool {
        let mut timers = self.timers.lock().await;
        if timers.get(channel_id).map(|t| t.generation) != Some(generation) {
            return false;
        }
        timers.remove(channel_id);
        true
    }

    pub async fn is_armed(&self, channel_id: &str) -> bool {
        self.timers.lock().await.contains_key(channel_id)
    }

    /// Number of armed timers across all channels
    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}
