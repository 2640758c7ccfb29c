//! Host hand-off: what a peer does while it holds the token
//!
//! A hand-off runs as one critical section on the world lock so the
//! simulation loop cannot advance the world half-way through a merge. The
//! watermark moves only after the outgoing token is complete; abandoning a
//! hand-off early (the future is dropped) leaves it where it was.

use crate::reconcile::{extract_new, ReconciliationEngine};
use crate::world::{ChangeSource, World};
use log::{debug, info, warn};
use shared::Token;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Highest tick already folded into local state.
///
/// Only the hand-off advances it; any other component may read it.
#[derive(Debug, Default)]
pub struct TickWatermark {
    last_tick: AtomicU64,
}

impl TickWatermark {
    pub fn new(tick: u64) -> Self {
        Self {
            last_tick: AtomicU64::new(tick),
        }
    }

    pub fn get(&self) -> u64 {
        self.last_tick.load(Ordering::Acquire)
    }

    /// Moves the watermark forward. Never lowers it. Returns the new value.
    fn advance(&self, tick: u64) -> u64 {
        let previous = self.last_tick.fetch_max(tick, Ordering::AcqRel);
        previous.max(tick)
    }
}

/// Tokens handled per second, reported at most once a second
#[derive(Debug)]
pub struct TokenRate {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl TokenRate {
    pub fn new(window: Duration) -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
            window,
        }
    }

    /// Counts one hand-off. Returns the rate when a window just closed.
    pub fn record(&mut self) -> Option<f64> {
        self.count += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < self.window {
            return None;
        }

        let rate = f64::from(self.count) / elapsed.as_secs_f64();
        self.count = 0;
        self.window_start = Instant::now();
        Some(rate)
    }
}

pub struct HostHandoff {
    world: Arc<RwLock<World>>,
    engine: ReconciliationEngine,
    watermark: Arc<TickWatermark>,
    history_window: u64,
    rate: TokenRate,
}

impl HostHandoff {
    /// `history_window` is how many ticks of history the token keeps;
    /// 0 keeps everything.
    pub fn new(
        world: Arc<RwLock<World>>,
        engine: ReconciliationEngine,
        history_window: u64,
    ) -> Self {
        Self {
            world,
            engine,
            watermark: Arc::new(TickWatermark::default()),
            history_window,
            rate: TokenRate::new(Duration::from_secs(1)),
        }
    }

    /// Shared handle for components that need to read the watermark
    pub fn watermark(&self) -> Arc<TickWatermark> {
        Arc::clone(&self.watermark)
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Reconciles a received token and returns the token to pass on.
    ///
    /// The received token is never modified.
    pub async fn on_token_received(&mut self, token: &Token) -> Token {
        let mut outgoing = token.clone();
        let watermark = self.watermark.get();

        let next_watermark = {
            let mut world = self.world.write().await;
            let next_watermark = world.current_tick();
            if let Some(newest) = outgoing.newest_tick() {
                if newest > next_watermark {
                    warn!(
                        "Token carries changes up to tick {}, ahead of local tick {}",
                        newest, next_watermark
                    );
                }
            }

            let local = world.drain_local_changes();
            let fresh = extract_new(&outgoing, watermark);
            debug!(
                "Hand-off at tick {}: {} local, {} new token changes above {}",
                next_watermark,
                local.len(),
                fresh.len(),
                watermark
            );

            let merged = self.engine.merge(&mut world, local, fresh);
            outgoing.replace_after(watermark, merged);
            next_watermark
        };

        if self.history_window > 0 {
            let cutoff = next_watermark.saturating_sub(self.history_window);
            let pruned = outgoing.prune_before(cutoff);
            if pruned > 0 {
                debug!("Pruned {} changes older than tick {}", pruned, cutoff);
            }
        }

        let now = self.watermark.advance(next_watermark);
        debug!("Watermark {} -> {}", watermark, now);

        if let Some(rate) = self.rate.record() {
            info!("TPS: {:.1} tokens/s, {} changes in token", rate, outgoing.len());
        }

        outgoing
    }
}
