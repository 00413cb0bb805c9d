//! Pool bookkeeping for ready sandboxes.
//!
//! The ready list and every counter live behind one mutex; that lock is
//! the pool's single critical section. Driver work (create, dispatch,
//! destroy) always happens outside it, so callers get back sandboxes to
//! destroy rather than having the pool reach into the driver.

use std::time::Duration;

use tokio::sync::Mutex;

use super::instance::{Sandbox, SandboxState};

/// Smoothing factor for the pool-hit moving average.
const HIT_RATE_ALPHA: f64 = 0.1;

/// Aggregate pool counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    pub created: u64,
    pub destroyed: u64,
    /// Live instances currently outside the pool (running).
    pub active: u64,
    /// Ready instances currently in the pool.
    pub ready: usize,
    /// Exponential moving average of acquisition hits.
    pub hit_rate_ema: f64,
    /// Exponential moving average of cold-start milliseconds.
    pub cold_start_ema_ms: f64,
    /// Live instances as a share of the configured ceiling.
    pub utilization: f64,
}

struct PoolState {
    ready: Vec<Sandbox>,
    created: u64,
    destroyed: u64,
    hit_rate_ema: f64,
    cold_start_ema_ms: f64,
    acquisitions: u64,
}

impl PoolState {
    fn live(&self) -> u64 {
        self.created.saturating_sub(self.destroyed)
    }

    /// Update the hit EMA on every acquisition outcome, hit or miss,
    /// so the average converges on the true rate.
    fn record_outcome(&mut self, hit: bool) {
        let outcome = if hit { 1.0 } else { 0.0 };
        if self.acquisitions == 0 {
            self.hit_rate_ema = outcome;
        } else {
            self.hit_rate_ema = HIT_RATE_ALPHA * outcome + (1.0 - HIT_RATE_ALPHA) * self.hit_rate_ema;
        }
        self.acquisitions += 1;
    }
}

/// What happened when a sandbox came back to the pool.
pub enum ReleaseOutcome {
    /// Inserted; nothing displaced.
    Returned,
    /// Inserted after displacing the oldest ready instance, which the
    /// caller must destroy.
    Evicted(Sandbox),
}

pub struct SandboxPool {
    max_instances: usize,
    state: Mutex<PoolState>,
}

impl SandboxPool {
    pub fn new(max_instances: usize) -> Self {
        Self {
            max_instances,
            state: Mutex::new(PoolState {
                ready: Vec::new(),
                created: 0,
                destroyed: 0,
                hit_rate_ema: 0.0,
                cold_start_ema_ms: 0.0,
                acquisitions: 0,
            }),
        }
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Take the least-recently-used ready sandbox, marking it running.
    /// Records the acquisition outcome either way.
    pub async fn acquire(&self) -> Option<Sandbox> {
        let mut state = self.state.lock().await;

        let lru = state
            .ready
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_used_at)
            .map(|(i, _)| i);

        match lru {
            Some(index) => {
                let mut sandbox = state.ready.remove(index);
                state.record_outcome(true);
                // Ready -> Running is always legal for a pooled instance.
                if let Err(e) = sandbox.transition(SandboxState::Running) {
                    tracing::error!(sandbox = %sandbox.id, "Pooled sandbox in bad state: {e}");
                    state.destroyed += 1;
                    return None;
                }
                Some(sandbox)
            }
            None => {
                state.record_outcome(false);
                None
            }
        }
    }

    /// True when a new instance may be created without breaching the cap.
    pub async fn can_create(&self) -> bool {
        let state = self.state.lock().await;
        (state.live() as usize) < self.max_instances
    }

    /// Count a creation and fold its cold start into the moving average.
    pub async fn record_created(&self, cold_start_ms: u64) {
        let mut state = self.state.lock().await;
        state.created += 1;
        if state.created == 1 {
            state.cold_start_ema_ms = cold_start_ms as f64;
        } else {
            state.cold_start_ema_ms = HIT_RATE_ALPHA * cold_start_ms as f64
                + (1.0 - HIT_RATE_ALPHA) * state.cold_start_ema_ms;
        }
    }

    pub async fn record_destroyed(&self, count: u64) {
        let mut state = self.state.lock().await;
        state.destroyed += count;
    }

    /// Return a ready sandbox to the pool. When the pool is full, the
    /// oldest ready instance is displaced and handed back for destruction.
    pub async fn release(&self, sandbox: Sandbox) -> ReleaseOutcome {
        debug_assert_eq!(sandbox.state(), SandboxState::Ready);
        let mut state = self.state.lock().await;

        if state.ready.len() >= self.max_instances {
            let oldest = state
                .ready
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.last_used_at)
                .map(|(i, _)| i);
            if let Some(index) = oldest {
                let evicted = state.ready.remove(index);
                state.ready.push(sandbox);
                return ReleaseOutcome::Evicted(evicted);
            }
        }

        state.ready.push(sandbox);
        ReleaseOutcome::Returned
    }

    /// Remove every ready sandbox idle past the timeout; the caller
    /// destroys them.
    pub async fn take_idle(&self, idle_timeout: Duration) -> Vec<Sandbox> {
        let mut state = self.state.lock().await;
        let mut reaped = Vec::new();
        let mut index = 0;
        while index < state.ready.len() {
            if state.ready[index].idle_for() > idle_timeout {
                reaped.push(state.ready.remove(index));
            } else {
                index += 1;
            }
        }
        reaped
    }

    /// How many instances warming must add to reach the floor.
    pub async fn warm_deficit(&self, min_instances: usize) -> usize {
        let state = self.state.lock().await;
        min_instances.saturating_sub(state.ready.len())
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let live = state.live();
        let ready = state.ready.len();
        PoolStats {
            created: state.created,
            destroyed: state.destroyed,
            active: live.saturating_sub(ready as u64),
            ready,
            hit_rate_ema: state.hit_rate_ema,
            cold_start_ema_ms: state.cold_start_ema_ms,
            utilization: if self.max_instances == 0 {
                0.0
            } else {
                live as f64 / self.max_instances as f64
            },
        }
    }
}
