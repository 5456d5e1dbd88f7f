//! Per-player input rate limiting

use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::time::Duration;

use crate::game::PlayerId;

/// Keyed limiter, one cell per player
pub type KeyedLimiter = RateLimiter<PlayerId, DefaultKeyedStateStore<PlayerId>, DefaultClock>;

/// Enforces a minimum interval between accepted inputs of each player.
///
/// Burst size is one: a message arriving before the interval has elapsed is
/// rejected outright, it is never delayed or merged into a later one.
pub struct PlayerRateLimiter {
    limiter: Option<KeyedLimiter>,
}

impl PlayerRateLimiter {
    /// A zero interval disables limiting
    pub fn new(min_interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(min_interval).map(RateLimiter::keyed),
        }
    }

    /// Check if an input from this player is allowed now (returns true if allowed)
    pub fn check(&self, player_id: &PlayerId) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(player_id).is_ok(),
            None => true,
        }
    }

    /// Drop bookkeeping for players whose cells have fully replenished
    pub fn shrink(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }
}
