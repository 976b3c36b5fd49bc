//! Per-address message rate limiting and banning.
//!
//! Every message sent less than `min_interval` after the sender's previous
//! accepted message costs its remote address one strike. A well-spaced
//! message forgives one strike. Once an address reaches `strike_limit`
//! it is banned for the life of the process: its messages are dropped and
//! new connections from it are refused at accept time.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::error::RelayError;
use crate::registry::ClientId;

/// Source of the current time for rate decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

pub struct AbuseLimiter {
    strikes: HashMap<IpAddr, u32>,
    last_message: HashMap<ClientId, Instant>,
    strike_limit: u32,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl AbuseLimiter {
    pub fn new(strike_limit: u32, min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            strikes: HashMap::new(),
            last_message: HashMap::new(),
            strike_limit,
            min_interval,
            clock,
        }
    }

    /// Decides whether a message from `id` at `addr` may be relayed.
    ///
    /// Returns `Banned` once the address has hit the strike limit and
    /// `RateLimited` for a message that came too soon after the previous
    /// accepted one. Neither outcome updates the client's timestamp.
    pub fn check(&mut self, id: ClientId, addr: IpAddr) -> Result<(), RelayError> {
        if self.is_banned(addr) {
            return Err(RelayError::Banned(addr));
        }

        let now = self.clock.now();
        let too_soon = self
            .last_message
            .get(&id)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.min_interval);

        let strikes = self.strikes.entry(addr).or_insert(0);
        if too_soon {
            *strikes += 1;
            if *strikes >= self.strike_limit {
                warn!("{} reached {} strikes and is now banned", addr, strikes);
            }
            return Err(RelayError::RateLimited {
                addr,
                strikes: *strikes,
            });
        }

        *strikes = strikes.saturating_sub(1);
        self.last_message.insert(id, now);
        Ok(())
    }

    pub fn is_banned(&self, addr: IpAddr) -> bool {
        self.strikes(addr) >= self.strike_limit
    }

    pub fn strikes(&self, addr: IpAddr) -> u32 {
        self.strikes.get(&addr).copied().unwrap_or(0)
    }

    /// Drops the per-connection timestamp. Strikes stay with the address.
    pub fn forget(&mut self, id: ClientId) {
        self.last_message.remove(&id);
    }

    pub fn tracked_clients(&self) -> usize {
        self.last_message.len()
    }
}
