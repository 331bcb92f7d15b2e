//! Artificial latency and packet loss for exercising the netcode under bad
//! network conditions. Sends are deferred or dropped, never blocked.
//!
//! [`OrderedLink`] turns per-datagram delays into release times that never
//! go backwards, so a delayed link stays FIFO like a real route.

use rand::Rng;
use std::time::{Duration, Instant};

/// What to do with one outbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Now,
    After(Duration),
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditioner {
    pub enabled: bool,
    /// Probability in `[0, 1]` that a datagram is lost.
    pub loss: f64,
    /// Inclusive bounds of the uniformly distributed one-way delay, in ms.
    pub latency_ms: (u64, u64),
}

impl LinkConditioner {
    /// Non-finite loss counts as no loss.
    pub fn new(loss: f64, latency_min_ms: u64, latency_max_ms: u64) -> Self {
        let (lo, hi) = if latency_min_ms <= latency_max_ms {
            (latency_min_ms, latency_max_ms)
        } else {
            (latency_max_ms, latency_min_ms)
        };
        Self {
            enabled: true,
            loss: if loss.is_finite() {
                loss.clamp(0.0, 1.0)
            } else {
                0.0
            },
            latency_ms: (lo, hi),
        }
    }

    /// A conditioner that delivers everything immediately.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            loss: 0.0,
            latency_ms: (0, 0),
        }
    }

    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> Delivery {
        if !self.enabled {
            return Delivery::Now;
        }
        if self.loss > 0.0 && rng.gen_bool(self.loss) {
            return Delivery::Drop;
        }
        let (lo, hi) = self.latency_ms;
        let delay = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        if delay == 0 {
            Delivery::Now
        } else {
            Delivery::After(Duration::from_millis(delay))
        }
    }
}

impl Default for LinkConditioner {
    fn default() -> Self {
        Self::disabled()
    }
}

/// A [`LinkConditioner`] that keeps send order across random delays.
#[derive(Debug, Clone, Default)]
pub struct OrderedLink {
    conditioner: LinkConditioner,
    last_release: Option<Instant>,
}

impl OrderedLink {
    pub fn new(conditioner: LinkConditioner) -> Self {
        Self {
            conditioner,
            last_release: None,
        }
    }

    pub fn conditioner(&self) -> LinkConditioner {
        self.conditioner
    }

    /// When a datagram handed over at `now` leaves, or `None` if it is lost.
    /// Never earlier than the datagram scheduled before it.
    pub fn schedule<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Option<Instant> {
        let release = match self.conditioner.plan(rng) {
            Delivery::Drop => return None,
            Delivery::Now => now,
            Delivery::After(delay) => now + delay,
        };
        let release = match self.last_release {
            Some(last) if last > release => last,
            _ => release,
        };
        self.last_release = Some(release);
        Some(release)
    }

    pub fn schedule_random(&mut self, now: Instant) -> Option<Instant> {
        self.schedule(now, &mut rand::thread_rng())
    }
}
