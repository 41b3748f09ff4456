//! Simulated count source for running without camera hardware
//!
//! count = base + spike, base uniform in [5, 30], spike zero two times in
//! three and otherwise uniform in [10, 60]. One sample per tick.

use crate::services::CountSource;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

pub const BASE_RANGE: RangeInclusive<u32> = 5..=30;
pub const SPIKE_RANGE: RangeInclusive<u32> = 10..=60;

/// One simulated observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedSample {
    pub base: u32,
    pub spike: u32,
}

impl SimulatedSample {
    pub fn draw<R: Rng>(rng: &mut R) -> Self {
        let base = rng.gen_range(BASE_RANGE);
        let spike = if rng.gen_ratio(1, 3) { rng.gen_range(SPIKE_RANGE) } else { 0 };
        Self { base, spike }
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.base + self.spike
    }
}

pub struct SimulatedSource {
    rng: StdRng,
    interval: Interval,
}

impl SimulatedSource {
    pub fn new(period: Duration) -> Self {
        Self::with_rng(period, StdRng::from_entropy())
    }

    /// Deterministic source for replayable runs
    pub fn seeded(period: Duration, seed: u64) -> Self {
        Self::with_rng(period, StdRng::seed_from_u64(seed))
    }

    fn with_rng(period: Duration, rng: StdRng) -> Self {
        // tokio panics on a zero period
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { rng, interval }
    }
}

#[async_trait]
impl CountSource for SimulatedSource {
    async fn next_count(&mut self) -> Option<u32> {
        self.interval.tick().await;
        Some(SimulatedSample::draw(&mut self.rng).count())
    }
}
