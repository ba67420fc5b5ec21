use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use rand::Rng;
use tracing::debug;

use crate::cancel::CancellationToken;

/// Inclusive millisecond window; a reversed window is read as its mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (low, high) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        Duration::from_millis(rng.gen_range(low..=high))
    }

    pub fn contains(&self, delay: Duration) -> bool {
        let ms = delay.as_millis() as u64;
        ms >= self.min_ms.min(self.max_ms) && ms <= self.max_ms.max(self.min_ms)
    }
}

/// Fires on every call whose sequence number is a multiple of `every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModularBand {
    pub name: &'static str,
    pub every: u64,
    pub window: DelayWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbabilisticDelay {
    pub chance_percent: u8,
    pub window: DelayWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySource {
    None,
    Band(&'static str),
    Probabilistic,
}

impl DelaySource {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Band(name) => name,
            Self::Probabilistic => "probabilistic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDelay {
    pub source: DelaySource,
    pub duration: Duration,
}

impl PlannedDelay {
    pub const NONE: PlannedDelay = PlannedDelay {
        source: DelaySource::None,
        duration: Duration::ZERO,
    };
}

/// Bands are checked in list order and the first match wins; the
/// probabilistic roll only happens when no band matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyPolicy {
    pub bands: Vec<ModularBand>,
    pub probabilistic: Option<ProbabilisticDelay>,
}

impl LatencyPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn probabilistic_only(chance_percent: u8, window: DelayWindow) -> Self {
        Self {
            bands: Vec::new(),
            probabilistic: Some(ProbabilisticDelay {
                chance_percent,
                window,
            }),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.bands.is_empty() && self.probabilistic.is_none()
    }

    pub fn matching_band(&self, sequence: u64) -> Option<&ModularBand> {
        self.bands
            .iter()
            .find(|band| band.every > 0 && sequence % band.every == 0)
    }

    pub fn plan<R: Rng + ?Sized>(&self, sequence: u64, rng: &mut R) -> PlannedDelay {
        if let Some(band) = self.matching_band(sequence) {
            return PlannedDelay {
                source: DelaySource::Band(band.name),
                duration: band.window.draw(rng),
            };
        }
        if let Some(chance) = self.probabilistic
            && chance.chance_percent > 0
            && rng.gen_range(0..100u8) < chance.chance_percent
        {
            return PlannedDelay {
                source: DelaySource::Probabilistic,
                duration: chance.window.draw(rng),
            };
        }
        PlannedDelay::NONE
    }

    pub fn delay_for<R: Rng + ?Sized>(&self, sequence: u64, rng: &mut R) -> Duration {
        self.plan(sequence, rng).duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedDelay {
    pub sequence: u64,
    pub source: DelaySource,
    pub planned: Duration,
    pub slept: Duration,
    pub interrupted: bool,
}

impl InjectedDelay {
    pub fn slept_ms(&self) -> u64 {
        self.slept.as_millis() as u64
    }
}

/// Owns the call counter for one injection point. Sequence numbers start
/// at 1.
#[derive(Debug, Default)]
pub struct LatencyInjector {
    policy: LatencyPolicy,
    calls: AtomicU64,
}

impl LatencyInjector {
    pub fn new(policy: LatencyPolicy) -> Self {
        Self {
            policy,
            calls: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &LatencyPolicy {
        &self.policy
    }

    pub fn calls_observed(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn next_sequence(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Takes the next sequence number, plans the delay and sleeps it off.
    /// A cancelled token truncates the sleep; the token keeps its state.
    pub fn inject(&self, cancel: &CancellationToken) -> InjectedDelay {
        let sequence = self.next_sequence();
        let planned = self.policy.plan(sequence, &mut rand::thread_rng());
        let outcome = cancel.sleep(planned.duration);
        if !planned.duration.is_zero() {
            debug!(
                sequence,
                source = planned.source.label(),
                planned_ms = planned.duration.as_millis() as u64,
                slept_ms = outcome.slept.as_millis() as u64,
                interrupted = outcome.interrupted,
                "latency injected"
            );
        }
        InjectedDelay {
            sequence,
            source: planned.source,
            planned: planned.duration,
            slept: outcome.slept,
            interrupted: outcome.interrupted,
        }
    }
}
