// Encoder sampling
//
// Extends a (possibly narrow) wrapping hardware counter into an unbounded
// signed pulse count and derives per-frame rates from it.

use tracing::warn;

use crate::config::ConfigError;
use crate::units::UnitConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// No reading taken yet; the next sample only sets the baseline
    Idle,
    Sampled,
}

/// Per-wheel encoder sampler, driven once per control frame
#[derive(Debug, Clone)]
pub struct EncoderSampler {
    state: SamplerState,
    counter_bits: u32,
    mask: u32,
    sample_rate_hz: u32,
    counts_per_output_rev: u32,
    prev_raw: u32,
    count: i64,
    delta: i32,
    pulses_per_second: i32,
}

impl EncoderSampler {
    pub fn new(
        counter_bits: u32,
        sample_rate_hz: u32,
        counts_per_output_rev: u32,
    ) -> Result<Self, ConfigError> {
        if !(2..=32).contains(&counter_bits) {
            return Err(ConfigError::CounterWidth(counter_bits));
        }
        if sample_rate_hz == 0 {
            return Err(ConfigError::Zero {
                name: "sample_rate_hz",
            });
        }
        if counts_per_output_rev == 0 {
            return Err(ConfigError::Zero {
                name: "counts_per_output_rev",
            });
        }
        let mask = if counter_bits == 32 {
            u32::MAX
        } else {
            (1u32 << counter_bits) - 1
        };
        Ok(Self {
            state: SamplerState::Idle,
            counter_bits,
            mask,
            sample_rate_hz,
            counts_per_output_rev,
            prev_raw: 0,
            count: 0,
            delta: 0,
            pulses_per_second: 0,
        })
    }

    /// Take one reading of the raw counter and return the pulses since the last one
    pub fn sample(&mut self, raw: u32) -> i32 {
        let raw = raw & self.mask;
        let delta = match self.state {
            SamplerState::Idle => {
                self.state = SamplerState::Sampled;
                0
            }
            SamplerState::Sampled => self.wrapped_delta(raw),
        };

        if delta.unsigned_abs() > self.counts_per_output_rev {
            // more than a wheel revolution in one frame
            warn!(
                "Implausible encoder delta {} (raw {} -> {})",
                delta, self.prev_raw, raw
            );
        }

        self.prev_raw = raw;
        self.count += i64::from(delta);
        self.delta = delta;
        self.pulses_per_second = delta.saturating_mul(self.sample_rate_hz as i32);
        delta
    }

    /// Shortest signed distance between the last and the current raw value.
    /// A counter rolling over from near-max to near-zero yields a small delta.
    fn wrapped_delta(&self, raw: u32) -> i32 {
        let diff = raw.wrapping_sub(self.prev_raw) & self.mask;
        let shift = 32 - self.counter_bits;
        ((diff << shift) as i32) >> shift
    }

    /// Zero the cumulative count; the raw baseline is kept
    pub fn reset(&mut self) {
        self.count = 0;
        self.delta = 0;
        self.pulses_per_second = 0;
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Cumulative pulses since start or the last reset
    pub fn pulses(&self) -> i64 {
        self.count
    }

    /// Pulses in the last frame
    pub fn delta(&self) -> i32 {
        self.delta
    }

    pub fn pulses_per_second(&self) -> i32 {
        self.pulses_per_second
    }

    /// Wheel revolutions per minute, truncated
    pub fn rpm(&self) -> i32 {
        (i64::from(self.pulses_per_second) * 60 / i64::from(self.counts_per_output_rev)) as i32
    }

    /// Linear wheel speed over the last frame
    pub fn wheel_speed(&self, units: &UnitConverter) -> f64 {
        units.ticks_to_speed(self.delta)
    }

    /// Whole wheel revolutions, truncated toward zero
    pub fn revolutions(&self) -> i64 {
        self.count / i64::from(self.counts_per_output_rev)
    }
}
