//! Latency models: how long a message takes between two positions.
//!
//! [`SphericalLatency`] is the model every simulation uses unless told
//! otherwise: delay grows linearly with the angular distance between sender
//! and recipient, up to `max_delay` for antipodal points, and is then
//! scaled by a random jitter factor in `[1 - J, 1 + J)`.
//!
//! [`FixedLatency`] and [`ScriptedLatency`] replace the geometry with known
//! delays, which is what ordering tests and demonstrations need.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{SimError, SimResult};
use crate::position::Position;
use crate::rng::SimRng;
use crate::sync::lock;

/// Transit time between antipodal points, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 1000;

/// Jitter fraction: delays vary by up to ±50%.
pub const DEFAULT_JITTER: f64 = 0.5;

/// Maps a pair of positions to a transit delay.
///
/// Implementations are shared by every node thread of a simulation.
pub trait LatencyModel: Send + Sync + Debug {
    /// Returns the delay for one message from `from` to `to`.
    fn latency(&self, from: &Position, to: &Position, rng: &mut SimRng) -> Duration;
}

/// Distance-proportional latency with multiplicative jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalLatency {
    max_delay_ms: u64,
    jitter: f64,
}

impl SphericalLatency {
    /// Creates a model.
    ///
    /// `jitter` must lie in `[0, 1]` so that the jitter multiplier, and with
    /// it every delay, is never negative.
    pub fn new(max_delay_ms: u64, jitter: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&jitter) {
            return Err(SimError::InvalidConfig(format!(
                "jitter must be within [0, 1], got {jitter}"
            )));
        }
        Ok(Self {
            max_delay_ms,
            jitter,
        })
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Delay before jitter, in (fractional) milliseconds.
    pub fn base_delay_ms(&self, from: &Position, to: &Position) -> f64 {
        self.max_delay_ms as f64 * (from.distance(to) / PI)
    }

    /// Applies a jitter draw `u` in `[0, 1)` to a base delay.
    fn jittered_ms(&self, base_ms: f64, u: f64) -> f64 {
        base_ms * (1.0 + (u - 0.5) * 2.0 * self.jitter)
    }
}

impl Default for SphericalLatency {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl LatencyModel for SphericalLatency {
    fn latency(&self, from: &Position, to: &Position, rng: &mut SimRng) -> Duration {
        let base = self.base_delay_ms(from, to);
        let delay = self.jittered_ms(base, rng.next_f64());
        // Truncated to whole milliseconds; 0 stays 0 whatever the jitter.
        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// The same delay for every pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLatency(pub Duration);

impl FixedLatency {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl LatencyModel for FixedLatency {
    fn latency(&self, _from: &Position, _to: &Position, _rng: &mut SimRng) -> Duration {
        self.0
    }
}

/// Hands out a predetermined sequence of delays, one per send, then falls
/// back to a default.
#[derive(Debug)]
pub struct ScriptedLatency {
    delays: Mutex<VecDeque<Duration>>,
    fallback: Duration,
}

impl ScriptedLatency {
    pub fn new(delays: impl IntoIterator<Item = Duration>, fallback: Duration) -> Self {
        Self {
            delays: Mutex::new(delays.into_iter().collect()),
            fallback,
        }
    }

    /// Builds a script from millisecond values with a zero fallback.
    pub fn from_millis(delays: impl IntoIterator<Item = u64>) -> Self {
        Self::new(
            delays.into_iter().map(Duration::from_millis),
            Duration::ZERO,
        )
    }

    /// Number of scripted delays not yet used.
    pub fn remaining(&self) -> usize {
        lock(&self.delays).len()
    }
}

impl LatencyModel for ScriptedLatency {
    fn latency(&self, _from: &Position, _to: &Position, _rng: &mut SimRng) -> Duration {
        lock(&self.delays).pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn antipodal_base_delay_is_max_delay() {
        let model = SphericalLatency::default();
        let p = Position::new(0.4, 2.0);
        let base = model.base_delay_ms(&p, &p.antipode());
        assert!((base - 1000.0).abs() < 1e-3, "base {base}");
    }

    #[test]
    fn identical_positions_have_zero_delay() {
        let model = SphericalLatency::new(1000, 1.0).unwrap();
        let mut rng = SimRng::new(5);
        let p = Position::new(-0.7, 4.1);
        assert_eq!(model.base_delay_ms(&p, &p), 0.0);
        for _ in 0..1000 {
            assert_eq!(model.latency(&p, &p, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn no_jitter_is_exact() {
        let model = SphericalLatency::new(1000, 0.0).unwrap();
        let mut rng = SimRng::new(5);
        let p = Position::new(0.0, 0.0);
        let q = Position::new(0.0, std::f64::consts::FRAC_PI_2);
        let expected = model.base_delay_ms(&p, &q) as u64;
        assert!((499..=500).contains(&expected));
        for _ in 0..100 {
            assert_eq!(
                model.latency(&p, &q, &mut rng),
                Duration::from_millis(expected)
            );
        }
    }

    #[test_case(-0.1 ; "negative")]
    #[test_case(1.5 ; "above one")]
    #[test_case(f64::NAN ; "nan")]
    fn rejects_out_of_range_jitter(jitter: f64) {
        assert!(matches!(
            SphericalLatency::new(1000, jitter),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test_case(0.0, 500.0 ; "lowest draw")]
    #[test_case(0.5, 1000.0 ; "middle draw")]
    fn jitter_multiplier(u: f64, expected: f64) {
        let model = SphericalLatency::default();
        assert!((model.jittered_ms(1000.0, u) - expected).abs() < 1e-9);
    }

    #[test]
    fn fixed_latency_ignores_geometry() {
        let model = FixedLatency::from_millis(42);
        let mut rng = SimRng::new(0);
        let p = Position::new(0.0, 0.0);
        assert_eq!(
            model.latency(&p, &p.antipode(), &mut rng),
            Duration::from_millis(42)
        );
    }

    #[test]
    fn scripted_latency_plays_back_then_falls_back() {
        let model = ScriptedLatency::new(
            [Duration::from_millis(30), Duration::from_millis(10)],
            Duration::from_millis(7),
        );
        let mut rng = SimRng::new(0);
        let p = Position::new(0.0, 0.0);
        assert_eq!(model.remaining(), 2);
        assert_eq!(model.latency(&p, &p, &mut rng), Duration::from_millis(30));
        assert_eq!(model.latency(&p, &p, &mut rng), Duration::from_millis(10));
        assert_eq!(model.latency(&p, &p, &mut rng), Duration::from_millis(7));
        assert_eq!(model.remaining(), 0);
    }

    proptest! {
        #[test]
        fn delay_within_jitter_bounds(
            a in any::<u64>(),
            b in any::<u64>(),
            draw in any::<u64>(),
            jitter in 0.0f64..=1.0,
        ) {
            let model = SphericalLatency::new(1000, jitter).unwrap();
            let p1 = Position::random(&mut SimRng::new(a));
            let p2 = Position::random(&mut SimRng::new(b));
            let base = model.base_delay_ms(&p1, &p2);
            let delay = model.latency(&p1, &p2, &mut SimRng::new(draw)).as_millis() as f64;

            prop_assert!((0.0..=1000.0).contains(&base));
            // Truncation to whole milliseconds only ever lowers the delay.
            prop_assert!(delay <= base * (1.0 + jitter));
            prop_assert!(delay >= (base * (1.0 - jitter)).floor() - 1.0);
        }
    }
}
