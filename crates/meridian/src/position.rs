//! Node placement on the unit sphere.

use std::f64::consts::PI;
use std::fmt::{self, Display};

use crate::rng::SimRng;

/// A point on the unit sphere, given as latitude `theta` in `[-π/2, π/2]`
/// and longitude `phi` in `[0, 2π)`.
///
/// Positions are immutable once assigned to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    theta: f64,
    phi: f64,
}

impl Position {
    /// Creates a position from explicit angles.
    pub fn new(theta: f64, phi: f64) -> Self {
        Self { theta, phi }
    }

    /// Draws a position uniformly distributed over the sphere's surface.
    ///
    /// Sampling the latitude through `asin(2u - 1)` (inverse CDF) gives equal
    /// density per unit area; drawing both angles uniformly would cluster
    /// points at the poles.
    pub fn random(rng: &mut SimRng) -> Self {
        let u = rng.next_f64();
        let v = rng.next_f64();
        Self {
            theta: (2.0 * u - 1.0).asin(),
            phi: 2.0 * PI * v,
        }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Angular (great-circle) distance to another position, in `[0, π]`.
    pub fn distance(&self, other: &Position) -> f64 {
        if self == other {
            return 0.0;
        }
        let cosine = (self.phi - other.phi).cos() * self.theta.cos() * other.theta.cos()
            + self.theta.sin() * other.theta.sin();
        // Rounding can push the cosine just outside [-1, 1] for (near)
        // identical or antipodal points.
        cosine.clamp(-1.0, 1.0).acos()
    }

    /// The point on the opposite side of the sphere.
    pub fn antipode(&self) -> Self {
        Self {
            theta: -self.theta,
            phi: (self.phi + PI).rem_euclid(2.0 * PI),
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position[theta={:.4}, phi={:.4}]", self.theta, self.phi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-6;

    #[test]
    fn distance_to_self_is_zero() {
        let p = Position::new(0.3, 1.2);
        assert_eq!(p.distance(&p), 0.0);
    }

    #[test]
    fn distance_to_antipode_is_pi() {
        let p = Position::new(0.3, 1.2);
        assert!((p.distance(&p.antipode()) - PI).abs() < EPSILON);
    }

    #[test]
    fn poles_are_pi_apart() {
        let north = Position::new(FRAC_PI_2, 0.0);
        let south = Position::new(-FRAC_PI_2, 0.0);
        assert!((north.distance(&south) - PI).abs() < EPSILON);
    }

    #[test]
    fn quarter_turn_on_equator() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(0.0, FRAC_PI_2);
        assert!((a.distance(&b) - FRAC_PI_2).abs() < EPSILON);
    }

    #[test]
    fn random_positions_are_uniform_by_area() {
        // Under area-uniform sampling sin(theta) is uniform on [-1, 1], so
        // the band |sin(theta)| < 0.5 holds half of all points. Uniform
        // angles would put only a third of them there.
        let mut rng = SimRng::new(2024);
        let samples: u32 = 20_000;
        let in_band = (0..samples)
            .map(|_| Position::random(&mut rng))
            .filter(|p| p.theta().sin().abs() < 0.5)
            .count();
        let fraction = in_band as f64 / f64::from(samples);
        assert!((fraction - 0.5).abs() < 0.02, "band fraction {fraction}");
    }

    proptest! {
        #[test]
        fn random_positions_stay_in_range(seed in any::<u64>()) {
            let mut rng = SimRng::new(seed);
            let p = Position::random(&mut rng);
            prop_assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&p.theta()));
            prop_assert!((0.0..2.0 * PI).contains(&p.phi()));
        }

        #[test]
        fn distance_is_symmetric_and_bounded(a in any::<u64>(), b in any::<u64>()) {
            let p1 = Position::random(&mut SimRng::new(a));
            let p2 = Position::random(&mut SimRng::new(b));
            let d = p1.distance(&p2);
            prop_assert!((0.0..=PI).contains(&d));
            prop_assert!((d - p2.distance(&p1)).abs() < EPSILON);
        }
    }
}
