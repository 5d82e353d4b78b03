//! Particle state hypotheses and the bounded random motion model.
//!
//! A [`Particle`] is one hypothesis of the target state: planar position, speed, heading, and an
//! importance weight. Particles are scattered around an initial target estimate when the filter is
//! created and are then advanced in place every cycle by the [`MotionModel`]. No particle identity
//! survives resampling; only cloned state does.
use crate::measurements::ObservationModel;
use crate::{ObserverState, Position, wrap_to_pi, wrap_to_range};

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt::{self, Display};

/// Draw from `U(low, high)`, collapsing to `low` for an empty interval.
pub(crate) fn sample_uniform<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..high)
    } else {
        low
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    /// World-frame x position (m)
    pub x: f64,
    /// World-frame y position (m)
    pub y: f64,
    /// Speed (m/s), kept in `[0, max_velocity)`
    pub velocity: f64,
    /// Heading (rad), kept in `(-π, π]`
    pub heading: f64,
    /// Importance weight. Between a weighting pass and fusion this is only the most recent
    /// single-observer evaluation.
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("velocity", &self.velocity)
            .field("heading", &self.heading.to_degrees())
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(x: f64, y: f64, velocity: f64, heading: f64, weight: f64) -> Particle {
        Particle {
            x,
            y,
            velocity,
            heading,
            weight,
        }
    }
    /// Scatter a new particle uniformly around `center`.
    ///
    /// Position is drawn from a square of half-width `spread` centered on `center`, speed from
    /// `U(0, max_velocity)`, heading from `U(-π, π)`, and the weight is set to `1 / population`.
    ///
    /// # Arguments
    /// * `center` - Initial estimate of the target position.
    /// * `spread` - Half-width of the initial square (m).
    /// * `motion` - Motion model supplying the speed bound.
    /// * `population` - Size of the population this particle belongs to.
    /// * `rng` - Random number generator.
    pub fn create<R: Rng>(
        center: &Position,
        spread: f64,
        motion: &MotionModel,
        population: usize,
        rng: &mut R,
    ) -> Particle {
        let x = center.x + sample_uniform(rng, -spread, spread);
        let y = center.y + sample_uniform(rng, -spread, spread);
        let velocity = sample_uniform(rng, 0.0, motion.max_velocity);
        let heading = wrap_to_pi(sample_uniform(rng, -PI, PI));
        Particle::new(x, y, velocity, heading, 1.0 / population.max(1) as f64)
    }
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
    /// Advance the particle by `dt` seconds under `motion`. See [`MotionModel::propagate`].
    pub fn propagate<R: Rng>(&mut self, dt: f64, motion: &MotionModel, rng: &mut R) {
        motion.propagate(self, dt, rng);
    }
    /// Bearing this particle would produce at `observer`, relative to the observer heading.
    pub fn predicted_bearing(&self, observer: &ObserverState) -> f64 {
        observer.bearing_to(&self.position())
    }
    /// Euclidean range this particle would produce at `observer`.
    pub fn predicted_range(&self, observer: &ObserverState) -> f64 {
        observer.range_to(&self.position())
    }
    /// Score this particle against one observer and store the result as its weight.
    ///
    /// The previous weight is replaced, not accumulated. The filter itself works on the pure
    /// [`ObservationModel::likelihood`] and keeps per-observer values in separate vectors; this is
    /// for callers that only ever weigh against a single observer.
    pub fn evaluate(
        &mut self,
        model: &ObservationModel,
        measured_bearing: f64,
        predicted_bearing: f64,
        measured_range: f64,
        predicted_range: f64,
    ) -> f64 {
        self.weight = model.likelihood(
            measured_bearing,
            predicted_bearing,
            measured_range,
            predicted_range,
        );
        self.weight
    }
}

/// Bounded random-walk motion model.
///
/// Each propagation adds a non-negative random increment to the speed and folds it back into
/// `[0, max_velocity)`, adds a symmetric random increment to the heading and wraps it to
/// `(-π, π]`, then moves the particle along its new heading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionModel {
    /// Exclusive upper bound on particle speed (m/s)
    pub max_velocity: f64,
    /// Speed increment is drawn from `U(0, velocity_perturbation)`; must be non-negative.
    pub velocity_perturbation: f64,
    /// Heading increment is drawn from `U(-heading_perturbation, heading_perturbation)` (rad)
    pub heading_perturbation: f64,
}
impl Default for MotionModel {
    fn default() -> Self {
        MotionModel {
            max_velocity: 5.0,
            velocity_perturbation: 5.0,
            heading_perturbation: FRAC_PI_2,
        }
    }
}
impl MotionModel {
    /// Propagate a particle forward in time
    ///
    /// The speed increment is non-negative, so the speed only grows until it is folded back into
    /// `[0, max_velocity)`. That fold is a bounded wrap of an increasing value rather than a general
    /// modulo of arbitrary input.
    ///
    /// # Arguments
    /// * `particle` - Particle to update in place.
    /// * `dt` - Time step in seconds.
    /// * `rng` - Random number generator.
    pub fn propagate<R: Rng>(&self, particle: &mut Particle, dt: f64, rng: &mut R) {
        particle.velocity += sample_uniform(rng, 0.0, self.velocity_perturbation);
        particle.velocity = wrap_to_range(particle.velocity, self.max_velocity);
        particle.heading += sample_uniform(
            rng,
            -self.heading_perturbation,
            self.heading_perturbation,
        );
        particle.heading = wrap_to_pi(particle.heading);
        particle.x += particle.velocity * particle.heading.cos() * dt;
        particle.y += particle.velocity * particle.heading.sin() * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_particle_creation_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let center = Position::new(740.0, 280.0);
        let motion = MotionModel::default();
        for _ in 0..500 {
            let p = Particle::create(&center, 150.0, &motion, 1000, &mut rng);
            assert!((p.x - 740.0).abs() <= 150.0);
            assert!((p.y - 280.0).abs() <= 150.0);
            assert!(p.velocity >= 0.0 && p.velocity < 5.0);
            assert!(p.heading > -PI && p.heading <= PI);
            assert_approx_eq!(p.weight, 1.0 / 1000.0, 1e-15);
        }
    }

    #[test]
    fn test_zero_spread_creates_at_center() {
        let mut rng = StdRng::seed_from_u64(7);
        let p = Particle::create(
            &Position::new(3.0, -4.0),
            0.0,
            &MotionModel::default(),
            1,
            &mut rng,
        );
        assert_eq!(p.x, 3.0);
        assert_eq!(p.y, -4.0);
        assert_eq!(p.weight, 1.0);
    }

    #[test]
    fn test_propagation_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let motion = MotionModel::default();
        let mut particle = Particle::new(0.0, 0.0, 4.99, PI, 0.5);
        for dt in [0.0, 0.1, 1.0, 10.0, 250.0] {
            for _ in 0..200 {
                particle.propagate(dt, &motion, &mut rng);
                assert!(particle.velocity >= 0.0 && particle.velocity < 5.0);
                assert!(particle.heading > -PI && particle.heading <= PI);
            }
        }
        assert_eq!(particle.weight, 0.5);
    }

    #[test]
    fn test_propagation_without_noise_is_straight_line() {
        let mut rng = StdRng::seed_from_u64(1);
        let motion = MotionModel {
            max_velocity: 5.0,
            velocity_perturbation: 0.0,
            heading_perturbation: 0.0,
        };
        let mut particle = Particle::new(1.0, 2.0, 3.0, FRAC_PI_2, 1.0);
        particle.propagate(2.0, &motion, &mut rng);
        assert_approx_eq!(particle.x, 1.0, 1e-12);
        assert_approx_eq!(particle.y, 8.0, 1e-12);
        assert_eq!(particle.velocity, 3.0);
    }

    #[test]
    fn test_predicted_geometry() {
        let observer = ObserverState::new(0.0, 0.0, 0.0);
        let particle = Particle::new(10.0, 0.0, 0.0, 0.0, 1.0);
        assert_approx_eq!(particle.predicted_bearing(&observer), 0.0, 1e-9);
        assert_approx_eq!(particle.predicted_range(&observer), 10.0, 1e-9);

        let particle = Particle::new(-3.0, -4.0, 0.0, 0.0, 1.0);
        assert_approx_eq!(particle.predicted_range(&observer), 5.0, 1e-9);
        assert_approx_eq!(
            particle.predicted_bearing(&observer),
            (-4.0_f64).atan2(-3.0),
            1e-9
        );
    }

    #[test]
    fn test_evaluate_overwrites_weight() {
        let model = ObservationModel::default();
        let mut particle = Particle::new(10.0, 0.0, 0.0, 0.0, 0.75);
        let first = particle.evaluate(&model, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(particle.weight, first);
        let second = particle.evaluate(&model, 0.0, 0.0, 10.0, 10.0);
        assert_eq!(second, first);
        assert_eq!(particle.weight, first);
    }
}
