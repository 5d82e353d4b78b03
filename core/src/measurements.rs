//! Bearing/range measurements and the observation likelihood kernel.
//!
//! A measurement reports range and bearing from one observer together with the world-frame
//! position the sensor attributes to the target. The filter re-anchors its geometry on that
//! reported position each cycle and computes the "measured" bearing and range per observer from it
//! with the same formulas used for the particles' predicted values.
use crate::particle::Particle;
use crate::{ObserverState, Position, wrap_to_pi};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// $\sqrt{2\pi}$, the Gaussian normalization constant
pub const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

/// A single observation of the target from one observer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Range to the target (m)
    pub range: f64,
    /// Bearing to the target relative to the observer heading (rad)
    pub bearing: f64,
    /// Reported world-frame x position of the target (m)
    pub x: f64,
    /// Reported world-frame y position of the target (m)
    pub y: f64,
}
impl Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Measurement {{ range: {:.2} m, bearing: {:.2}°, at ({:.2}, {:.2}) }}",
            self.range,
            self.bearing.to_degrees(),
            self.x,
            self.y
        )
    }
}
impl Measurement {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Supplier of measurements and ground truth, typically a sensor simulation or a live feed.
pub trait MeasurementSource {
    /// Latest observation from observer `observer_id` (0 or 1), if any arrived this cycle.
    fn measurement(&mut self, observer_id: usize) -> Option<Measurement>;
    /// Current true target position. Only used for offline evaluation.
    fn ground_truth(&self) -> Position;
}

/// Gaussian bearing/range likelihood with additive floors.
///
/// The floors keep every likelihood strictly positive, so no particle is starved to zero weight
/// and the maximum used for normalization is never zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationModel {
    /// Bearing noise standard deviation (rad)
    pub bearing_std_rad: f64,
    /// Range noise standard deviation (m)
    pub range_std_m: f64,
    /// Additive floor on the bearing likelihood
    pub bearing_floor: f64,
    /// Additive floor on the range likelihood
    pub range_floor: f64,
}
impl Default for ObservationModel {
    fn default() -> Self {
        ObservationModel {
            bearing_std_rad: 0.5,
            range_std_m: 100.0,
            bearing_floor: 0.001,
            range_floor: 0.001,
        }
    }
}
impl ObservationModel {
    /// Bearing term: $\epsilon_b + \frac{1}{\sigma_\alpha\sqrt{2\pi}} e^{-\mathrm{wrap}(\hat\alpha - \alpha)^2 / 2\sigma_\alpha^2}$
    pub fn bearing_likelihood(&self, measured_bearing: f64, predicted_bearing: f64) -> f64 {
        let innovation = wrap_to_pi(predicted_bearing - measured_bearing);
        self.bearing_floor
            + (1.0 / (self.bearing_std_rad * SQRT_2PI))
                * (-innovation.powi(2) / (2.0 * self.bearing_std_rad.powi(2))).exp()
    }
    /// Range term: $\epsilon_r + \frac{1}{\sigma_r\sqrt{2\pi}} e^{-(\hat r - r)^2 / 2\sigma_r^2}$
    pub fn range_likelihood(&self, measured_range: f64, predicted_range: f64) -> f64 {
        let innovation = predicted_range - measured_range;
        self.range_floor
            + (1.0 / (self.range_std_m * SQRT_2PI))
                * (-innovation.powi(2) / (2.0 * self.range_std_m.powi(2))).exp()
    }
    /// Joint likelihood, the product of the bearing and range terms. Pure; nothing is mutated.
    pub fn likelihood(
        &self,
        measured_bearing: f64,
        predicted_bearing: f64,
        measured_range: f64,
        predicted_range: f64,
    ) -> f64 {
        self.bearing_likelihood(measured_bearing, predicted_bearing)
            * self.range_likelihood(measured_range, predicted_range)
    }
    /// Evaluate every particle against one observer looking at `target`.
    ///
    /// The measured bearing and range are computed from `target` with the same geometry as the
    /// particles' predictions. Returns one likelihood per particle, in population order, and leaves
    /// the particles untouched.
    pub fn weigh(
        &self,
        particles: &[Particle],
        observer: &ObserverState,
        target: &Position,
    ) -> Vec<f64> {
        let measured_bearing = observer.bearing_to(target);
        let measured_range = observer.range_to(target);
        particles
            .iter()
            .map(|particle| {
                self.likelihood(
                    measured_bearing,
                    particle.predicted_bearing(observer),
                    measured_range,
                    particle.predicted_range(observer),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_peak_likelihood() {
        let model = ObservationModel::default();
        let bearing_peak = 0.001 + 1.0 / (0.5 * SQRT_2PI);
        let range_peak = 0.001 + 1.0 / (100.0 * SQRT_2PI);
        assert_approx_eq!(model.bearing_likelihood(0.3, 0.3), bearing_peak, 1e-12);
        assert_approx_eq!(model.range_likelihood(42.0, 42.0), range_peak, 1e-12);
        assert_approx_eq!(
            model.likelihood(0.3, 0.3, 42.0, 42.0),
            bearing_peak * range_peak,
            1e-12
        );
    }

    #[test]
    fn test_bearing_innovation_is_wrapped() {
        let model = ObservationModel::default();
        // Just either side of the ±π seam are 0.02 rad apart, not ~2π
        let across_seam = model.bearing_likelihood(PI - 0.01, -PI + 0.01);
        let direct = model.bearing_likelihood(0.01, -0.01);
        assert_approx_eq!(across_seam, direct, 1e-9);
    }

    #[test]
    fn test_likelihood_floor() {
        let model = ObservationModel::default();
        let far = model.likelihood(0.0, PI, 0.0, 1.0e6);
        assert!(far > 0.0);
        assert_approx_eq!(far, 0.001 * 0.001, 1e-9);
    }

    #[test]
    fn test_likelihood_decreases_with_error() {
        let model = ObservationModel::default();
        let near = model.likelihood(0.0, 0.1, 100.0, 110.0);
        let far = model.likelihood(0.0, 0.8, 100.0, 400.0);
        assert!(near > far);
    }

    #[test]
    fn test_weigh_does_not_mutate() {
        let model = ObservationModel::default();
        let observer = ObserverState::new(0.0, 0.0, 0.0);
        let particles = vec![
            Particle::new(10.0, 0.0, 1.0, 0.0, 0.25),
            Particle::new(0.0, 10.0, 1.0, 0.0, 0.25),
        ];
        let weights = model.weigh(&particles, &observer, &Position::new(10.0, 0.0));
        assert_eq!(weights.len(), 2);
        assert!(weights[0] > weights[1]);
        assert!(particles.iter().all(|p| p.weight == 0.25));
    }
}
