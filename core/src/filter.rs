//! Two-observer bearing/range particle filter.
//!
//! One filter cycle is:
//!
//! 1. propagate every particle through the [`MotionModel`];
//! 2. weigh every particle against observer 0, capturing the likelihood vector `W1`;
//! 3. weigh every particle against observer 1, capturing `W2`;
//! 4. fuse and normalize `W1` and `W2` into one weight per particle;
//! 5. resample back to the fixed population size.
//!
//! Steps 2-5 only run when a measurement has arrived since the previous cycle. Without one the
//! cycle is prediction only, which is a degraded but expected mode rather than an error.
//!
//! # Example
//!
//! ```rust
//! use trackpf::{FilterConfig, Measurement, ObserverState, Position, TwoObserverParticleFilter};
//!
//! let config = FilterConfig { num_particles: 200, ..Default::default() };
//! let observers = [ObserverState::new(0.0, 0.0, 0.0), ObserverState::new(-5.0, 5.0, 0.0)];
//! let mut pf = TwoObserverParticleFilter::new(config, Position::new(740.0, 280.0), observers)
//!     .expect("valid configuration");
//!
//! pf.observe(Measurement { range: 790.0, bearing: 0.36, x: 742.0, y: 281.0 });
//! pf.step(0.1).expect("weights are normalized");
//! let estimate = pf.mean().expect("population is never empty");
//! assert!(pf.error(&Position::new(742.0, 281.0)).unwrap() >= 0.0);
//! assert_eq!(pf.particles().len(), 200);
//! # let _ = estimate;
//! ```
use crate::error::FilterError;
use crate::fusion::WeightFusionStrategy;
use crate::measurements::{Measurement, MeasurementSource, ObservationModel};
use crate::particle::{MotionModel, Particle};
use crate::resampling::ParticleResamplingStrategy;
use crate::{ObserverState, Position};

use nalgebra::{Matrix2, Vector2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// How the population is reduced to a point estimate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    /// Arithmetic mean of the particle positions
    #[default]
    UnweightedAverage,
    /// Weight-proportional mean of the particle positions
    WeightedAverage,
    /// Position of the single highest-weight particle
    HighestWeight,
}

/// Particle filter configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fixed population size
    pub num_particles: usize,
    /// Seed for the filter's random number generator
    pub seed: u64,
    /// Half-width of the square the initial particles are scattered in (m)
    pub initial_spread_m: f64,
    pub fusion: WeightFusionStrategy,
    pub resampling: ParticleResamplingStrategy,
    /// Guarantee every particle at least one entry in the resampling pool
    pub survivor_floor: bool,
    pub averaging: ParticleAveragingStrategy,
    pub motion: MotionModel,
    pub observation: ObservationModel,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 1000,
            seed: 42,
            initial_spread_m: 150.0,
            fusion: WeightFusionStrategy::default(),
            resampling: ParticleResamplingStrategy::default(),
            survivor_floor: true,
            averaging: ParticleAveragingStrategy::default(),
            motion: MotionModel::default(),
            observation: ObservationModel::default(),
        }
    }
}
impl FilterConfig {
    /// Check every parameter against its valid domain.
    pub fn validate(&self) -> Result<(), FilterError> {
        fn invalid(message: String) -> Result<(), FilterError> {
            Err(FilterError::InvalidConfig(message))
        }
        if self.num_particles == 0 {
            return invalid("num_particles must be at least 1".into());
        }
        if !(self.initial_spread_m >= 0.0) {
            return invalid(format!(
                "initial_spread_m must be non-negative, got {}",
                self.initial_spread_m
            ));
        }
        let motion = &self.motion;
        if !(motion.max_velocity > 0.0) {
            return invalid(format!(
                "motion.max_velocity must be positive, got {}",
                motion.max_velocity
            ));
        }
        if !(motion.velocity_perturbation >= 0.0) {
            return invalid(format!(
                "motion.velocity_perturbation must be non-negative, got {}",
                motion.velocity_perturbation
            ));
        }
        if !(motion.heading_perturbation >= 0.0) {
            return invalid(format!(
                "motion.heading_perturbation must be non-negative, got {}",
                motion.heading_perturbation
            ));
        }
        let observation = &self.observation;
        if !(observation.bearing_std_rad > 0.0) || !(observation.range_std_m > 0.0) {
            return invalid("observation standard deviations must be positive".into());
        }
        if !(observation.bearing_floor > 0.0) || !(observation.range_floor > 0.0) {
            return invalid("observation likelihood floors must be positive".into());
        }
        Ok(())
    }
}

/// Particle filter tracking one target from two fixed observers.
pub struct TwoObserverParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    observers: [ObserverState; 2],
    target_estimate: Position,
    measurement_pending: bool,
    rng: StdRng,
}
impl Debug for TwoObserverParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        let mut debug = f.debug_struct("TwoObserverParticleFilter");
        debug
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("target_estimate", &format_args!("{}", self.target_estimate));
        if let Ok(mean) = self.mean() {
            debug.field("mean_position", &format_args!("{}", mean));
        }
        debug.finish()
    }
}
impl TwoObserverParticleFilter {
    /// Create a filter with particles scattered around `initial_target`.
    ///
    /// # Arguments
    /// * `config` - Filter configuration, validated before use.
    /// * `initial_target` - Initial estimate of the target position, also the first TargetEstimate.
    /// * `observers` - Fixed poses of observer 0 and observer 1.
    pub fn new(
        config: FilterConfig,
        initial_target: Position,
        observers: [ObserverState; 2],
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let particles = (0..config.num_particles)
            .map(|_| {
                Particle::create(
                    &initial_target,
                    config.initial_spread_m,
                    &config.motion,
                    config.num_particles,
                    &mut rng,
                )
            })
            .collect();
        log::info!(
            "initialized {} particles around {} (seed {})",
            config.num_particles,
            initial_target,
            config.seed
        );
        Ok(TwoObserverParticleFilter {
            config,
            particles,
            observers,
            target_estimate: initial_target,
            measurement_pending: false,
            rng,
        })
    }
    /// Accept a new measurement.
    ///
    /// The measurement's reported position replaces the TargetEstimate, and the next [`step`]
    /// runs a full correction against it. The reported range and bearing are not used directly;
    /// the measured geometry is recomputed per observer from the reported position.
    ///
    /// [`step`]: TwoObserverParticleFilter::step
    pub fn observe(&mut self, measurement: Measurement) {
        self.target_estimate = measurement.position();
        self.measurement_pending = true;
    }
    /// Run one filter cycle of `dt` seconds.
    ///
    /// # Errors
    /// [`FilterError::InvalidWeight`] or [`FilterError::EmptyPopulation`] if the population
    /// invariants were broken.
    pub fn step(&mut self, dt: f64) -> Result<(), FilterError> {
        self.predict(dt);
        if self.measurement_pending {
            self.measurement_pending = false;
            self.correct()?;
            log::debug!(
                "corrected against {} (effective particles {:.1})",
                self.target_estimate,
                self.effective_sample_size()
            );
        } else {
            log::debug!("no measurement this cycle, prediction only");
        }
        Ok(())
    }
    /// Pull the newest measurement from `source` and run one cycle.
    ///
    /// Both observers are polled every cycle so nothing stale is left behind in the source.
    /// Observer 0's report takes precedence; observer 1's is used only when observer 0 has nothing.
    pub fn step_with<S: MeasurementSource + ?Sized>(
        &mut self,
        dt: f64,
        source: &mut S,
    ) -> Result<(), FilterError> {
        let reports: Vec<Option<Measurement>> = (0..self.observers.len())
            .map(|observer_id| source.measurement(observer_id))
            .collect();
        if let Some(measurement) = reports.into_iter().flatten().next() {
            self.observe(measurement);
        }
        self.step(dt)
    }
    /// Propagate every particle by `dt` seconds.
    pub fn predict(&mut self, dt: f64) {
        for particle in &mut self.particles {
            particle.propagate(dt, &self.config.motion, &mut self.rng);
        }
    }
    /// Weigh the population against both observers, fuse, and resample.
    pub fn correct(&mut self) -> Result<(), FilterError> {
        let model = &self.config.observation;
        let first = model.weigh(&self.particles, &self.observers[0], &self.target_estimate);
        let second = model.weigh(&self.particles, &self.observers[1], &self.target_estimate);
        log::trace!(
            "raw likelihood maxima: {:.4e} / {:.4e}",
            first.iter().cloned().fold(0.0, f64::max),
            second.iter().cloned().fold(0.0, f64::max)
        );
        let fused = self.config.fusion.fuse(&first, &second)?;
        self.set_weights(&fused)?;
        self.particles = self.config.resampling.resample(
            &self.particles,
            self.config.survivor_floor,
            &mut self.rng,
        )?;
        Ok(())
    }
    /// Overwrite every particle's weight, in population order.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<(), FilterError> {
        if weights.len() != self.particles.len() {
            return Err(FilterError::LengthMismatch {
                expected: self.particles.len(),
                actual: weights.len(),
            });
        }
        for (particle, &w) in self.particles.iter_mut().zip(weights.iter()) {
            particle.weight = w;
        }
        Ok(())
    }
    /// Read-only view of the current population
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// `[x, y, weight]` for every particle, the shape plotting layers consume
    pub fn particle_coordinates(&self) -> Vec<[f64; 3]> {
        self.particles
            .iter()
            .map(|p| [p.x, p.y, p.weight])
            .collect()
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn observers(&self) -> &[ObserverState; 2] {
        &self.observers
    }
    /// Look up one observer's pose
    pub fn observer(&self, observer_id: usize) -> Result<&ObserverState, FilterError> {
        self.observers
            .get(observer_id)
            .ok_or(FilterError::UnknownObserver(observer_id))
    }
    pub fn target_estimate(&self) -> Position {
        self.target_estimate
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    /// Arithmetic mean of the particle positions
    pub fn mean(&self) -> Result<Position, FilterError> {
        mean(&self.particles)
    }
    /// Point estimate according to the configured [`ParticleAveragingStrategy`]
    pub fn estimate(&self) -> Result<Position, FilterError> {
        self.config.averaging.estimate(&self.particles)
    }
    /// Position covariance according to the configured [`ParticleAveragingStrategy`]
    pub fn covariance(&self) -> Result<Matrix2<f64>, FilterError> {
        self.config.averaging.covariance(&self.particles)
    }
    /// Distance from the configured point estimate to `ground_truth`
    pub fn error(&self, ground_truth: &Position) -> Result<f64, FilterError> {
        Ok(error(&self.estimate()?, ground_truth))
    }
    /// $N_{eff} = 1 / \sum_i \tilde w_i^2$ with $\tilde w$ the weights scaled to sum to one
    pub fn effective_sample_size(&self) -> f64 {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0) {
            return 0.0;
        }
        let sum_of_squares: f64 = self
            .particles
            .iter()
            .map(|p| (p.weight / total).powi(2))
            .sum();
        1.0 / sum_of_squares
    }
}

/// Arithmetic mean of all particle positions.
///
/// # Errors
/// [`FilterError::EmptyPopulation`] if `particles` is empty.
pub fn mean(particles: &[Particle]) -> Result<Position, FilterError> {
    if particles.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    let n = particles.len() as f64;
    let sum = particles
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| {
            acc + Vector2::new(p.x, p.y)
        });
    Ok(Position::new(sum.x / n, sum.y / n))
}

/// Euclidean distance between an estimate and the ground truth. Evaluation only.
pub fn error(estimate: &Position, ground_truth: &Position) -> f64 {
    estimate.distance_to(ground_truth)
}

impl ParticleAveragingStrategy {
    pub fn estimate(&self, particles: &[Particle]) -> Result<Position, FilterError> {
        match self {
            ParticleAveragingStrategy::UnweightedAverage => mean(particles),
            ParticleAveragingStrategy::WeightedAverage => weighted_mean(particles),
            ParticleAveragingStrategy::HighestWeight => {
                highest_weight(particles).map(Particle::position)
            }
        }
    }
    pub fn covariance(&self, particles: &[Particle]) -> Result<Matrix2<f64>, FilterError> {
        let center = self.estimate(particles)?;
        let center = Vector2::new(center.x, center.y);
        let n = particles.len() as f64;
        let total: f64 = particles.iter().map(|p| p.weight).sum();
        let mut cov = Matrix2::<f64>::zeros();
        match self {
            ParticleAveragingStrategy::HighestWeight => {}
            ParticleAveragingStrategy::WeightedAverage if total > 0.0 => {
                for particle in particles {
                    let diff = Vector2::new(particle.x, particle.y) - center;
                    cov += (particle.weight / total) * diff * diff.transpose();
                }
            }
            _ => {
                for particle in particles {
                    let diff = Vector2::new(particle.x, particle.y) - center;
                    cov += (1.0 / n) * diff * diff.transpose();
                }
            }
        }
        Ok(cov)
    }
}

fn weighted_mean(particles: &[Particle]) -> Result<Position, FilterError> {
    if particles.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    let total: f64 = particles.iter().map(|p| p.weight).sum();
    if !(total > 0.0) {
        return mean(particles);
    }
    let sum = particles
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| {
            acc + p.weight * Vector2::new(p.x, p.y)
        });
    Ok(Position::new(sum.x / total, sum.y / total))
}

fn highest_weight(particles: &[Particle]) -> Result<&Particle, FilterError> {
    particles
        .iter()
        .max_by(|a, b| a.weight.total_cmp(&b.weight))
        .ok_or(FilterError::EmptyPopulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn observers() -> [ObserverState; 2] {
        [
            ObserverState::new(0.0, 0.0, 0.0),
            ObserverState::new(-5.0, 5.0, 0.0),
        ]
    }

    fn small_config(num_particles: usize) -> FilterConfig {
        FilterConfig {
            num_particles,
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_creation() {
        let pf = TwoObserverParticleFilter::new(
            small_config(100),
            Position::new(740.0, 280.0),
            observers(),
        )
        .unwrap();
        assert_eq!(pf.num_particles(), 100);
        for particle in pf.particles() {
            assert_approx_eq!(particle.weight, 0.01, 1e-12);
        }
        assert_approx_eq!(pf.effective_sample_size(), 100.0, 1e-6);
        assert_eq!(pf.target_estimate(), Position::new(740.0, 280.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = small_config(0);
        assert!(matches!(
            TwoObserverParticleFilter::new(config, Position::default(), observers()),
            Err(FilterError::InvalidConfig(_))
        ));
        let mut config = small_config(10);
        config.observation.range_floor = 0.0;
        assert!(config.validate().is_err());
        let mut config = small_config(10);
        config.motion.max_velocity = f64::NAN;
        assert!(config.validate().is_err());
        assert!(FilterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_step_preserves_population_and_weights() {
        let mut pf = TwoObserverParticleFilter::new(
            small_config(250),
            Position::new(740.0, 280.0),
            observers(),
        )
        .unwrap();
        for i in 0..20 {
            pf.observe(Measurement {
                range: 0.0,
                bearing: 0.0,
                x: 740.0 + i as f64,
                y: 280.0,
            });
            pf.step(0.1).unwrap();
            assert_eq!(pf.num_particles(), 250);
            assert!(pf.particles().iter().all(|p| p.weight > 0.0 && p.weight <= 1.0));
        }
    }

    #[test]
    fn test_prediction_only_without_measurement() {
        let mut pf = TwoObserverParticleFilter::new(
            small_config(50),
            Position::new(0.0, 0.0),
            observers(),
        )
        .unwrap();
        pf.step(0.1).unwrap();
        // Without a correction the initial weights survive
        assert!(pf.particles().iter().all(|p| (p.weight - 0.02).abs() < 1e-12));
    }

    #[test]
    fn test_observe_reanchors_target() {
        let mut pf = TwoObserverParticleFilter::new(
            small_config(10),
            Position::new(0.0, 0.0),
            observers(),
        )
        .unwrap();
        pf.observe(Measurement {
            range: 5.0,
            bearing: 0.0,
            x: 3.0,
            y: 4.0,
        });
        assert_eq!(pf.target_estimate(), Position::new(3.0, 4.0));
    }

    #[test]
    fn test_particle_coordinates_match_population() {
        let mut pf = TwoObserverParticleFilter::new(
            small_config(80),
            Position::new(740.0, 280.0),
            observers(),
        )
        .unwrap();
        pf.observe(Measurement {
            range: 0.0,
            bearing: 0.0,
            x: 760.0,
            y: 275.0,
        });
        pf.step(0.1).unwrap();
        let coordinates = pf.particle_coordinates();
        assert_eq!(coordinates.len(), pf.num_particles());
        for (coordinate, particle) in coordinates.iter().zip(pf.particles()) {
            assert_eq!(*coordinate, [particle.x, particle.y, particle.weight]);
        }
    }

    #[test]
    fn test_set_weights_length_mismatch() {
        let mut pf = TwoObserverParticleFilter::new(
            small_config(10),
            Position::new(0.0, 0.0),
            observers(),
        )
        .unwrap();
        assert!(matches!(
            pf.set_weights(&[0.5; 9]),
            Err(FilterError::LengthMismatch {
                expected: 10,
                actual: 9
            })
        ));
        pf.set_weights(&[0.5; 10]).unwrap();
        assert!(pf.particles().iter().all(|p| p.weight == 0.5));
    }

    #[test]
    fn test_unknown_observer() {
        let pf = TwoObserverParticleFilter::new(
            small_config(10),
            Position::new(0.0, 0.0),
            observers(),
        )
        .unwrap();
        assert_eq!(pf.observers(), &observers());
        assert_eq!(pf.observer(1).unwrap(), &observers()[1]);
        assert!(matches!(pf.observer(2), Err(FilterError::UnknownObserver(2))));
    }

    #[test]
    fn test_mean_and_error() {
        let particles = vec![
            Particle::new(0.0, 0.0, 0.0, 0.0, 0.1),
            Particle::new(2.0, 4.0, 0.0, 0.0, 0.9),
        ];
        let estimate = mean(&particles).unwrap();
        assert_approx_eq!(estimate.x, 1.0, 1e-12);
        assert_approx_eq!(estimate.y, 2.0, 1e-12);
        assert_eq!(error(&estimate, &Position::new(1.0, 2.0)), 0.0);
        assert_approx_eq!(error(&estimate, &Position::new(4.0, 6.0)), 5.0, 1e-12);
        assert!(matches!(mean(&[]), Err(FilterError::EmptyPopulation)));
    }

    #[test]
    fn test_averaging_strategies() {
        let particles = vec![
            Particle::new(0.0, 0.0, 0.0, 0.0, 0.25),
            Particle::new(4.0, 8.0, 0.0, 0.0, 0.75),
        ];
        let weighted = ParticleAveragingStrategy::WeightedAverage
            .estimate(&particles)
            .unwrap();
        assert_approx_eq!(weighted.x, 3.0, 1e-12);
        assert_approx_eq!(weighted.y, 6.0, 1e-12);
        let best = ParticleAveragingStrategy::HighestWeight
            .estimate(&particles)
            .unwrap();
        assert_eq!(best, Position::new(4.0, 8.0));

        let cov = ParticleAveragingStrategy::UnweightedAverage
            .covariance(&particles)
            .unwrap();
        assert_approx_eq!(cov[(0, 0)], 4.0, 1e-12);
        assert_approx_eq!(cov[(1, 1)], 16.0, 1e-12);
        assert_approx_eq!(cov[(0, 1)], 8.0, 1e-12);
        let cov = ParticleAveragingStrategy::HighestWeight
            .covariance(&particles)
            .unwrap();
        assert_eq!(cov, Matrix2::zeros());
    }

    #[test]
    fn test_seeded_filters_are_identical() {
        let run = || {
            let mut pf = TwoObserverParticleFilter::new(
                small_config(200),
                Position::new(740.0, 280.0),
                observers(),
            )
            .unwrap();
            for i in 0..10 {
                if i % 3 != 2 {
                    pf.observe(Measurement {
                        range: 0.0,
                        bearing: 0.0,
                        x: 740.0 - i as f64,
                        y: 280.0 + i as f64,
                    });
                }
                pf.step(0.1).unwrap();
            }
            pf.particles().to_vec()
        };
        assert_eq!(run(), run());
    }
}
