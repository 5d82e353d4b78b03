//! Simulation utilities for exercising the tracking filter.
//!
//! This module provides:
//! - A random-walk target (`TargetSimulator`) that supplies ground truth
//! - A pair of simulated bearing/range sensors (`SensorModel`) with optional noise and dropout
//! - `Scenario`, which combines the two and implements [`MeasurementSource`]
//! - `SimulationConfig` with JSON/YAML/TOML import/export
//! - `TrackingResult` for storing per-step estimates and exporting/importing them as CSV
use crate::error::FilterError;
use crate::filter::{FilterConfig, TwoObserverParticleFilter};
use crate::measurements::{Measurement, MeasurementSource};
use crate::particle::sample_uniform;
use crate::{ObserverState, Position, wrap_to_pi};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Zero-mean Gaussian sample, zero when `std_dev` is not positive.
fn gaussian<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    if std_dev > 0.0 {
        Normal::new(0.0, std_dev)
            .map(|normal| normal.sample(rng))
            .unwrap_or(0.0)
    } else {
        0.0
    }
}

/// Default random number generator seed for reproducible scenarios
fn default_seed() -> u64 {
    7
}

/// Tracking scenario parameters.
///
/// # Example
///
/// ```
/// use trackpf::sim::SimulationConfig;
///
/// // 200 steps of 0.1 s with noisy ranges and a 20% chance of a missed observation
/// let cfg = SimulationConfig {
///     steps: 200,
///     range_noise_std_m: 2.0,
///     dropout_probability: 0.2,
///     ..Default::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of filter cycles to run
    pub steps: usize,
    /// Cycle length (s)
    pub dt: f64,
    /// Each target velocity component is drawn from `U(-target_speed, target_speed)` every step
    pub target_speed: f64,
    /// Standard deviation of the reported range (m)
    pub range_noise_std_m: f64,
    /// Standard deviation of the reported bearing (rad)
    pub bearing_noise_std_rad: f64,
    /// Standard deviation of the reported target position (m)
    pub position_noise_std_m: f64,
    /// Probability that a sensor reports nothing in a given step
    pub dropout_probability: f64,
    /// Seed for the target and sensor random number generator
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub target_start: Position,
    pub observers: [ObserverState; 2],
    pub filter: FilterConfig,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            steps: 50,
            dt: 0.1,
            target_speed: 5.0,
            range_noise_std_m: 0.0,
            bearing_noise_std_rad: 0.0,
            position_noise_std_m: 0.0,
            dropout_probability: 0.0,
            seed: default_seed(),
            target_start: Position::new(740.0, 280.0),
            observers: [
                ObserverState::new(0.0, 0.0, 0.0),
                ObserverState::new(-5.0, 5.0, 0.0),
            ],
            filter: FilterConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Check the scenario and the nested filter configuration.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !(self.dt > 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        let non_negative = [
            ("target_speed", self.target_speed),
            ("range_noise_std_m", self.range_noise_std_m),
            ("bearing_noise_std_rad", self.bearing_noise_std_rad),
            ("position_noise_std_m", self.position_noise_std_m),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(FilterError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.dropout_probability) {
            return Err(FilterError::InvalidConfig(format!(
                "dropout_probability must be in [0, 1], got {}",
                self.dropout_probability
            )));
        }
        self.filter.validate()
    }
    /// Configuration for Monte Carlo trial `trial`: both seeds are offset by the trial number.
    pub fn for_trial(&self, trial: u64) -> SimulationConfig {
        let mut config = self.clone();
        config.seed = self.seed.wrapping_add(trial);
        config.filter.seed = self.filter.seed.wrapping_add(trial);
        config
    }
    /// Write the configuration to `path`, in the format selected by its extension.
    ///
    /// # Errors
    /// * [`FilterError::InvalidConfig`] for an unsupported extension or a serializer failure.
    /// * [`FilterError::Io`] if the file cannot be written.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FilterError> {
        let path = path.as_ref();
        let text = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(format_error)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(format_error)?,
            ConfigFormat::Toml => toml::to_string(self).map_err(format_error)?,
        };
        fs::write(path, text)?;
        Ok(())
    }
    /// Read a configuration from `path`, in the format selected by its extension. Missing fields
    /// take their default values.
    ///
    /// # Errors
    /// * [`FilterError::InvalidConfig`] for an unsupported extension or malformed contents.
    /// * [`FilterError::Io`] if the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = fs::read_to_string(path)?;
        match format {
            ConfigFormat::Json => serde_json::from_str(&text).map_err(format_error),
            ConfigFormat::Yaml => serde_yaml::from_str(&text).map_err(format_error),
            ConfigFormat::Toml => toml::from_str(&text).map_err(format_error),
        }
    }
}

/// Configuration file formats, selected by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}
impl ConfigFormat {
    /// `.json`, `.yaml`/`.yml` or `.toml`, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self, FilterError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(FilterError::InvalidConfig(format!(
                "unsupported configuration file extension: {}",
                path.display()
            ))),
        }
    }
}

fn format_error<E: std::fmt::Display>(error: E) -> FilterError {
    FilterError::InvalidConfig(error.to_string())
}

/// Planar random-walk target.
///
/// Every step draws fresh velocity components from `U(-speed, speed)` and integrates them over
/// the step.
#[derive(Clone, Debug)]
pub struct TargetSimulator {
    position: Position,
    speed: f64,
}
impl TargetSimulator {
    pub fn new(start: Position, speed: f64) -> Self {
        TargetSimulator {
            position: start,
            speed,
        }
    }
    pub fn position(&self) -> Position {
        self.position
    }
    /// Move the target by one step of `dt` seconds and return its new position.
    pub fn advance<R: Rng>(&mut self, dt: f64, rng: &mut R) -> Position {
        let v_x = sample_uniform(rng, -self.speed, self.speed);
        let v_y = sample_uniform(rng, -self.speed, self.speed);
        self.position.x += v_x * dt;
        self.position.y += v_y * dt;
        self.position
    }
}

/// Simulated bearing/range sensor shared by both observers.
#[derive(Clone, Debug, Default)]
pub struct SensorModel {
    pub range_noise_std_m: f64,
    pub bearing_noise_std_rad: f64,
    pub position_noise_std_m: f64,
    pub dropout_probability: f64,
}
impl SensorModel {
    /// Observe `target` from `observer`, or `None` when the observation drops out.
    pub fn sense<R: Rng>(
        &self,
        observer: &ObserverState,
        target: &Position,
        rng: &mut R,
    ) -> Option<Measurement> {
        if self.dropout_probability > 0.0 && rng.random::<f64>() < self.dropout_probability {
            return None;
        }
        Some(Measurement {
            range: (observer.range_to(target) + gaussian(rng, self.range_noise_std_m)).max(0.0),
            bearing: wrap_to_pi(
                observer.bearing_to(target) + gaussian(rng, self.bearing_noise_std_rad),
            ),
            x: target.x + gaussian(rng, self.position_noise_std_m),
            y: target.y + gaussian(rng, self.position_noise_std_m),
        })
    }
}

/// A moving target watched by two simulated sensors.
///
/// Measurements produced by [`advance`](Scenario::advance) are handed out once each through
/// [`MeasurementSource::measurement`].
#[derive(Clone, Debug)]
pub struct Scenario {
    target: TargetSimulator,
    sensor: SensorModel,
    observers: [ObserverState; 2],
    latest: [Option<Measurement>; 2],
    rng: StdRng,
}
impl Scenario {
    pub fn new(config: &SimulationConfig) -> Self {
        Scenario {
            target: TargetSimulator::new(config.target_start, config.target_speed),
            sensor: SensorModel {
                range_noise_std_m: config.range_noise_std_m,
                bearing_noise_std_rad: config.bearing_noise_std_rad,
                position_noise_std_m: config.position_noise_std_m,
                dropout_probability: config.dropout_probability,
            },
            observers: config.observers,
            latest: [None, None],
            rng: StdRng::seed_from_u64(config.seed),
        }
    }
    /// Move the target and take a fresh observation from each observer.
    pub fn advance(&mut self, dt: f64) {
        let truth = self.target.advance(dt, &mut self.rng);
        for (slot, observer) in self.latest.iter_mut().zip(self.observers.iter()) {
            *slot = self.sensor.sense(observer, &truth, &mut self.rng);
        }
    }
    /// Whether any observer has an unconsumed measurement
    pub fn has_measurement(&self) -> bool {
        self.latest.iter().any(Option::is_some)
    }
}
impl MeasurementSource for Scenario {
    fn measurement(&mut self, observer_id: usize) -> Option<Measurement> {
        self.latest.get_mut(observer_id).and_then(Option::take)
    }
    fn ground_truth(&self) -> Position {
        self.target.position()
    }
}

/// One row of a tracking run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub step: usize,
    pub time_s: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub error_m: f64,
    pub effective_particles: f64,
    /// Whether this cycle ran a measurement correction
    pub corrected: bool,
}

/// Per-step history of a tracking run.
#[derive(Clone, Debug, Default)]
pub struct TrackingResult {
    pub name: String,
    pub records: Vec<TrackingRecord>,
}
impl TrackingResult {
    pub fn new(name: &str) -> Self {
        TrackingResult {
            name: name.to_string(),
            records: Vec::new(),
        }
    }
    /// Mean estimate error over the whole run, `None` for an empty run
    pub fn mean_error(&self) -> Option<f64> {
        self.mean_error_last(self.records.len())
    }
    /// Mean estimate error over the last `count` steps, the convergence summary of a run
    pub fn mean_error_last(&self, count: usize) -> Option<f64> {
        let count = count.min(self.records.len());
        if count == 0 {
            return None;
        }
        let tail = &self.records[self.records.len() - count..];
        Some(tail.iter().map(|r| r.error_m).sum::<f64>() / count as f64)
    }
    pub fn final_error(&self) -> Option<f64> {
        self.records.last().map(|r| r.error_m)
    }
    /// Write the records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), FilterError> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Read records previously written by [`to_csv`](TrackingResult::to_csv).
    pub fn from_csv<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, FilterError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: TrackingRecord = result?;
            records.push(record);
        }
        Ok(TrackingResult {
            name: name.to_string(),
            records,
        })
    }
}

/// Run one complete tracking scenario.
///
/// The filter starts on the target's true initial position and is stepped once per scenario step,
/// pulling whatever measurements the simulated sensors produced.
pub fn run_simulation(
    config: &SimulationConfig,
    name: &str,
) -> Result<TrackingResult, FilterError> {
    config.validate()?;
    let mut scenario = Scenario::new(config);
    let mut pf = TwoObserverParticleFilter::new(
        config.filter.clone(),
        config.target_start,
        config.observers,
    )?;
    let mut result = TrackingResult::new(name);
    for step in 1..=config.steps {
        scenario.advance(config.dt);
        let corrected = scenario.has_measurement();
        pf.step_with(config.dt, &mut scenario)?;
        let truth = scenario.ground_truth();
        let estimate = pf.estimate()?;
        result.records.push(TrackingRecord {
            step,
            time_s: step as f64 * config.dt,
            true_x: truth.x,
            true_y: truth.y,
            estimate_x: estimate.x,
            estimate_y: estimate.y,
            error_m: pf.error(&truth)?,
            effective_particles: pf.effective_sample_size(),
            corrected,
        });
    }
    if let Some(error) = result.final_error() {
        log::info!(
            "{}: {} steps, final error {:.2} m",
            result.name,
            config.steps,
            error
        );
    }
    Ok(result)
}
