//! Two-observer bearing/range particle filter for single target tracking
//!
//! This crate estimates the planar position and velocity of a single moving target from noisy
//! bearing and range observations taken by two fixed observers. The estimator is a sequential
//! Monte Carlo (particle) filter. Each cycle it propagates every particle through a bounded random
//! motion model, scores each particle against both observers independently, fuses the two
//! per-observer likelihood vectors into one normalized weight, and regenerates the population with
//! a resampler that guarantees every particle at least one descendant in the candidate pool.
//!
//! This crate is primarily built off of the following dependencies:
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides
//!   the seedable random number generation that drives particle creation, propagation, and resampling.
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the small linear algebra types used for the
//!   population statistics (mean vector and position covariance).
//! - [`serde`](https://crates.io/crates/serde): Provides (de)serialization of filter and simulation
//!   configuration (JSON/YAML/TOML) and of tracking results (CSV).
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [particle]: The particle state hypothesis and the bounded random motion model.
//! - [measurements]: Measurement types and the bearing/range likelihood kernel.
//! - [fusion]: Combination of the two per-observer weight vectors into one normalized weight.
//! - [resampling]: Population regeneration strategies, including the five-band bucket scheme.
//! - [filter]: The two-observer particle filter itself, its configuration, and point estimates.
//! - [error]: Error types shared by the crate.
//! - [sim]: A synthetic target and sensor pair for exercising the filter and recording results.
//!
//! ## Coordinate and state definitions
//!
//! All positions are world-frame planar coordinates in meters. Headings and bearings are in radians,
//! measured counter-clockwise from the world $x$ axis, and kept in the principal interval
//! $(-\pi, \pi]$. A particle carries the state
//!
//! $$
//! x = [p_x, p_y, v, \psi]
//! $$
//!
//! where $v \in [0, v_{max})$ is the speed and $\psi$ the heading. The bearing an observer reports is
//! relative to its own heading:
//!
//! $$
//! \alpha = \mathrm{wrap}\left(\mathrm{atan2}(p_y - o_y, p_x - o_x)\right) - o_\psi
//! $$
//!
//! and the range is the Euclidean distance between observer and target.
pub mod error;
pub mod filter;
pub mod fusion;
pub mod measurements;
pub mod particle;
pub mod resampling;
pub mod sim;

pub use error::FilterError;
pub use filter::{FilterConfig, ParticleAveragingStrategy, TwoObserverParticleFilter};
pub use measurements::{Measurement, MeasurementSource, ObservationModel};
pub use particle::{MotionModel, Particle};

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// A planar world-frame position in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}
impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((other.y - self.y).powi(2) + (other.x - self.x).powi(2)).sqrt()
    }
}
impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Fixed pose of an observer.
///
/// Observers are stationary for the life of a filter; the pose is set once at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverState {
    /// World-frame x coordinate (m)
    pub x: f64,
    /// World-frame y coordinate (m)
    pub y: f64,
    /// Heading of the observer (rad)
    pub heading: f64,
}
impl ObserverState {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        ObserverState { x, y, heading }
    }
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
    /// Bearing from this observer to `target`, relative to the observer heading.
    ///
    /// The absolute line-of-sight angle is wrapped to $(-\pi, \pi]$ before the observer heading is
    /// subtracted; the difference itself is not re-wrapped.
    pub fn bearing_to(&self, target: &Position) -> f64 {
        wrap_to_pi((target.y - self.y).atan2(target.x - self.x)) - self.heading
    }
    /// Euclidean range from this observer to `target`
    pub fn range_to(&self, target: &Position) -> f64 {
        self.position().distance_to(target)
    }
}

// --- Miscellaneous functions for wrapping angles and bounded scalars ---
/// Wrap an angle to the range $(-\pi, \pi]$ radians
///
/// Values already inside the interval are returned unchanged, which makes the function idempotent.
/// Anything else is reduced in closed form with a Euclidean remainder, so the call always terminates
/// (a NaN input comes back as NaN).
///
/// # Arguments
/// * `angle` - The angle to be wrapped in radians.
/// # Returns
/// * The wrapped angle, which will be in the range (-π, π] radians.
/// # Example
/// ```rust
/// use trackpf::wrap_to_pi;
/// use std::f64::consts::PI;
/// let angle = 3.0 * PI / 2.0; // radians
/// let wrapped_angle = wrap_to_pi(angle);
/// assert!((wrapped_angle + PI / 2.0).abs() < 1e-12); // 3π/2 radians wrapped to -π/2 radians
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}
/// Wrap a scalar to the half-open range `[0, upper)`
///
/// Used for the particle speed, which is only ever perturbed upward and so must be folded back
/// into its bounded interval. Values already in range are returned unchanged.
///
/// # Arguments
/// * `value` - The value to be wrapped.
/// * `upper` - The exclusive upper bound, must be positive.
/// # Returns
/// * The wrapped value in `[0, upper)`.
/// # Example
/// ```rust
/// use trackpf::wrap_to_range;
/// assert_eq!(wrap_to_range(7.0, 5.0), 2.0);
/// assert_eq!(wrap_to_range(5.0, 5.0), 0.0);
/// ```
pub fn wrap_to_range(value: f64, upper: f64) -> f64 {
    if (0.0..upper).contains(&value) {
        return value;
    }
    let wrapped = value.rem_euclid(upper);
    // rem_euclid can round up to `upper` for tiny negative inputs
    if wrapped >= upper { 0.0 } else { wrapped }
}
