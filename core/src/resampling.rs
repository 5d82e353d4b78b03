//! Population regeneration.
//!
//! The default [`ParticleResamplingStrategy::Bucket`] scheme replicates every particle into a pool
//! according to which of five weight bands it falls in, then draws the next generation uniformly
//! from that pool. Since every particle contributes at least one clone, no hypothesis disappears
//! from the pool in a single step, even if the final draw happens to skip it.
//!
//! The proportional strategies (`Systematic`, `Stratified`, `Multinomial`) select particles with
//! probability proportional to weight. With the survivor floor enabled they are applied the same
//! way as the bucket scheme: one copy of every particle goes into the pool next to the strategy's
//! selections, and the next generation is drawn uniformly from the pool.
use crate::error::FilterError;
use crate::particle::Particle;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ParticleResamplingStrategy {
    /// Five-band replication followed by a uniform draw
    #[default]
    Bucket,
    Systematic,
    Stratified,
    Multinomial,
}

impl ParticleResamplingStrategy {
    /// Draw a new generation of the same size as `particles`.
    ///
    /// # Arguments
    /// * `particles` - Current population carrying fused weights in `[0, 1]`.
    /// * `survivor_floor` - Guarantee every particle a place in the candidate pool. Always on for
    ///   `Bucket`.
    /// * `rng` - Random number generator.
    ///
    /// # Errors
    /// * [`FilterError::EmptyPopulation`] if `particles` is empty.
    /// * [`FilterError::InvalidWeight`] if any weight lies outside `[0, 1]` (or is NaN).
    pub fn resample<R: Rng>(
        &self,
        particles: &[Particle],
        survivor_floor: bool,
        rng: &mut R,
    ) -> Result<Vec<Particle>, FilterError> {
        if particles.is_empty() {
            return Err(FilterError::EmptyPopulation);
        }
        validate_weights(particles)?;
        let n = particles.len();
        let pool = match self {
            ParticleResamplingStrategy::Bucket => bucket_pool(particles)?,
            _ => {
                let weights: Vec<f64> = particles.iter().map(|p| p.weight).collect();
                let indices = match self {
                    ParticleResamplingStrategy::Systematic => systematic_indices(&weights, n, rng),
                    ParticleResamplingStrategy::Stratified => stratified_indices(&weights, n, rng),
                    _ => multinomial_indices(&weights, n, rng),
                };
                if !survivor_floor {
                    return Ok(indices.into_iter().map(|i| particles[i].clone()).collect());
                }
                floor_pool(particles, &indices)
            }
        };
        log::trace!("resampling {n} particles from a pool of {}", pool.len());
        Ok(draw_uniform(&pool, n, rng))
    }
}

fn validate_weights(particles: &[Particle]) -> Result<(), FilterError> {
    for (index, particle) in particles.iter().enumerate() {
        if !(0.0..=1.0).contains(&particle.weight) {
            return Err(FilterError::InvalidWeight {
                index,
                weight: particle.weight,
            });
        }
    }
    Ok(())
}

/// Number of clones a particle of the given weight contributes to the bucket pool.
///
/// | weight       | clones |
/// |--------------|--------|
/// | `[0, 0.2)`   | 1      |
/// | `[0.2, 0.4)` | 2      |
/// | `[0.4, 0.6)` | 3      |
/// | `[0.6, 0.8)` | 4      |
/// | `[0.8, 1.0]` | 5      |
///
/// Returns `None` for weights outside `[0, 1]`.
pub fn bucket_copies(weight: f64) -> Option<usize> {
    if !(0.0..=1.0).contains(&weight) {
        None
    } else if weight < 0.2 {
        Some(1)
    } else if weight < 0.4 {
        Some(2)
    } else if weight < 0.6 {
        Some(3)
    } else if weight < 0.8 {
        Some(4)
    } else {
        Some(5)
    }
}

/// Replicate every particle into a pool according to [`bucket_copies`].
///
/// Clones are independent deep copies of their source.
pub fn bucket_pool(particles: &[Particle]) -> Result<Vec<Particle>, FilterError> {
    let mut pool = Vec::with_capacity(3 * particles.len());
    for (index, particle) in particles.iter().enumerate() {
        let copies = bucket_copies(particle.weight).ok_or(FilterError::InvalidWeight {
            index,
            weight: particle.weight,
        })?;
        for _ in 0..copies {
            pool.push(particle.clone());
        }
    }
    Ok(pool)
}

/// One copy of every particle followed by the particles at `selected`.
///
/// Used by the proportional strategies when the survivor floor is on, so a particle keeps a place
/// in the pool even when its weight earned it no selection.
pub(crate) fn floor_pool(particles: &[Particle], selected: &[usize]) -> Vec<Particle> {
    let mut pool = Vec::with_capacity(particles.len() + selected.len());
    pool.extend_from_slice(particles);
    pool.extend(selected.iter().map(|&i| particles[i].clone()));
    pool
}

/// Draw `n` particles uniformly at random, with replacement, from `pool`.
pub fn draw_uniform<R: Rng>(pool: &[Particle], n: usize, rng: &mut R) -> Vec<Particle> {
    if pool.is_empty() {
        return Vec::new();
    }
    (0..n)
        .map(|_| pool[rng.random_range(0..pool.len())].clone())
        .collect()
}

/// Normalized running sum of `weights`. An all-zero vector is treated as uniform.
fn cumulative_weights(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    let mut running = 0.0;
    weights
        .iter()
        .map(|w| {
            running += if total > 0.0 {
                w / total
            } else {
                1.0 / weights.len() as f64
            };
            running
        })
        .collect()
}

/// First index whose cumulative weight reaches `u`, clamped to the last index to absorb rounding.
fn search(cumulative: &[f64], u: f64) -> usize {
    cumulative
        .partition_point(|&c| c < u)
        .min(cumulative.len() - 1)
}

/// Systematic resampling: one random offset, `n` evenly spaced positions.
pub fn systematic_indices<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let cumulative = cumulative_weights(weights);
    let step = 1.0 / n as f64;
    let offset = rng.random::<f64>() * step;
    (0..n)
        .map(|i| search(&cumulative, offset + i as f64 * step))
        .collect()
}

/// Stratified resampling: one independent draw inside each of `n` equal strata.
pub fn stratified_indices<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let cumulative = cumulative_weights(weights);
    (0..n)
        .map(|i| search(&cumulative, (i as f64 + rng.random::<f64>()) / n as f64))
        .collect()
}

/// Multinomial resampling: `n` independent draws proportional to weight.
pub fn multinomial_indices<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let cumulative = cumulative_weights(weights);
    (0..n)
        .map(|_| search(&cumulative, rng.random::<f64>()))
        .collect()
}
