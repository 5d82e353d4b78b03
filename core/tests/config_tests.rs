//! Round-trip tests for scenario configuration files
use tempfile::TempDir;

use trackpf::fusion::WeightFusionStrategy;
use trackpf::resampling::ParticleResamplingStrategy;
use trackpf::sim::SimulationConfig;
use trackpf::{FilterConfig, ParticleAveragingStrategy};

fn custom_config() -> SimulationConfig {
    SimulationConfig {
        steps: 120,
        dt: 0.25,
        range_noise_std_m: 4.5,
        dropout_probability: 0.1,
        seed: 99,
        filter: FilterConfig {
            num_particles: 321,
            seed: 8,
            fusion: WeightFusionStrategy::Product,
            resampling: ParticleResamplingStrategy::Systematic,
            averaging: ParticleAveragingStrategy::WeightedAverage,
            survivor_floor: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_round_trip_all_formats() {
    let dir = TempDir::new().unwrap();
    let config = custom_config();
    for ext in ["json", "yaml", "yml", "toml"] {
        let path = dir.path().join(format!("scenario.{ext}"));
        config.to_file(&path).unwrap();
        let loaded = SimulationConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config, "format {ext}");
    }
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        "steps = 10\n\n[filter]\nnum_particles = 64\nresampling = \"stratified\"\n",
    )
    .unwrap();
    let loaded = SimulationConfig::from_file(&path).unwrap();
    assert_eq!(loaded.steps, 10);
    assert_eq!(loaded.filter.num_particles, 64);
    assert_eq!(
        loaded.filter.resampling,
        ParticleResamplingStrategy::Stratified
    );
    assert_eq!(loaded.dt, SimulationConfig::default().dt);
    assert_eq!(loaded.filter.motion, FilterConfig::default().motion);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_partial_json_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(
        &path,
        r#"{ "filter": { "observation": { "range_std_m": 25.0 } } }"#,
    )
    .unwrap();
    let loaded = SimulationConfig::from_file(&path).unwrap();
    assert_eq!(loaded.filter.observation.range_std_m, 25.0);
    assert_eq!(loaded.filter.observation.bearing_std_rad, 0.5);
    assert_eq!(loaded.filter.num_particles, 1000);
}
