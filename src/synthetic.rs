use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Regions a synthetic sample is drawn from, uniformly.
pub const REGIONS: [&str; 4] = ["North", "South", "East", "West"];

/// One synthetic hourly consumption observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSample {
    pub timestamp: DateTime<Utc>,
    pub region: &'static str,
    pub value: f64,
}

impl SyntheticSample {
    /// Timestamp encoded as integer Unix seconds, the forecaster's only feature.
    pub fn unix_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

/// Generator for fake hourly consumption history.
///
/// Each value is Gaussian noise around `mean` plus a daily sinusoid:
///
/// ```text
/// value[i] = N(mean, std_dev) + diurnal_amp * sin(2π i / 24)
/// ```
///
/// # Examples
///
/// ```
/// use grid_insight::synthetic::SyntheticSeries;
///
/// let series = SyntheticSeries::seeded(42).generate();
/// assert_eq!(series.len(), 1000);
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticSeries {
    /// Number of hourly samples to produce
    pub periods: usize,
    /// First timestamp; later samples follow at one-hour spacing
    pub start: DateTime<Utc>,
    /// Mean of the Gaussian noise component
    pub mean: f64,
    /// Standard deviation of the Gaussian noise component
    pub std_dev: f64,
    /// Amplitude of the 24-sample daily sinusoid
    pub diurnal_amp: f64,
    /// RNG seed; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for SyntheticSeries {
    fn default() -> Self {
        Self {
            periods: 1000,
            start: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            mean: 100.0,
            std_dev: 20.0,
            diurnal_amp: 10.0,
            seed: None,
        }
    }
}

impl SyntheticSeries {
    /// Default series with a fixed seed, reproducible across runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Default series drawn from OS entropy, different on every call.
    pub fn unseeded(periods: usize) -> Self {
        Self {
            periods,
            ..Self::default()
        }
    }

    pub fn generate(&self) -> Vec<SyntheticSample> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        (0..self.periods)
            .map(|i| {
                let region = REGIONS[rng.random_range(0..REGIONS.len())];
                let angle = 2.0 * std::f64::consts::PI * i as f64 / 24.0;
                let value = gaussian(&mut rng, self.mean, self.std_dev) + self.diurnal_amp * angle.sin();
                SyntheticSample {
                    timestamp: self.start + Duration::hours(i as i64),
                    region,
                    value,
                }
            })
            .collect()
    }
}

/// Box-Muller sample from N(mean, std_dev).
fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std_dev
}
