//! Linear-regression forecaster over Unix-seconds timestamps.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::models::ModelError;

/// Ordinary least squares with a single feature.
///
/// The feature is a timestamp in integer Unix seconds and the target is the
/// observed consumption value. Sums are centred on the feature mean so that
/// timestamps around 1.7e9 do not swamp the fit in floating point.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearForecaster {
    coef: Option<Fit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Fit {
    slope: f64,
    intercept: f64,
}

impl LinearForecaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fits slope and intercept to `(x, y)` pairs.
    ///
    /// A single point or a constant feature leaves the slope at zero and the
    /// intercept at the target mean.
    ///
    /// # Errors
    ///
    /// `ModelError::EmptyTrainingSet` when there are no points and
    /// `ModelError::LengthMismatch` when `x` and `y` differ in length.
    pub fn fit(&mut self, x: &[i64], y: &[f64]) -> Result<(), ModelError> {
        if x.len() != y.len() {
            return Err(ModelError::LengthMismatch {
                features: x.len(),
                targets: y.len(),
            });
        }
        if x.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let n = x.len() as f64;
        let x_mean = x.iter().map(|&v| v as f64).sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (&xi, &yi) in x.iter().zip(y) {
            let dx = xi as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (yi - y_mean);
        }

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        self.coef = Some(Fit {
            slope,
            intercept: y_mean - slope * x_mean,
        });
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.coef.is_some()
    }

    /// Predicts one value per timestamp.
    ///
    /// # Errors
    ///
    /// `ModelError::NotFitted` if [`fit`](Self::fit) has not succeeded yet.
    pub fn predict(&self, x: &[i64]) -> Result<Vec<f64>, ModelError> {
        let c = self.coef.ok_or(ModelError::NotFitted("linear forecaster"))?;
        Ok(x.iter().map(|&xi| c.intercept + c.slope * xi as f64).collect())
    }
}

/// Splits `items` into `(train, test)` after a seeded shuffle.
///
/// The test share is `ceil(len * test_fraction)`, matching the usual
/// convention for fractional hold-out sizes.
pub fn train_test_split<T: Clone>(items: &[T], test_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = ((items.len() as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let test = shuffled.split_off(items.len() - n_test);
    (shuffled, test)
}

/// Mean absolute percentage error as a fraction (0.05 is 5%).
///
/// Denominators are clamped to machine epsilon so zero actuals yield a large
/// but finite error. Empty input gives `0.0`.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs() / a.abs().max(f64::EPSILON))
        .sum::<f64>()
        / n as f64
}

/// Mean of the predictions, or `None` for an empty horizon.
pub fn average(predictions: &[f64]) -> Option<f64> {
    if predictions.is_empty() {
        None
    } else {
        Some(predictions.iter().sum::<f64>() / predictions.len() as f64)
    }
}
