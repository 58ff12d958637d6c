//! Model training, artifact persistence, and startup loading.
//!
//! The offline trainer writes two artifact slots (forecast and anomaly) as
//! JSON. At service start both slots are read back; if either one cannot be
//! used the service falls back to fresh models fitted on the startup mock
//! dataset, and reports which path it took through [`ModelSource`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anomaly::{IsolationForest, IsolationForestParams};
use crate::forecast::{LinearForecaster, mean_absolute_percentage_error, train_test_split};
use crate::synthetic::SyntheticSample;

/// Share of the series held out when evaluating the trained forecaster.
pub const TEST_FRACTION: f64 = 0.2;

/// Errors raised while fitting or querying a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("got {features} feature rows but {targets} targets")]
    LengthMismatch { features: usize, targets: usize },
    #[error("{0} has not been fitted")]
    NotFitted(&'static str),
    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
}

/// Errors raised while reading or writing an artifact slot.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("malformed artifact {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot encode artifact: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{} holds a `{found}` model, expected `{expected}`", .path.display())]
    KindMismatch {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },
    #[error("{} holds an unfitted model", .path.display())]
    Unfitted { path: PathBuf },
}

/// The two named artifact slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSlot {
    Forecast,
    Anomaly,
}

impl ArtifactSlot {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Forecast => "forecast_model.json",
            Self::Anomaly => "anomaly_model.json",
        }
    }

    /// Tag written next to the model so a slot cannot be loaded as the other kind.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Forecast => "linear_forecaster",
            Self::Anomaly => "isolation_forest",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Artifact<T> {
    kind: String,
    model: T,
}

/// Directory holding the serialized model slots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: ArtifactSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Writes both slots, creating the directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an `ArtifactError` on any encode or filesystem failure.
    pub fn persist(&self, models: &ModelPair) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Write {
            path: self.dir.clone(),
            source,
        })?;
        self.write(ArtifactSlot::Forecast, &models.forecaster)?;
        self.write(ArtifactSlot::Anomaly, &models.detector)?;
        Ok(())
    }

    /// Reads both slots and checks that each holds a fitted model of the right kind.
    ///
    /// # Errors
    ///
    /// Returns the first `ArtifactError` encountered.
    pub fn load(&self) -> Result<ModelPair, ArtifactError> {
        let forecaster: LinearForecaster = self.read(ArtifactSlot::Forecast)?;
        if !forecaster.is_fitted() {
            return Err(ArtifactError::Unfitted {
                path: self.path(ArtifactSlot::Forecast),
            });
        }
        let detector: IsolationForest = self.read(ArtifactSlot::Anomaly)?;
        if !detector.is_fitted() {
            return Err(ArtifactError::Unfitted {
                path: self.path(ArtifactSlot::Anomaly),
            });
        }
        Ok(ModelPair {
            forecaster,
            detector,
        })
    }

    fn write<T: Serialize>(&self, slot: ArtifactSlot, model: &T) -> Result<(), ArtifactError> {
        let path = self.path(slot);
        let body = serde_json::to_vec(&Artifact {
            kind: slot.kind().to_string(),
            model,
        })?;
        fs::write(&path, body).map_err(|source| ArtifactError::Write { path, source })
    }

    fn read<T: DeserializeOwned>(&self, slot: ArtifactSlot) -> Result<T, ArtifactError> {
        let path = self.path(slot);
        let raw = fs::read(&path).map_err(|source| ArtifactError::Read {
            path: path.clone(),
            source,
        })?;
        let artifact: Artifact<T> = serde_json::from_slice(&raw).map_err(|source| ArtifactError::Decode {
            path: path.clone(),
            source,
        })?;
        if artifact.kind != slot.kind() {
            return Err(ArtifactError::KindMismatch {
                path,
                found: artifact.kind,
                expected: slot.kind(),
            });
        }
        Ok(artifact.model)
    }
}

/// Forecaster and anomaly detector served together.
#[derive(Debug, Clone)]
pub struct ModelPair {
    pub forecaster: LinearForecaster,
    pub detector: IsolationForest,
}

/// Which path startup loading took.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Both slots were read from this directory.
    Loaded { dir: PathBuf },
    /// Artifacts were unusable; models were fitted on the startup mock data.
    FellBackToDefault { reason: String },
}

impl ModelSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FellBackToDefault { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub models: ModelPair,
    pub source: ModelSource,
}

/// Loads both artifacts, or fits fresh models on `mock` if either slot fails.
///
/// # Errors
///
/// Only the fallback fit can fail, e.g. when `mock` is empty.
pub fn load_or_fallback(
    artifacts: &ArtifactStore,
    mock: &[SyntheticSample],
    detector_params: &IsolationForestParams,
) -> Result<LoadedModels, ModelError> {
    match artifacts.load() {
        Ok(models) => {
            info!(dir = %artifacts.dir().display(), "loaded trained models");
            Ok(LoadedModels {
                models,
                source: ModelSource::Loaded {
                    dir: artifacts.dir().to_path_buf(),
                },
            })
        }
        Err(e) => {
            warn!(error = %e, "using mock models");
            let (x, y) = features_and_targets(mock);
            let mut forecaster = LinearForecaster::new();
            forecaster.fit(&x, &y)?;
            let mut detector = IsolationForest::new(detector_params.clone());
            detector.fit(&y)?;
            Ok(LoadedModels {
                models: ModelPair {
                    forecaster,
                    detector,
                },
                source: ModelSource::FellBackToDefault {
                    reason: e.to_string(),
                },
            })
        }
    }
}

/// Outcome of fitting the forecaster with a hold-out evaluation.
#[derive(Debug, Clone)]
pub struct ForecasterReport {
    pub model: LinearForecaster,
    /// Mean absolute percentage error on the held-out rows, as a fraction.
    pub mape: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Fits the forecaster on 80% of `samples` and scores it on the rest.
///
/// # Errors
///
/// Propagates `ModelError` from fitting or predicting.
pub fn train_forecaster(samples: &[SyntheticSample], split_seed: u64) -> Result<ForecasterReport, ModelError> {
    let (train, test) = train_test_split(samples, TEST_FRACTION, split_seed);
    let (x_train, y_train) = features_and_targets(&train);
    let (x_test, y_test) = features_and_targets(&test);

    let mut model = LinearForecaster::new();
    model.fit(&x_train, &y_train)?;
    let predictions = model.predict(&x_test)?;
    let mape = mean_absolute_percentage_error(&y_test, &predictions);
    info!(mape_pct = mape * 100.0, "forecaster evaluated on hold-out");

    Ok(ForecasterReport {
        model,
        mape,
        train_rows: train.len(),
        test_rows: test.len(),
    })
}

/// Fits an isolation forest on the sample values alone.
///
/// # Errors
///
/// Propagates `ModelError` from fitting.
pub fn train_anomaly_detector(
    samples: &[SyntheticSample],
    params: &IsolationForestParams,
) -> Result<IsolationForest, ModelError> {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let mut detector = IsolationForest::new(params.clone());
    detector.fit(&values)?;
    Ok(detector)
}

/// Unix-seconds feature column and value target column.
pub fn features_and_targets(samples: &[SyntheticSample]) -> (Vec<i64>, Vec<f64>) {
    samples.iter().map(|s| (s.unix_seconds(), s.value)).unzip()
}
