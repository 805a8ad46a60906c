//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by `AIRQ_*`
//! environment variables. Every section has defaults, so an empty file (or
//! no file) yields a working setup.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classifier::ForestParams;
use crate::error::{AirQualityError, Result};
use crate::features::RangeTable;
use crate::quality::GrayZone;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub training: TrainingConfig,
    pub forest: ForestParams,
    pub gray_zone: GrayZone,
    pub ranges: RangeTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Labeled dataset used for training, evaluation and `/stats`.
    pub dataset: PathBuf,
    /// Raw multi-site export consumed by `prepare`.
    pub raw_dataset: PathBuf,
    /// Directory holding the scaler and classifier artifacts.
    pub artifact_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("dataset_kualitas_udara_beijing_final.csv"),
            raw_dataset: PathBuf::from("beijing_gabungan.csv"),
            artifact_dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of labeled records held out for evaluation.
    pub test_ratio: f64,
    pub seed: u64,
    /// Nearest neighbours used when synthesizing minority samples.
    pub neighbors: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
            neighbors: 5,
        }
    }
}

impl Settings {
    /// Load settings from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    AirQualityError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AirQualityError::Config(e.to_string()))
    }

    /// Apply `AIRQ_*` overrides looked up through `var`.
    fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("AIRQ_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("AIRQ_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                AirQualityError::Config(format!("AIRQ_PORT must be a port number, got {port:?}"))
            })?;
        }
        if let Some(dir) = var("AIRQ_ARTIFACT_DIR") {
            self.paths.artifact_dir = PathBuf::from(dir);
        }
        if let Some(dataset) = var("AIRQ_DATASET") {
            self.paths.dataset = PathBuf::from(dataset);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ranges.is_well_formed() {
            return Err(AirQualityError::Config(
                "every range needs finite bounds with min <= max".into(),
            ));
        }
        let ratio = self.training.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(AirQualityError::Config(format!(
                "training.test_ratio must be in (0, 1), got {ratio}"
            )));
        }
        if self.training.neighbors == 0 {
            return Err(AirQualityError::Config(
                "training.neighbors must be at least 1".into(),
            ));
        }
        self.forest.validate()
    }
}
