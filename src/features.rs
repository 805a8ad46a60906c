//! Weather features, readings, and the acceptable range table.
//!
//! `RangeTable` is the only place the valid bounds live. Training uses it to
//! describe the dataset and the gateway uses it to reject and explain
//! requests, so the two can never disagree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FieldError;

pub const FEATURE_COUNT: usize = 4;

/// Ordered model input: temperature, dew point, pressure, wind speed.
pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Temperature,
    DewPoint,
    Pressure,
    WindSpeed,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Temperature,
        Feature::DewPoint,
        Feature::Pressure,
        Feature::WindSpeed,
    ];

    pub fn index(self) -> usize {
        match self {
            Feature::Temperature => 0,
            Feature::DewPoint => 1,
            Feature::Pressure => 2,
            Feature::WindSpeed => 3,
        }
    }

    /// JSON and CSV key used by the frontend and the prepared dataset.
    pub fn key(self) -> &'static str {
        match self {
            Feature::Temperature => "suhu",
            Feature::DewPoint => "kelembapan",
            Feature::Pressure => "tekanan",
            Feature::WindSpeed => "kecepatan_angin",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Feature::Temperature => "Temperature",
            Feature::DewPoint => "Dew Point (Humidity)",
            Feature::Pressure => "Air Pressure",
            Feature::WindSpeed => "Wind Speed",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Feature::Temperature => "°C",
            Feature::DewPoint => "",
            Feature::Pressure => "mb",
            Feature::WindSpeed => "m/s",
        }
    }

    /// Column names in the raw Beijing multi-site export.
    pub fn raw_column(self) -> &'static str {
        match self {
            Feature::Temperature => "TEMP",
            Feature::DewPoint => "DEWP",
            Feature::Pressure => "PRES",
            Feature::WindSpeed => "WSPM",
        }
    }
}

/// One set of weather measurements as submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "suhu")]
    pub temperature: f64,
    #[serde(rename = "kelembapan")]
    pub dew_point: f64,
    #[serde(rename = "tekanan")]
    pub pressure: f64,
    #[serde(rename = "kecepatan_angin")]
    pub wind_speed: f64,
}

impl Reading {
    pub fn from_vector(v: FeatureVector) -> Self {
        Self {
            temperature: v[0],
            dew_point: v[1],
            pressure: v[2],
            wind_speed: v[3],
        }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Temperature => self.temperature,
            Feature::DewPoint => self.dew_point,
            Feature::Pressure => self.pressure,
            Feature::WindSpeed => self.wind_speed,
        }
    }

    pub fn to_vector(&self) -> FeatureVector {
        [
            self.temperature,
            self.dew_point,
            self.pressure,
            self.wind_speed,
        ]
    }
}

/// Inclusive bounds for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Valid range description echoed back to clients after a rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeDescription {
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
    pub label: &'static str,
}

/// Acceptable input bounds, derived from the observed extremes of the
/// training dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeTable {
    #[serde(rename = "suhu")]
    pub temperature: Bounds,
    #[serde(rename = "kelembapan")]
    pub dew_point: Bounds,
    #[serde(rename = "tekanan")]
    pub pressure: Bounds,
    #[serde(rename = "kecepatan_angin")]
    pub wind_speed: Bounds,
}

impl Default for RangeTable {
    fn default() -> Self {
        Self {
            temperature: Bounds::new(-20.0, 40.0),
            dew_point: Bounds::new(-40.0, 30.0),
            pressure: Bounds::new(990.0, 1045.0),
            wind_speed: Bounds::new(0.0, 15.0),
        }
    }
}

impl RangeTable {
    pub fn get(&self, feature: Feature) -> Bounds {
        match feature {
            Feature::Temperature => self.temperature,
            Feature::DewPoint => self.dew_point,
            Feature::Pressure => self.pressure,
            Feature::WindSpeed => self.wind_speed,
        }
    }

    pub fn contains(&self, feature: Feature, value: f64) -> bool {
        self.get(feature).contains(value)
    }

    /// Check one value, producing the structured error on violation.
    pub fn check(&self, feature: Feature, value: f64) -> Option<FieldError> {
        let bounds = self.get(feature);
        if bounds.contains(value) {
            return None;
        }
        let unit = feature.unit();
        Some(FieldError {
            field: feature.key().to_string(),
            label: feature.label().to_string(),
            message: format!(
                "{} must be between {}{unit} and {}{unit}. Your value: {}{unit}",
                feature.label(),
                bounds.min,
                bounds.max,
                value
            ),
            min: Some(bounds.min),
            max: Some(bounds.max),
            value: Some(value),
        })
    }

    /// Every violation in the reading, in feature order.
    pub fn validate(&self, reading: &Reading) -> Vec<FieldError> {
        Feature::ALL
            .iter()
            .filter_map(|&f| self.check(f, reading.get(f)))
            .collect()
    }

    pub fn describe(&self) -> BTreeMap<&'static str, RangeDescription> {
        Feature::ALL
            .iter()
            .map(|&f| {
                let b = self.get(f);
                (
                    f.key(),
                    RangeDescription {
                        min: b.min,
                        max: b.max,
                        unit: f.unit(),
                        label: f.label(),
                    },
                )
            })
            .collect()
    }

    pub fn is_well_formed(&self) -> bool {
        Feature::ALL.iter().all(|&f| {
            let b = self.get(f);
            b.min.is_finite() && b.max.is_finite() && b.min <= b.max
        })
    }
}
