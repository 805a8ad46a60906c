//! Inference gateway: validate, scale, predict, explain.
//!
//! A request moves through received → validated → scaled → predicted →
//! explained. It leaves early as unavailable when no model was loaded
//! (checked before anything else) or rejected when a field is missing,
//! non-numeric or out of range. All field problems are reported together.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifacts::{self, ModelBundle};
use crate::classifier::Probabilities;
use crate::config::Settings;
use crate::dataset::LabeledTable;
use crate::error::{AirQualityError, FieldError, Result};
use crate::features::{Feature, RangeDescription, RangeTable, Reading, FEATURE_COUNT};
use crate::quality::Category;

/// Process-wide read-only state, built once at startup.
#[derive(Debug)]
pub struct ServiceContext {
    model: Option<ModelBundle>,
    dataset: Option<LabeledTable>,
    ranges: RangeTable,
}

impl ServiceContext {
    pub fn new(model: Option<ModelBundle>, dataset: Option<LabeledTable>, ranges: RangeTable) -> Self {
        Self {
            model,
            dataset,
            ranges,
        }
    }

    /// Load artifacts and the dataset named by `settings`.
    ///
    /// Missing artifacts leave the service unavailable rather than failing;
    /// a scaler and classifier from different runs is an error.
    pub fn load(settings: &Settings) -> Result<Self> {
        let model = match artifacts::load(&settings.paths.artifact_dir) {
            Ok(bundle) => {
                info!(
                    "loaded model run {} trained at {}",
                    artifacts::short_tag(&bundle.run_tag),
                    bundle.created_at
                );
                if bundle.ranges != settings.ranges {
                    warn!("range table differs from the one the model was trained with");
                }
                Some(bundle)
            }
            Err(AirQualityError::DataUnavailable(reason)) => {
                warn!("model unavailable: {reason}");
                None
            }
            Err(e) => return Err(e),
        };

        let dataset = match LabeledTable::load(&settings.paths.dataset, &settings.gray_zone) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("dataset unavailable: {e}");
                None
            }
        };

        Ok(Self::new(model, dataset, settings.ranges))
    }

    /// True once both the scaler and the classifier are loaded.
    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&ModelBundle> {
        self.model.as_ref()
    }

    pub fn dataset(&self) -> Option<&LabeledTable> {
        self.dataset.as_ref()
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: if self.is_ready() { "healthy" } else { "unhealthy" },
            model_loaded: self.is_ready(),
            scaler_loaded: self.is_ready(),
            dataset_rows: self.dataset.as_ref().map_or(0, LabeledTable::len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub model_loaded: bool,
    pub scaler_loaded: bool,
    pub dataset_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub quality: Category,
    pub score: u8,
    /// Highest class probability, in percent.
    pub confidence: f64,
    pub icon: &'static str,
    /// Percent per category.
    pub probabilities: BTreeMap<Category, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub prediction: PredictionSummary,
    pub input: Reading,
    pub feedback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionResponse {
    pub success: bool,
    pub error: String,
    pub validation_errors: Vec<FieldError>,
    pub valid_ranges: BTreeMap<&'static str, RangeDescription>,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    ctx: Arc<ServiceContext>,
}

impl Gateway {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// Run a JSON request body through the full pipeline.
    pub fn predict(&self, body: &Value) -> Result<PredictionResponse> {
        let bundle = self.ctx.model().ok_or(AirQualityError::Unavailable)?;
        let reading = parse_reading(body)?;
        self.run(bundle, reading)
    }

    fn run(&self, bundle: &ModelBundle, reading: Reading) -> Result<PredictionResponse> {
        debug!(?reading, "received");
        let errors = self.ctx.ranges().validate(&reading);
        if !errors.is_empty() {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            info!(?fields, "rejected out-of-range input");
            return Err(AirQualityError::Validation(errors));
        }

        let scaled = bundle.scaler.transform(&reading.to_vector());
        debug!(?scaled, "scaled");

        let probabilities = bundle
            .classifier
            .predict_proba(&scaled)
            .map_err(|e| match e {
                AirQualityError::PredictionFailure(_) => e,
                other => AirQualityError::PredictionFailure(other.to_string()),
            })?;
        let (quality, _) = probabilities.top();
        debug!(%quality, "predicted");

        Ok(explain(reading, quality, &probabilities, self.ctx.ranges()))
    }

    /// Client-facing body for a rejected request.
    pub fn rejection(&self, errors: Vec<FieldError>) -> RejectionResponse {
        let malformed = errors.iter().any(|e| e.value.is_none());
        RejectionResponse {
            success: false,
            error: if malformed {
                "Invalid input".to_string()
            } else {
                "Input outside the valid range".to_string()
            },
            validation_errors: errors,
            valid_ranges: self.ctx.ranges().describe(),
        }
    }
}

/// Pull the four features out of a JSON object. Numeric strings are
/// accepted; every missing or non-numeric field is reported.
pub fn parse_reading(body: &Value) -> Result<Reading> {
    let Some(object) = body.as_object() else {
        return Err(AirQualityError::Validation(vec![malformed(
            "body",
            "Request",
            "Request body must be a JSON object".to_string(),
        )]));
    };

    let mut values = [0.0; FEATURE_COUNT];
    let mut errors = Vec::new();
    for feature in Feature::ALL {
        let key = feature.key();
        let parsed = match object.get(key) {
            None | Some(Value::Null) => Err(format!("Field '{key}' is required")),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| format!("Field '{key}' must be a number")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Field '{key}' must be a number, got \"{s}\"")),
            Some(_) => Err(format!("Field '{key}' must be a number")),
        };
        match parsed {
            Ok(v) => values[feature.index()] = v,
            Err(message) => errors.push(malformed(key, feature.label(), message)),
        }
    }

    if errors.is_empty() {
        Ok(Reading::from_vector(values))
    } else {
        Err(AirQualityError::Validation(errors))
    }
}

fn malformed(field: &str, label: &str, message: String) -> FieldError {
    FieldError {
        field: field.to_string(),
        label: label.to_string(),
        message,
        min: None,
        max: None,
        value: None,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn feature_feedback(feature: Feature, in_range: bool) -> &'static str {
    match (feature, in_range) {
        (Feature::Temperature, true) => "✓ Temperature is within the normal range for Beijing",
        (Feature::Temperature, false) => "✗ Temperature is outside the normal range of the dataset",
        (Feature::DewPoint, true) => "✓ Dew point (humidity) is within the normal range",
        (Feature::DewPoint, false) => "✗ Dew point is outside the normal range of the dataset",
        (Feature::Pressure, true) => "✓ Air pressure is within the normal range",
        (Feature::Pressure, false) => "✗ Air pressure is outside the normal range of the dataset",
        (Feature::WindSpeed, true) => "✓ Wind speed is within the normal range",
        (Feature::WindSpeed, false) => "✗ Wind speed is outside the normal range of the dataset",
    }
}

/// One line per feature followed by one line for the category.
pub fn feedback(reading: &Reading, quality: Category, ranges: &RangeTable) -> Vec<String> {
    let mut lines: Vec<String> = Feature::ALL
        .iter()
        .map(|&f| feature_feedback(f, ranges.contains(f, reading.get(f))).to_string())
        .collect();
    lines.push(quality.feedback().to_string());
    lines
}

fn explain(
    reading: Reading,
    quality: Category,
    probabilities: &Probabilities,
    ranges: &RangeTable,
) -> PredictionResponse {
    let percentages = Category::ALL
        .iter()
        .map(|&c| (c, round2(probabilities.get(c) * 100.0)))
        .collect();
    PredictionResponse {
        success: true,
        prediction: PredictionSummary {
            quality,
            score: quality.score(),
            confidence: round2(probabilities.get(quality) * 100.0),
            icon: quality.icon(),
            probabilities: percentages,
        },
        input: reading,
        feedback: feedback(&reading, quality, ranges),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unavailable_gateway() -> Gateway {
        Gateway::new(Arc::new(ServiceContext::new(None, None, RangeTable::default())))
    }

    #[test]
    fn test_unavailable_short_circuits_before_validation() {
        let gateway = unavailable_gateway();
        assert!(!gateway.context().is_ready());
        let err = gateway.predict(&json!({"suhu": 999})).unwrap_err();
        assert!(matches!(err, AirQualityError::Unavailable));
        let err = gateway.predict(&json!("not an object")).unwrap_err();
        assert!(matches!(err, AirQualityError::Unavailable));
    }

    #[test]
    fn test_parse_collects_malformed_fields() {
        let err = parse_reading(&json!({"suhu": "hot", "tekanan": 1015, "kecepatan_angin": "3"}))
            .unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.clone()).collect();
        assert_eq!(fields, vec!["suhu", "kelembapan"]);
        assert!(err.field_errors()[1].message.contains("required"));
    }

    #[test]
    fn test_parse_accepts_numeric_strings() {
        let reading = parse_reading(
            &json!({"suhu": "25.5", "kelembapan": 10, "tekanan": 1015.0, "kecepatan_angin": 3}),
        )
        .unwrap();
        assert_eq!(reading.to_vector(), [25.5, 10.0, 1015.0, 3.0]);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = parse_reading(&json!([1, 2, 3, 4])).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "body");
    }

    #[test]
    fn test_feedback_has_one_line_per_feature_plus_category() {
        let reading = Reading::from_vector([25.0, 10.0, 1015.0, 3.0]);
        let lines = feedback(&reading, Category::Moderate, &RangeTable::default());
        assert_eq!(lines.len(), 5);
        assert!(lines[..4].iter().all(|l| l.starts_with('✓')));
        assert_eq!(lines[4], Category::Moderate.feedback());
    }

    #[test]
    fn test_explain_rounds_and_picks_confidence() {
        let reading = Reading::from_vector([25.0, 10.0, 1015.0, 3.0]);
        let probs = Probabilities([0.123456, 0.654321, 0.222223]);
        let response = explain(reading, Category::Moderate, &probs, &RangeTable::default());
        assert_eq!(response.prediction.confidence, 65.43);
        assert_eq!(response.prediction.score, 60);
        assert_eq!(response.prediction.probabilities[&Category::Good], 12.35);
        let total: f64 = response.prediction.probabilities.values().sum();
        assert!((total - 100.0).abs() <= 0.01 + 1e-9);
    }

    #[test]
    fn test_rejection_lists_ranges() {
        let body = unavailable_gateway().rejection(vec![]);
        assert!(!body.success);
        assert_eq!(body.valid_ranges.len(), 4);
        assert_eq!(body.valid_ranges["tekanan"].min, 990.0);
    }

    #[test]
    fn test_health_without_model() {
        let health = unavailable_gateway().context().health();
        assert_eq!(health.status, "unhealthy");
        assert!(!health.model_loaded);
        assert_eq!(health.dataset_rows, 0);
    }
}
