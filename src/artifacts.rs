//! Scaler and classifier persistence.
//!
//! Each artifact is a JSON envelope carrying a format version and the run
//! tag of the training run that produced it. The run tag is the BLAKE3 digest
//! of both payloads, so a scaler and a classifier load together only if they
//! came out of the same run.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::error::{AirQualityError, Result};
use crate::features::RangeTable;
use crate::scaler::MinMaxScaler;

pub const FORMAT_VERSION: u32 = 1;
pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";

const SCALER_KIND: &str = "min_max_scaler";
const MODEL_KIND: &str = "ovr_gbdt_classifier";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    run_tag: String,
    created_at: DateTime<Utc>,
    /// Range table in force when the run was trained.
    ranges: RangeTable,
    payload: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub scaler: PathBuf,
    pub model: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            scaler: dir.join(SCALER_FILE),
            model: dir.join(MODEL_FILE),
        }
    }

    pub fn exist(&self) -> bool {
        self.scaler.is_file() && self.model.is_file()
    }
}

/// A scaler and classifier from the same training run.
#[derive(Debug)]
pub struct ModelBundle {
    pub scaler: MinMaxScaler,
    pub classifier: Classifier,
    pub run_tag: String,
    pub created_at: DateTime<Utc>,
    pub ranges: RangeTable,
}

/// Hex BLAKE3 digest over the serialized payloads of one run.
pub fn run_tag(scaler_json: &str, model_json: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(scaler_json.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(model_json.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Leading characters of a run tag, for log lines.
pub fn short_tag(tag: &str) -> &str {
    tag.get(..12).unwrap_or(tag)
}

fn is_well_formed_tag(tag: &str) -> bool {
    tag.len() == 64 && tag.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Write both artifacts into `dir`, returning the run tag.
pub fn save<P: AsRef<Path>>(
    dir: P,
    scaler: &MinMaxScaler,
    classifier: &Classifier,
    ranges: &RangeTable,
) -> Result<String> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let paths = ArtifactPaths::in_dir(dir);

    let scaler_json = serde_json::to_string(scaler)?;
    let model_json = serde_json::to_string(classifier)?;
    let tag = run_tag(&scaler_json, &model_json);
    let created_at = Utc::now();

    write_envelope(&paths.scaler, SCALER_KIND, &tag, created_at, ranges, scaler)?;
    write_envelope(&paths.model, MODEL_KIND, &tag, created_at, ranges, classifier)?;
    info!(
        "saved artifacts to {} (run {})",
        dir.display(),
        short_tag(&tag)
    );
    Ok(tag)
}

fn write_envelope<T: Serialize>(
    path: &Path,
    kind: &str,
    tag: &str,
    created_at: DateTime<Utc>,
    ranges: &RangeTable,
    payload: &T,
) -> Result<()> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        kind: kind.to_string(),
        run_tag: tag.to_string(),
        created_at,
        ranges: *ranges,
        payload,
    };
    // Write then rename so a reader never sees a half-written artifact.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_envelope<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<Envelope<T>> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AirQualityError::DataUnavailable(format!(
            "{} not found, run the training pipeline first",
            path.display()
        )),
        _ => AirQualityError::DataUnavailable(format!("cannot read {}: {e}", path.display())),
    })?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
        AirQualityError::DataUnavailable(format!("corrupt artifact {}: {e}", path.display()))
    })?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(AirQualityError::ArtifactMismatch(format!(
            "{} has format version {}, expected {}",
            path.display(),
            envelope.format_version,
            FORMAT_VERSION
        )));
    }
    if !is_well_formed_tag(&envelope.run_tag) {
        return Err(AirQualityError::ArtifactMismatch(format!(
            "{} carries a malformed run tag {:?}",
            path.display(),
            envelope.run_tag
        )));
    }
    if envelope.kind != kind {
        return Err(AirQualityError::ArtifactMismatch(format!(
            "{} holds a {}, expected a {}",
            path.display(),
            envelope.kind,
            kind
        )));
    }
    Ok(envelope)
}

/// Load the artifact pair from `dir`.
///
/// Missing or unreadable files are `DataUnavailable`; files from different
/// runs or formats are `ArtifactMismatch`.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<ModelBundle> {
    let paths = ArtifactPaths::in_dir(dir);
    let scaler: Envelope<MinMaxScaler> = read_envelope(&paths.scaler, SCALER_KIND)?;
    let model: Envelope<Classifier> = read_envelope(&paths.model, MODEL_KIND)?;

    if scaler.run_tag != model.run_tag {
        return Err(AirQualityError::ArtifactMismatch(format!(
            "scaler is from run {} but classifier is from run {}",
            scaler.run_tag, model.run_tag
        )));
    }
    if scaler.ranges != model.ranges {
        warn!("scaler and classifier recorded different range tables");
    }

    Ok(ModelBundle {
        scaler: scaler.payload,
        classifier: model.payload,
        run_tag: model.run_tag,
        created_at: model.created_at,
        ranges: model.ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ForestParams, MaxFeatures};
    use crate::quality::Category;
    use tempfile::tempdir;

    fn fitted() -> (MinMaxScaler, Classifier) {
        let rows: Vec<_> = (0..30)
            .map(|i| {
                let t = i as f64 / 30.0;
                [t, 1.0 - t, t * 0.5, 0.3]
            })
            .collect();
        let labels: Vec<_> = (0..30)
            .map(|i| Category::ALL[i / 10])
            .collect();
        let scaler = MinMaxScaler::fit(&rows).unwrap();
        let params = ForestParams {
            trees: 5,
            max_depth: 3,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            jobs: 1,
            ..ForestParams::default()
        };
        let classifier = Classifier::fit(&scaler.transform_all(&rows), &labels, &params).unwrap();
        (scaler, classifier)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let (scaler, classifier) = fitted();
        let tag = save(dir.path(), &scaler, &classifier, &RangeTable::default()).unwrap();
        assert_eq!(tag.len(), 64);
        assert!(ArtifactPaths::in_dir(dir.path()).exist());

        let bundle = load(dir.path()).unwrap();
        assert_eq!(bundle.run_tag, tag);
        assert_eq!(bundle.scaler, scaler);
        assert_eq!(bundle.ranges, RangeTable::default());
        let probe = [0.5, 0.5, 0.25, 0.3];
        assert_eq!(
            bundle.classifier.predict(&probe).unwrap(),
            classifier.predict(&probe).unwrap()
        );
    }

    #[test]
    fn test_missing_artifacts_are_unavailable() {
        let dir = tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, AirQualityError::DataUnavailable(_)));
    }

    #[test]
    fn test_mixed_runs_are_rejected() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let (scaler, classifier) = fitted();
        save(first.path(), &scaler, &classifier, &RangeTable::default()).unwrap();

        let mut other_scaler = scaler.clone();
        other_scaler.max[0] += 1.0;
        save(second.path(), &other_scaler, &classifier, &RangeTable::default()).unwrap();

        fs::copy(
            second.path().join(SCALER_FILE),
            first.path().join(SCALER_FILE),
        )
        .unwrap();
        let err = load(first.path()).unwrap_err();
        assert!(matches!(err, AirQualityError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_corrupt_artifact_is_unavailable() {
        let dir = tempdir().unwrap();
        let (scaler, classifier) = fitted();
        save(dir.path(), &scaler, &classifier, &RangeTable::default()).unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"{not json").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, AirQualityError::DataUnavailable(_)));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let dir = tempdir().unwrap();
        let (scaler, classifier) = fitted();
        save(dir.path(), &scaler, &classifier, &RangeTable::default()).unwrap();
        let scaler_path = dir.path().join(SCALER_FILE);
        let bytes = fs::read(&scaler_path).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["kind"] = serde_json::json!(MODEL_KIND);
        fs::write(&scaler_path, serde_json::to_vec(&envelope).unwrap()).unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, AirQualityError::ArtifactMismatch(_)));
    }

    fn rewrite_tag(path: &Path, tag: &str) {
        let bytes = fs::read(path).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["run_tag"] = serde_json::json!(tag);
        fs::write(path, serde_json::to_vec(&envelope).unwrap()).unwrap();
    }

    #[test]
    fn test_malformed_run_tag_is_rejected() {
        let dir = tempdir().unwrap();
        let (scaler, classifier) = fitted();
        save(dir.path(), &scaler, &classifier, &RangeTable::default()).unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        // Matching but truncated tags on both files.
        rewrite_tag(&paths.scaler, "abc");
        rewrite_tag(&paths.model, "abc");
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, AirQualityError::ArtifactMismatch(_)));

        let not_hex = "z".repeat(64);
        rewrite_tag(&paths.scaler, &not_hex);
        rewrite_tag(&paths.model, &not_hex);
        assert!(matches!(
            load(dir.path()),
            Err(AirQualityError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_short_tag() {
        assert_eq!(short_tag("abc"), "abc");
        assert_eq!(short_tag(&"f".repeat(64)), "ffffffffffff");
    }
}
