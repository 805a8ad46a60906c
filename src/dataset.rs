//! CSV dataset loading, labeling and summary statistics.
//!
//! The loader accepts both the raw Beijing export (`TEMP`, `DEWP`, `PRES`,
//! `WSPM`, `PM2.5`) and the prepared dataset written by [`write_prepared`].
//! Rows with a missing or non-numeric value in any used column are dropped.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{AirQualityError, Result};
use crate::features::{Feature, FeatureVector, Reading, FEATURE_COUNT};
use crate::quality::{Category, GrayZone, CATEGORY_COUNT};

const POLLUTANT_COLUMNS: [&str; 3] = ["PM2.5", "pm25", "pm2_5"];
const LABEL_COLUMN: &str = "kualitas_udara";

/// One complete row: the four weather features plus PM2.5.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub features: FeatureVector,
    pub pm25: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledRecord {
    pub features: FeatureVector,
    pub pm25: f64,
    pub category: Category,
}

impl LabeledRecord {
    pub fn from_record(record: Record) -> Self {
        Self {
            features: record.features,
            pm25: record.pm25,
            category: Category::from_concentration(record.pm25),
        }
    }
}

/// Rows read from a CSV file, with the number of incomplete rows discarded.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub records: Vec<Record>,
    pub dropped: usize,
    /// Kept rows whose `kualitas_udara` cell disagrees with the label
    /// derived from PM2.5. Always 0 for files without that column.
    pub label_conflicts: usize,
}

/// Read a dataset from `path`, dropping rows with missing values.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<RawDataset> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        AirQualityError::DataUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AirQualityError::DataUnavailable(format!("{}: {e}", path.display())))?
        .clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };

    let mut feature_cols = [0usize; FEATURE_COUNT];
    for feature in Feature::ALL {
        let aliases = [feature.raw_column(), feature.key()];
        feature_cols[feature.index()] = find(&aliases).ok_or_else(|| {
            AirQualityError::DataUnavailable(format!(
                "{}: missing column {} (or {})",
                path.display(),
                feature.raw_column(),
                feature.key()
            ))
        })?;
    }
    let pollutant_col = find(&POLLUTANT_COLUMNS).ok_or_else(|| {
        AirQualityError::DataUnavailable(format!("{}: missing PM2.5 column", path.display()))
    })?;

    let label_col = find(&[LABEL_COLUMN]);

    let mut records = Vec::new();
    let mut dropped = 0usize;
    let mut label_conflicts = 0usize;
    for row in reader.records() {
        let row = row
            .map_err(|e| AirQualityError::DataUnavailable(format!("{}: {e}", path.display())))?;
        let cell = |idx: usize| row.get(idx).and_then(parse_cell);

        let mut features = [0.0; FEATURE_COUNT];
        let mut complete = true;
        for (slot, &col) in features.iter_mut().zip(feature_cols.iter()) {
            match cell(col) {
                Some(v) => *slot = v,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        match (complete, cell(pollutant_col)) {
            (true, Some(pm25)) => {
                if let Some(col) = label_col {
                    let stored = row.get(col).and_then(Category::parse);
                    if stored != Some(Category::from_concentration(pm25)) {
                        label_conflicts += 1;
                    }
                }
                records.push(Record { features, pm25 });
            }
            _ => dropped += 1,
        }
    }

    if records.is_empty() {
        return Err(AirQualityError::DataUnavailable(format!(
            "{}: no complete rows",
            path.display()
        )));
    }
    info!(
        "loaded {} rows from {} ({} incomplete rows dropped)",
        records.len(),
        path.display(),
        dropped
    );
    if label_conflicts > 0 {
        warn!(
            "{}: {} rows have a {} label that disagrees with PM2.5; using the derived label",
            path.display(),
            label_conflicts,
            LABEL_COLUMN
        );
    }
    Ok(RawDataset {
        records,
        dropped,
        label_conflicts,
    })
}

/// Missing markers (`NA`, empty, …) and non-numeric cells are all `None`.
fn parse_cell(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Labeled records, optionally with the gray zone removed.
#[derive(Debug, Clone, Default)]
pub struct LabeledTable {
    pub records: Vec<LabeledRecord>,
}

impl LabeledTable {
    pub fn from_records(records: &[Record], gray_zone: &GrayZone) -> Self {
        let total = records.len();
        let records: Vec<_> = records
            .iter()
            .filter(|r| !gray_zone.excludes(r.pm25))
            .map(|&r| LabeledRecord::from_record(r))
            .collect();
        if gray_zone.enabled {
            info!(
                "gray zone removed {} of {} rows",
                total - records.len(),
                total
            );
        }
        Self { records }
    }

    /// Load and label in one step.
    pub fn load<P: AsRef<Path>>(path: P, gray_zone: &GrayZone) -> Result<Self> {
        let raw = load_records(path)?;
        Ok(Self::from_records(&raw.records, gray_zone))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Feature vectors only. PM2.5 is never part of the model input.
    pub fn features(&self) -> Vec<FeatureVector> {
        self.records.iter().map(|r| r.features).collect()
    }

    pub fn labels(&self) -> Vec<Category> {
        self.records.iter().map(|r| r.category).collect()
    }

    pub fn counts(&self) -> [usize; CATEGORY_COUNT] {
        category_counts(self.records.iter().map(|r| r.category))
    }

    /// Per-feature observed (min, max).
    pub fn extremes(&self) -> [(f64, f64); FEATURE_COUNT] {
        let mut out = [(f64::INFINITY, f64::NEG_INFINITY); FEATURE_COUNT];
        for record in &self.records {
            for (slot, &v) in out.iter_mut().zip(record.features.iter()) {
                slot.0 = slot.0.min(v);
                slot.1 = slot.1.max(v);
            }
        }
        out
    }

    pub fn stats(&self) -> DatasetStats {
        let n = self.records.len();
        let extremes = self.extremes();
        let mut sums = [0.0; FEATURE_COUNT];
        for record in &self.records {
            for (sum, v) in sums.iter_mut().zip(record.features.iter()) {
                *sum += v;
            }
        }
        let ranges = Feature::ALL
            .iter()
            .map(|&f| {
                let (min, max) = extremes[f.index()];
                let mean = if n == 0 { 0.0 } else { sums[f.index()] / n as f64 };
                (f.key(), FeatureStats { min, max, mean })
            })
            .collect();
        let counts = self.counts();
        let distribution = Category::ALL
            .iter()
            .map(|&c| (c, counts[c.index()]))
            .collect();
        DatasetStats {
            total: n,
            distribution,
            ranges,
        }
    }

    /// Up to `per_category` random records of each category.
    pub fn sample<R: Rng + ?Sized>(&self, per_category: usize, rng: &mut R) -> Vec<SampleRow> {
        let mut out = Vec::new();
        for category in Category::ALL {
            let members: Vec<&LabeledRecord> = self
                .records
                .iter()
                .filter(|r| r.category == category)
                .collect();
            out.extend(
                members
                    .choose_multiple(rng, per_category)
                    .map(|r| SampleRow::from(**r)),
            );
        }
        out
    }
}

pub fn category_counts<I: IntoIterator<Item = Category>>(labels: I) -> [usize; CATEGORY_COUNT] {
    let mut counts = [0usize; CATEGORY_COUNT];
    for c in labels {
        counts[c.index()] += 1;
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total: usize,
    pub distribution: BTreeMap<Category, usize>,
    pub ranges: BTreeMap<&'static str, FeatureStats>,
}

/// A dataset row as exposed by `/sample`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleRow {
    #[serde(flatten)]
    pub reading: Reading,
    pub pm25: f64,
    #[serde(rename = "kualitas_udara")]
    pub category: Category,
}

impl From<LabeledRecord> for SampleRow {
    fn from(r: LabeledRecord) -> Self {
        Self {
            reading: Reading::from_vector(r.features),
            pm25: r.pm25,
            category: r.category,
        }
    }
}

/// Write the prepared dataset consumed by training and `/stats`.
pub fn write_prepared<P: AsRef<Path>>(path: P, table: &LabeledTable) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = Feature::ALL.iter().map(|f| f.key()).collect();
    header.push(POLLUTANT_COLUMNS[1]);
    header.push(LABEL_COLUMN);
    writer.write_record(&header)?;

    for record in &table.records {
        let mut row: Vec<String> = record.features.iter().map(|v| v.to_string()).collect();
        row.push(record.pm25.to_string());
        row.push(record.category.name().to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    debug!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}
