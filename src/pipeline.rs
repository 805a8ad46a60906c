//! Offline pipelines: prepare, train, evaluate.
//!
//! Training order is fixed: label, split, fit the scaler on the training
//! partition, transform both partitions, balance the training partition,
//! fit, evaluate on the untouched test partition, persist. The test score is
//! reported, never used to block persistence.

use std::path::Path;
use tracing::{info, warn};

use crate::artifacts::{self, ModelBundle};
use crate::balancer::Smote;
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::dataset::{self, LabeledTable};
use crate::error::Result;
use crate::features::{Feature, FeatureVector, RangeTable};
use crate::metrics::EvaluationReport;
use crate::quality::{Category, GrayZone};
use crate::scaler::MinMaxScaler;
use crate::split::{self, SplitIndices};

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareReport {
    pub rows_read: usize,
    pub incomplete: usize,
    pub written: usize,
}

/// Turn a raw export into the labeled dataset.
pub fn prepare(input: &Path, output: &Path, gray_zone: &GrayZone) -> Result<PrepareReport> {
    let raw = dataset::load_records(input)?;
    let table = LabeledTable::from_records(&raw.records, gray_zone);
    dataset::write_prepared(output, &table)?;
    info!("prepared {} labeled rows into {}", table.len(), output.display());
    Ok(PrepareReport {
        rows_read: raw.records.len() + raw.dropped,
        incomplete: raw.dropped,
        written: table.len(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub labeled_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub balanced_rows: usize,
    pub evaluation: EvaluationReport,
    pub run_tag: String,
}

/// Partitioned features and labels, before scaling.
struct Partitions {
    train_x: Vec<FeatureVector>,
    train_y: Vec<Category>,
    test_x: Vec<FeatureVector>,
    test_y: Vec<Category>,
}

fn partition(table: &LabeledTable, settings: &Settings) -> Partitions {
    let features = table.features();
    let labels = table.labels();
    let SplitIndices { train, test } =
        split::stratified_split(&labels, settings.training.test_ratio, settings.training.seed);
    Partitions {
        train_x: split::take(&features, &train),
        train_y: split::take(&labels, &train),
        test_x: split::take(&features, &test),
        test_y: split::take(&labels, &test),
    }
}

/// Log observed extremes next to the configured range table.
fn describe(table: &LabeledTable, ranges: &RangeTable) {
    let counts = table.counts();
    for category in Category::ALL {
        info!("  {:<9} {}", category.name(), counts[category.index()]);
    }
    let extremes = table.extremes();
    for feature in Feature::ALL {
        let (lo, hi) = extremes[feature.index()];
        let bounds = ranges.get(feature);
        info!(
            "  {:<16} observed {lo}..{hi}, accepted {}..{}",
            feature.key(),
            bounds.min,
            bounds.max
        );
        if lo < bounds.min || hi > bounds.max {
            warn!(
                "{} observed range exceeds the accepted range table",
                feature.key()
            );
        }
    }
}

/// Load the configured dataset and run the full training pipeline.
pub fn train(settings: &Settings) -> Result<TrainingReport> {
    let table = LabeledTable::load(&settings.paths.dataset, &settings.gray_zone)?;
    train_on_table(&table, settings)
}

pub fn train_on_table(table: &LabeledTable, settings: &Settings) -> Result<TrainingReport> {
    info!("labeled rows: {}", table.len());
    describe(table, &settings.ranges);

    let parts = partition(table, settings);
    info!(
        "split: {} training rows, {} test rows (seed {})",
        parts.train_x.len(),
        parts.test_x.len(),
        settings.training.seed
    );

    let scaler = MinMaxScaler::fit(&parts.train_x)?;
    let train_scaled = scaler.transform_all(&parts.train_x);
    let test_scaled = scaler.transform_all(&parts.test_x);

    let smote = Smote::new(settings.training.neighbors, settings.training.seed);
    let (balanced_x, balanced_y) = smote.resample(&train_scaled, &parts.train_y)?;

    let classifier = Classifier::fit(&balanced_x, &balanced_y, &settings.forest)?;

    let predicted = classifier.predict_batch(&test_scaled)?;
    let evaluation = EvaluationReport::compute(&parts.test_y, &predicted);
    info!(
        "held-out accuracy: {:.4} ({:.2}%)",
        evaluation.accuracy,
        evaluation.accuracy * 100.0
    );

    let run_tag = artifacts::save(
        &settings.paths.artifact_dir,
        &scaler,
        &classifier,
        &settings.ranges,
    )?;

    Ok(TrainingReport {
        labeled_rows: table.len(),
        train_rows: parts.train_x.len(),
        test_rows: parts.test_x.len(),
        balanced_rows: balanced_x.len(),
        evaluation,
        run_tag,
    })
}

/// Score persisted artifacts against the same held-out partition that
/// training used.
pub fn evaluate(settings: &Settings) -> Result<EvaluationReport> {
    let bundle = artifacts::load(&settings.paths.artifact_dir)?;
    let table = LabeledTable::load(&settings.paths.dataset, &settings.gray_zone)?;
    evaluate_bundle(&bundle, &table, settings)
}

pub fn evaluate_bundle(
    bundle: &ModelBundle,
    table: &LabeledTable,
    settings: &Settings,
) -> Result<EvaluationReport> {
    let parts = partition(table, settings);
    let test_scaled = bundle.scaler.transform_all(&parts.test_x);
    let predicted = bundle.classifier.predict_batch(&test_scaled)?;
    Ok(EvaluationReport::compute(&parts.test_y, &predicted))
}
