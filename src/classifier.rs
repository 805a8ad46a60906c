//! Tree-ensemble classifier over scaled feature vectors.
//!
//! One gradient-boosted ensemble is fitted per category (one vs rest),
//! regressing the 0/1 category indicator, so each ensemble estimates the
//! probability of its category. The three estimates are clipped to [0, 1]
//! and normalized into a distribution. The ensembles are fitted in parallel
//! on a bounded pool.

use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::dataset::category_counts;
use crate::error::{AirQualityError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::quality::{Category, CATEGORY_COUNT};

/// Share of features each tree may look at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Fraction(f64),
}

impl MaxFeatures {
    pub fn ratio(self, n_features: usize) -> f64 {
        let n = n_features.max(1) as f64;
        match self {
            MaxFeatures::Sqrt => n.sqrt().floor().max(1.0) / n,
            MaxFeatures::Log2 => n.log2().floor().max(1.0) / n,
            MaxFeatures::All => 1.0,
            MaxFeatures::Fraction(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Weight each sample by `n / (categories * n_category)`.
    Balanced,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Boosting rounds per category ensemble.
    pub trees: usize,
    pub max_depth: u32,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub learning_rate: f32,
    /// Row subsampling ratio per tree.
    pub sample_ratio: f64,
    /// Worker threads for fitting, 0 uses every core.
    pub jobs: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            max_depth: 15,
            min_samples_leaf: 4,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            learning_rate: 0.1,
            sample_ratio: 1.0,
            jobs: 2,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        let unit = |v: f64| v > 0.0 && v <= 1.0;
        if self.trees == 0 || self.max_depth == 0 || self.min_samples_leaf == 0 {
            return Err(AirQualityError::Config(
                "forest.trees, forest.max_depth and forest.min_samples_leaf must be positive"
                    .into(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(AirQualityError::Config(
                "forest.learning_rate must be positive".into(),
            ));
        }
        if !unit(self.sample_ratio) || !unit(self.max_features.ratio(FEATURE_COUNT)) {
            return Err(AirQualityError::Config(
                "forest.sample_ratio and forest.max_features must lie in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    fn gbdt_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.set_feature_size(FEATURE_COUNT);
        cfg.set_max_depth(self.max_depth);
        cfg.set_iterations(self.trees);
        cfg.set_shrinkage(self.learning_rate);
        cfg.set_loss("SquaredError");
        cfg.set_min_leaf_size(self.min_samples_leaf);
        cfg.set_feature_sample_ratio(self.max_features.ratio(FEATURE_COUNT));
        cfg.set_data_sample_ratio(self.sample_ratio);
        cfg.set_training_optimization_level(2);
        cfg.set_debug(false);
        cfg
    }
}

/// Distribution over the three categories, indexed by `Category::index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probabilities(pub [f64; CATEGORY_COUNT]);

impl Probabilities {
    pub fn get(&self, category: Category) -> f64 {
        self.0[category.index()]
    }

    /// Most likely category; ties go to the earlier category.
    pub fn top(&self) -> (Category, f64) {
        let mut best = (Category::Good, self.0[0]);
        for category in Category::ALL.iter().skip(1) {
            let p = self.get(*category);
            if p > best.1 {
                best = (*category, p);
            }
        }
        best
    }

    /// When every estimate clips to zero the highest raw score takes all
    /// the mass.
    fn from_scores(scores: [f64; CATEGORY_COUNT]) -> Result<Self> {
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(AirQualityError::PredictionFailure(format!(
                "ensemble produced non-finite scores: {scores:?}"
            )));
        }
        let clipped = scores.map(|s| s.clamp(0.0, 1.0));
        let total: f64 = clipped.iter().sum();
        if total > 0.0 {
            return Ok(Self(clipped.map(|s| s / total)));
        }
        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        let mut one_hot = [0.0; CATEGORY_COUNT];
        one_hot[best] = 1.0;
        Ok(Self(one_hot))
    }
}

#[derive(Serialize, Deserialize)]
pub struct Classifier {
    /// One ensemble per category, in `Category::ALL` order.
    members: Vec<GBDT>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("members", &self.members.len())
            .finish()
    }
}

impl Classifier {
    pub fn fit(rows: &[FeatureVector], labels: &[Category], params: &ForestParams) -> Result<Self> {
        params.validate()?;
        if rows.len() != labels.len() {
            return Err(AirQualityError::Config(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let counts = category_counts(labels.iter().copied());
        for category in Category::ALL {
            if counts[category.index()] == 0 {
                return Err(AirQualityError::InsufficientSamples {
                    category: category.name().to_string(),
                    found: 0,
                    required: 1,
                });
            }
        }

        let weights = class_weights(&counts, params.class_weight);
        let features: Vec<Vec<f32>> = rows.iter().map(to_f32).collect();
        let cfg = params.gbdt_config();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.jobs)
            .build()
            .map_err(|e| AirQualityError::Config(format!("cannot start fitting pool: {e}")))?;

        info!(
            "fitting {} one-vs-rest ensembles on {} rows ({} trees, depth {}, {} threads)",
            CATEGORY_COUNT,
            rows.len(),
            params.trees,
            params.max_depth,
            pool.current_num_threads()
        );
        let members = pool.install(|| {
            Category::ALL
                .par_iter()
                .map(|&target| {
                    let mut data: DataVec = features
                        .iter()
                        .zip(labels)
                        .map(|(x, &l)| {
                            let label = if l == target { 1.0 } else { 0.0 };
                            Data::new_training_data(x.clone(), weights[l.index()], label, None)
                        })
                        .collect();
                    let mut model = GBDT::new(&cfg);
                    model.fit(&mut data);
                    debug!("fitted ensemble for {}", target);
                    model
                })
                .collect::<Vec<_>>()
        });

        Ok(Self { members })
    }

    pub fn predict_proba(&self, row: &FeatureVector) -> Result<Probabilities> {
        self.predict_proba_batch(std::slice::from_ref(row))?
            .pop()
            .ok_or_else(|| AirQualityError::PredictionFailure("empty prediction".into()))
    }

    pub fn predict(&self, row: &FeatureVector) -> Result<Category> {
        Ok(self.predict_proba(row)?.top().0)
    }

    pub fn predict_proba_batch(&self, rows: &[FeatureVector]) -> Result<Vec<Probabilities>> {
        if self.members.len() != CATEGORY_COUNT {
            return Err(AirQualityError::PredictionFailure(format!(
                "classifier has {} ensembles, expected {}",
                self.members.len(),
                CATEGORY_COUNT
            )));
        }
        let data: DataVec = rows
            .iter()
            .map(|r| Data::new_test_data(to_f32(r), None))
            .collect();
        let scores: Vec<Vec<f32>> = self.members.iter().map(|m| m.predict(&data)).collect();
        if scores.iter().any(|s| s.len() != rows.len()) {
            return Err(AirQualityError::PredictionFailure(
                "ensemble returned the wrong number of scores".into(),
            ));
        }

        (0..rows.len())
            .map(|i| Probabilities::from_scores(std::array::from_fn(|c| scores[c][i] as f64)))
            .collect()
    }

    pub fn predict_batch(&self, rows: &[FeatureVector]) -> Result<Vec<Category>> {
        Ok(self
            .predict_proba_batch(rows)?
            .iter()
            .map(|p| p.top().0)
            .collect())
    }
}

fn to_f32(row: &FeatureVector) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

fn class_weights(counts: &[usize; CATEGORY_COUNT], strategy: ClassWeight) -> [f32; CATEGORY_COUNT] {
    match strategy {
        ClassWeight::Uniform => [1.0; CATEGORY_COUNT],
        ClassWeight::Balanced => {
            let total: usize = counts.iter().sum();
            counts.map(|n| {
                if n == 0 {
                    0.0
                } else {
                    (total as f64 / (CATEGORY_COUNT as f64 * n as f64)) as f32
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ForestParams {
        ForestParams {
            trees: 20,
            max_depth: 4,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            jobs: 1,
            ..ForestParams::default()
        }
    }

    /// Three well separated clusters along the first feature.
    fn clusters() -> (Vec<FeatureVector>, Vec<Category>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let jitter = (i % 10) as f64 * 0.01;
            rows.push([0.1 + jitter, 0.5, 0.5, 0.5]);
            labels.push(Category::Good);
            rows.push([0.5 + jitter, 0.5, 0.5, 0.5]);
            labels.push(Category::Moderate);
            rows.push([0.9 - jitter, 0.5, 0.5, 0.5]);
            labels.push(Category::Bad);
        }
        (rows, labels)
    }

    #[test]
    fn test_max_features_ratio() {
        assert_eq!(MaxFeatures::Sqrt.ratio(4), 0.5);
        assert_eq!(MaxFeatures::Log2.ratio(4), 0.5);
        assert_eq!(MaxFeatures::All.ratio(4), 1.0);
        assert_eq!(MaxFeatures::Fraction(0.75).ratio(4), 0.75);
    }

    #[test]
    fn test_balanced_weights() {
        let w = class_weights(&[60, 30, 10], ClassWeight::Balanced);
        assert!((w[0] - 100.0 / 180.0).abs() < 1e-6);
        assert!((w[2] - 100.0 / 30.0).abs() < 1e-6);
        assert_eq!(class_weights(&[60, 30, 10], ClassWeight::Uniform), [1.0; 3]);
    }

    #[test]
    fn test_probabilities_normalize() {
        let p = Probabilities::from_scores([0.2, 0.6, 0.2]).unwrap();
        assert!((p.0.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(p.top().0, Category::Moderate);

        let tied = Probabilities::from_scores([0.5, 0.5, 0.0]).unwrap();
        assert_eq!(tied.top().0, Category::Good);

        assert!(Probabilities::from_scores([0.0, f64::NAN, -1.0]).is_err());

        let clipped = Probabilities::from_scores([-0.2, -0.1, -0.4]).unwrap();
        assert_eq!(clipped.0, [0.0, 1.0, 0.0]);

        let over = Probabilities::from_scores([1.3, 0.0, 0.0]).unwrap();
        assert_eq!(over.0, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fit_separable_clusters() {
        let (rows, labels) = clusters();
        let model = Classifier::fit(&rows, &labels, &small_params()).unwrap();

        assert_eq!(model.predict(&[0.12, 0.5, 0.5, 0.5]).unwrap(), Category::Good);
        assert_eq!(model.predict(&[0.52, 0.5, 0.5, 0.5]).unwrap(), Category::Moderate);
        assert_eq!(model.predict(&[0.88, 0.5, 0.5, 0.5]).unwrap(), Category::Bad);

        for p in model.predict_proba_batch(&rows).unwrap() {
            assert!((p.0.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(p.0.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_json_round_trip_preserves_predictions() {
        let (rows, labels) = clusters();
        let model = Classifier::fit(&rows, &labels, &small_params()).unwrap();
        let restored: Classifier =
            serde_json::from_str(&serde_json::to_string(&model).unwrap()).unwrap();
        assert_eq!(
            restored.predict_batch(&rows).unwrap(),
            model.predict_batch(&rows).unwrap()
        );
    }

    #[test]
    fn test_missing_category_is_rejected() {
        let rows = vec![[0.1, 0.2, 0.3, 0.4], [0.5, 0.6, 0.7, 0.8]];
        let labels = vec![Category::Good, Category::Bad];
        let err = Classifier::fit(&rows, &labels, &small_params()).unwrap_err();
        assert!(matches!(err, AirQualityError::InsufficientSamples { .. }));
    }

    #[test]
    fn test_invalid_params() {
        let params = ForestParams {
            sample_ratio: 0.0,
            ..ForestParams::default()
        };
        assert!(params.validate().is_err());
    }
}
