//! Held-out evaluation: accuracy and per-category precision, recall and F1.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::quality::{Category, CATEGORY_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub per_class: BTreeMap<Category, ClassMetrics>,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// `confusion[actual][predicted]`
    pub confusion: [[usize; CATEGORY_COUNT]; CATEGORY_COUNT],
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl EvaluationReport {
    /// Pairs beyond the shorter slice are ignored.
    pub fn compute(actual: &[Category], predicted: &[Category]) -> Self {
        let mut confusion = [[0usize; CATEGORY_COUNT]; CATEGORY_COUNT];
        for (a, p) in actual.iter().zip(predicted) {
            confusion[a.index()][p.index()] += 1;
        }
        let samples = actual.len().min(predicted.len());
        let correct: usize = (0..CATEGORY_COUNT).map(|i| confusion[i][i]).sum();

        let mut per_class = BTreeMap::new();
        for category in Category::ALL {
            let i = category.index();
            let tp = confusion[i][i];
            let support: usize = confusion[i].iter().sum();
            let predicted_as: usize = confusion.iter().map(|row| row[i]).sum();
            let precision = ratio(tp, predicted_as);
            let recall = ratio(tp, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            per_class.insert(
                category,
                ClassMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                },
            );
        }

        let n = CATEGORY_COUNT as f64;
        let mut macro_avg = ClassMetrics {
            support: samples,
            ..ClassMetrics::default()
        };
        let mut weighted_avg = macro_avg;
        for m in per_class.values() {
            macro_avg.precision += m.precision / n;
            macro_avg.recall += m.recall / n;
            macro_avg.f1 += m.f1 / n;
            let w = ratio(m.support, samples);
            weighted_avg.precision += m.precision * w;
            weighted_avg.recall += m.recall * w;
            weighted_avg.f1 += m.f1 * w;
        }

        Self {
            samples,
            accuracy: ratio(correct, samples),
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        let row = |f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics| {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )
        };
        for (category, m) in &self.per_class {
            row(f, category.name(), m)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.samples
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
