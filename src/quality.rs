//! Air quality categories and how they are derived from PM2.5.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (inclusive) of the Good band, in µg/m³.
pub const GOOD_MAX: f64 = 35.0;
/// Upper bound (inclusive) of the Moderate band, in µg/m³.
pub const MODERATE_MAX: f64 = 75.0;

pub const CATEGORY_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Good,
    Moderate,
    Bad,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [Category::Good, Category::Moderate, Category::Bad];

    /// Label a concentration. Total over every input: anything that is not
    /// at or below a threshold (NaN included) lands in `Bad`.
    pub fn from_concentration(pm25: f64) -> Self {
        if pm25 <= GOOD_MAX {
            Category::Good
        } else if pm25 <= MODERATE_MAX {
            Category::Moderate
        } else {
            Category::Bad
        }
    }

    pub fn index(self) -> usize {
        match self {
            Category::Good => 0,
            Category::Moderate => 1,
            Category::Bad => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Good => "Good",
            Category::Moderate => "Moderate",
            Category::Bad => "Bad",
        }
    }

    /// Accepts English names and the Indonesian labels of the prepared dataset.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" | "baik" => Some(Category::Good),
            "moderate" | "sedang" => Some(Category::Moderate),
            "bad" | "buruk" => Some(Category::Bad),
            _ => None,
        }
    }

    /// Display score shown by the frontend gauge.
    pub fn score(self) -> u8 {
        match self {
            Category::Good => 85,
            Category::Moderate => 60,
            Category::Bad => 30,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Category::Good => "✅",
            Category::Moderate => "⚠️",
            Category::Bad => "❌",
        }
    }

    pub fn feedback(self) -> &'static str {
        match self {
            Category::Good => "✓ Weather conditions support good air quality",
            Category::Moderate => "⚠ Weather conditions lead to moderate air quality",
            Category::Bad => "✗ Weather conditions lead to bad air quality",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Concentration bands next to the thresholds that are dropped from the
/// training table so the classifier sees cleaner boundaries. Never applied
/// at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayZone {
    pub enabled: bool,
    pub bands: Vec<[f64; 2]>,
}

impl Default for GrayZone {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: vec![[33.0, 37.0], [73.0, 77.0]],
        }
    }
}

impl GrayZone {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether a record with this concentration should be excluded.
    pub fn excludes(&self, pm25: f64) -> bool {
        self.enabled
            && self
                .bands
                .iter()
                .any(|[lo, hi]| pm25 >= *lo && pm25 <= *hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(Category::from_concentration(35.0), Category::Good);
        assert_eq!(Category::from_concentration(35.01), Category::Moderate);
        assert_eq!(Category::from_concentration(75.0), Category::Moderate);
        assert_eq!(Category::from_concentration(75.01), Category::Bad);
    }

    #[test]
    fn test_extremes_map_to_endpoints() {
        assert_eq!(Category::from_concentration(-10.0), Category::Good);
        assert_eq!(Category::from_concentration(1e9), Category::Bad);
        assert_eq!(Category::from_concentration(f64::NAN), Category::Bad);
    }

    #[test]
    fn test_gray_zone() {
        let zone = GrayZone::default();
        assert!(zone.excludes(34.0));
        assert!(zone.excludes(33.0));
        assert!(zone.excludes(77.0));
        assert!(!zone.excludes(40.0));
        assert!(!zone.excludes(32.99));
        assert!(!GrayZone::disabled().excludes(34.0));
    }

    #[test]
    fn test_parse_accepts_dataset_labels() {
        assert_eq!(Category::parse("Baik"), Some(Category::Good));
        assert_eq!(Category::parse(" sedang "), Some(Category::Moderate));
        assert_eq!(Category::parse("Bad"), Some(Category::Bad));
        assert_eq!(Category::parse("unknown"), None);
    }

    #[test]
    fn test_lookup_tables() {
        let scores: Vec<u8> = Category::ALL.iter().map(|c| c.score()).collect();
        assert_eq!(scores, vec![85, 60, 30]);
        let indices: Vec<usize> = Category::ALL.iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
