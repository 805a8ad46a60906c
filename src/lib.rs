//! Air quality prediction from weather readings.
//!
//! An offline pipeline labels the Beijing air-quality dataset from PM2.5,
//! fits a min-max scaler and a tree-ensemble classifier on the four weather
//! features, and persists both as a tagged pair. The serving side loads the
//! pair once into a [`gateway::ServiceContext`] and answers requests through
//! the [`gateway::Gateway`].

pub mod artifacts;
pub mod balancer;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod gateway;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod scaler;
pub mod server;
pub mod split;

pub use config::Settings;
pub use error::{AirQualityError, ErrorCategory, FieldError, Result};
pub use features::{Feature, RangeTable, Reading};
pub use gateway::{Gateway, ServiceContext};
pub use quality::Category;
