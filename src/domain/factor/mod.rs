//! Factor research: registry, data context, baseline factors, IC analysis
//! and weight combination.

pub mod analyzer;
pub mod baseline;
pub mod combiner;
pub mod context;
#[cfg(feature = "regression")]
pub mod regression;
pub mod registry;
pub mod technical;

pub use analyzer::{FactorAnalysisResult, FactorAnalyzer};
pub use combiner::{CombineConfig, CombineMethod, FactorCombiner};
pub use context::FactorContext;
pub use registry::{FactorCategory, FactorRegistry};
