//! Portfolio construction, rebalancing and attribution.

pub mod attribution;
pub mod optimizer;
pub mod rebalancer;
pub mod weights;

pub use optimizer::{OptimizeMethod, OptimizerConfig, PortfolioOptimizer};
pub use rebalancer::{PortfolioRebalancer, RebalanceConfig};
pub use weights::Weights;
