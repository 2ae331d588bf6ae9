pub mod error;
pub mod types;

#[cfg(feature = "simulation")]
pub mod monte_carlo;

#[cfg(feature = "sensitivity")]
pub mod sensitivity;

#[cfg(feature = "football_field")]
pub mod equity_research;

pub use error::ValuationRiskError;
pub use types::*;

/// Standard result type for all valuation-risk operations
pub type ValuationRiskResult<T> = Result<T, ValuationRiskError>;
