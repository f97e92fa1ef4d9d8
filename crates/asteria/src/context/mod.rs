//! Compile-time and runtime scope.

pub mod analytic;
pub mod executive;

pub use analytic::{AnalyticContext, Resolution};
pub use executive::ExecutiveContext;
