//! Core abstractions and types.
//!
//! *Users* are mainly interested in the [`Problem`] description and the
//! [`OptimizationResult`] record produced by every [`Optimizer`].
//!
//! Algorithms *developers* are interested in the numeric layer: implementing
//! the [`Minimizer`] or [`Solver`] trait for [`Function`]s and [`System`]s
//! and using tools in [derivatives](crate::derivatives) module.

mod base;
mod function;
mod minimizer;
mod optimizer;
mod problem;
mod result;
mod solver;
mod system;

pub use base::*;
pub use function::*;
pub use minimizer::*;
pub use optimizer::*;
pub use problem::*;
pub use result::*;
pub use solver::*;
pub use system::*;
