//! The collection of implemented numeric algorithms.
//!
//! * [Trust region](trust_region) -- root finding for square systems, used by
//!   the symbolic equation solver.
//! * [BFGS](bfgs) -- quasi-Newton minimization using analytic gradients.
//! * [Nelder-Mead](nelder_mead) -- derivative-free minimization.

pub mod bfgs;
pub mod nelder_mead;
pub mod trust_region;

pub use bfgs::Bfgs;
pub use nelder_mead::NelderMead;
pub use trust_region::{TrustRegion, TrustRegionOptions};
