//! Abstractions and types for defining equation systems.
//!
//! # Defining a system
//!
//! A system is any type that implements [`System`] and [`NumericProblem`]
//! traits. The residuals are evaluated by [`eval`](System::eval) and, because
//! the systems in this crate come from symbolic expressions, the Jacobian
//! matrix is provided analytically by [`jacobian`](System::jacobian).
//!
//! ```rust
//! use optcalc::nalgebra as na;
//! use optcalc::{NumericProblem, System};
//! use na::{Dyn, IsContiguous};
//!
//! // x^2 + y^2 = 1, x = y
//! struct Circle;
//!
//! impl NumericProblem for Circle {
//!     fn dim(&self) -> usize {
//!         2
//!     }
//! }
//!
//! impl System for Circle {
//!     fn eval<Sx, Srx>(&self, x: &na::Vector<f64, Dyn, Sx>, rx: &mut na::Vector<f64, Dyn, Srx>)
//!     where
//!         Sx: na::storage::Storage<f64, Dyn> + IsContiguous,
//!         Srx: na::storage::StorageMut<f64, Dyn>,
//!     {
//!         rx[0] = x[0].powi(2) + x[1].powi(2) - 1.0;
//!         rx[1] = x[0] - x[1];
//!     }
//!
//!     fn jacobian<Sx>(&self, x: &na::Vector<f64, Dyn, Sx>, jac: &mut na::DMatrix<f64>)
//!     where
//!         Sx: na::storage::Storage<f64, Dyn> + IsContiguous,
//!     {
//!         jac[(0, 0)] = 2.0 * x[0];
//!         jac[(0, 1)] = 2.0 * x[1];
//!         jac[(1, 0)] = 1.0;
//!         jac[(1, 1)] = -1.0;
//!     }
//! }
//! ```

use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, Dyn, IsContiguous, Vector,
};

use super::base::NumericProblem;

/// The trait for defining equations systems.
///
/// The number of equations must equal to the number of variables
/// ([`NumericProblem::dim`]).
pub trait System: NumericProblem {
    /// Calculate the residuals of the system given values of the variables.
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>;

    /// Calculate the Jacobian matrix of the system given values of the
    /// variables. Row *i* contains the partial derivatives of *i*-th residual.
    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous;

    /// Calculate the norm of residuals of the system given values of the
    /// variable.
    fn norm<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let mut rx = x.clone_owned();
        self.eval(x, &mut rx);
        rx.norm()
    }
}
