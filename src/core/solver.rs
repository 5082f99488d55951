use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::system::System;

/// Interface of a solver of equation systems.
///
/// A solver is an iterative algorithm which takes a point _x_ and computes the
/// next step in the solving process. Repeated calls to the next step should
/// eventually converge into a root _x'_ in successful cases.
///
/// ## Implementing a solver
///
/// Here is an implementation of a plain Newton iteration, which takes the full
/// Newton step without any globalization.
///
/// ```rust
/// use optcalc::nalgebra as na;
/// use optcalc::{Solver, System};
/// use na::{storage::StorageMut, DMatrix, Dyn, IsContiguous, Vector};
///
/// struct Newton;
///
/// impl<R: System> Solver<R> for Newton {
///     const NAME: &'static str = "Newton";
///     type Error = &'static str;
///
///     fn solve_next<Sx, Srx>(
///         &mut self,
///         r: &R,
///         x: &mut Vector<f64, Dyn, Sx>,
///         rx: &mut Vector<f64, Dyn, Srx>,
///     ) -> Result<(), Self::Error>
///     where
///         Sx: StorageMut<f64, Dyn> + IsContiguous,
///         Srx: StorageMut<f64, Dyn>,
///     {
///         let mut jac = DMatrix::zeros(r.dim(), r.dim());
///         r.eval(x, rx);
///         r.jacobian(x, &mut jac);
///
///         let mut p = -rx.clone_owned();
///         if !jac.lu().solve_mut(&mut p) {
///             return Err("singular jacobian");
///         }
///
///         *x += p;
///
///         // We must compute the residuals.
///         r.eval(x, rx);
///         Ok(())
///     }
/// }
/// ```
pub trait Solver<R: System> {
    /// Name of the solver.
    const NAME: &'static str;

    /// Error while computing the next step.
    type Error;

    /// Computes the next step in the solving process.
    ///
    /// The value of `x` is the current point. After the method returns, `x`
    /// should hold the variable values of the performed step and `rx` _must_
    /// contain residuals of that step as computed by [`System::eval`].
    ///
    /// The implementations _can_ assume that subsequent calls to `solve_next`
    /// pass the value of `x` as was returned in the previous iteration.
    fn solve_next<Sx, Srx>(
        &mut self,
        r: &R,
        x: &mut Vector<f64, Dyn, Sx>,
        rx: &mut Vector<f64, Dyn, Srx>,
    ) -> Result<(), Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>;
}
