use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::function::Function;

/// Interface of a minimization algorithm.
///
/// A minimizer is an iterative algorithm which takes a point _x_ and computes
/// the next step in the minimization process. Repeated calls to the next step
/// should move _x_ towards a (local) minimum in successful cases.
///
/// ## Implementing a minimizer
///
/// Here is an implementation of a fixed-step coordinate search. It probes both
/// directions along every axis and moves to the best point found.
///
/// ```rust
/// use optcalc::nalgebra as na;
/// use optcalc::{Function, Minimizer};
/// use na::{storage::StorageMut, Dyn, IsContiguous, Vector};
///
/// struct CoordinateSearch {
///     step: f64,
/// }
///
/// impl<F: Function> Minimizer<F> for CoordinateSearch {
///     const NAME: &'static str = "Coordinate search";
///     type Error = std::convert::Infallible;
///
///     fn opt_next<Sx>(&mut self, f: &F, x: &mut Vector<f64, Dyn, Sx>) -> Result<f64, Self::Error>
///     where
///         Sx: StorageMut<f64, Dyn> + IsContiguous,
///     {
///         let mut best = f.apply(x);
///
///         for i in 0..f.dim() {
///             for direction in [1.0, -1.0] {
///                 let mut trial = x.clone_owned();
///                 trial[i] += direction * self.step;
///                 let value = f.apply(&trial);
///
///                 if value < best {
///                     best = value;
///                     x.copy_from(&trial);
///                 }
///             }
///         }
///
///         Ok(best)
///     }
/// }
/// ```
pub trait Minimizer<F: Function> {
    /// Name of the minimizer.
    const NAME: &'static str;

    /// Error type of the iteration. Represents an invalid operation during
    /// computing the next step.
    type Error;

    /// Computes the next step in the minimization process.
    ///
    /// The value of `x` is the current values of variables. After the method
    /// returns, `x` should hold the variable values of the performed step and
    /// the return value *must* be the function value of that step as computed
    /// by [`Function::apply`].
    ///
    /// The implementations *can* assume that subsequent calls to `opt_next`
    /// pass the value of `x` as was outputted in the previous iteration by the
    /// same method.
    fn opt_next<Sx>(&mut self, f: &F, x: &mut Vector<f64, Dyn, Sx>) -> Result<f64, Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous;
}
