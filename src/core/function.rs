use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, Vector,
};

use super::base::NumericProblem;

/// The trait for defining functions.
///
/// ## Defining a function
///
/// A function is any type that implements [`Function`] and [`NumericProblem`]
/// traits. There are two required methods: [`apply`](Function::apply) and
/// [`dim`](NumericProblem::dim).
///
/// ```rust
/// use optcalc::nalgebra as na;
/// use optcalc::{Function, NumericProblem};
/// use na::{Dyn, IsContiguous};
///
/// // A problem is represented by a type.
/// struct Rosenbrock {
///     a: f64,
///     b: f64,
/// }
///
/// impl NumericProblem for Rosenbrock {
///     fn dim(&self) -> usize {
///         2
///     }
/// }
///
/// impl Function for Rosenbrock {
///     // Apply trial values of variables to the function.
///     fn apply<Sx>(&self, x: &na::Vector<f64, Dyn, Sx>) -> f64
///     where
///         Sx: na::storage::Storage<f64, Dyn> + IsContiguous,
///     {
///         // Compute the function value.
///         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
///     }
/// }
/// ```
pub trait Function: NumericProblem {
    /// Calculate the function value given values of the variables.
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous;
}

/// A function whose gradient is available analytically.
///
/// Gradient-based minimizers (e.g., [`Bfgs`](crate::algo::Bfgs)) require this
/// trait.
pub trait Differentiable: Function {
    /// Calculate the gradient of the function given values of the variables.
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>;
}

impl<F: Function + ?Sized> Function for &F {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        (**self).apply(x)
    }
}

impl<F: Differentiable + ?Sized> Differentiable for &F {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        (**self).gradient(x, grad)
    }
}
