//! BFGS quasi-Newton minimization method.
//!
//! [BFGS](https://en.wikipedia.org/wiki/Broyden%E2%80%93Fletcher%E2%80%93Goldfarb%E2%80%93Shanno_algorithm)
//! maintains an approximation of the inverse Hessian matrix which is updated
//! from the changes of the gradient between iterations. The search direction
//! is then accepted by a backtracking line search satisfying the Armijo
//! condition.
//!
//! This is the workhorse for unconstrained problems and the default inner
//! minimizer of the augmented Lagrangian method.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{storage::StorageMut, DMatrix, DVector, Dyn, IsContiguous, Vector};
use thiserror::Error;

use crate::core::{Differentiable, Minimizer, NumericProblem};

/// Options for [`Bfgs`] minimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct BfgsOptions {
    /// Constant of sufficient decrease in the Armijo condition. Default:
    /// `1e-4`.
    c1: f64,
    /// Factor by which the step length is reduced in the line search. Default:
    /// `0.5`.
    backtrack_factor: f64,
    /// Maximum number of step length reductions in a single line search.
    /// Default: `50`.
    max_line_search: usize,
    /// Minimal curvature `s^T y` for the inverse Hessian update to be
    /// performed. Default: `1e-12`.
    curvature_thresh: f64,
    /// Determines whether the initial inverse Hessian approximation is scaled
    /// after the first step (see \[1\], eq. 6.20). Default: `true`.
    initial_scaling: bool,
}

impl Default for BfgsOptions {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            backtrack_factor: 0.5,
            max_line_search: 50,
            curvature_thresh: 1e-12,
            initial_scaling: true,
        }
    }
}

/// BFGS minimizer.
///
/// See [module](self) documentation for more details.
pub struct Bfgs {
    options: BfgsOptions,
    h_inv: DMatrix<f64>,
    grad: DVector<f64>,
    grad_new: DVector<f64>,
    p: DVector<f64>,
    s: DVector<f64>,
    y: DVector<f64>,
    hy: DVector<f64>,
    x_trial: DVector<f64>,
    fx: f64,
    iter: usize,
}

impl Bfgs {
    /// Initializes BFGS minimizer with default options.
    pub fn new<P: NumericProblem>(p: &P) -> Self {
        Self::with_options(p, BfgsOptions::default())
    }

    /// Initializes BFGS minimizer with given options.
    pub fn with_options<P: NumericProblem>(p: &P, options: BfgsOptions) -> Self {
        let n = p.dim();

        Self {
            options,
            h_inv: DMatrix::identity(n, n),
            grad: DVector::zeros(n),
            grad_new: DVector::zeros(n),
            p: DVector::zeros(n),
            s: DVector::zeros(n),
            y: DVector::zeros(n),
            hy: DVector::zeros(n),
            x_trial: DVector::zeros(n),
            fx: f64::INFINITY,
            iter: 0,
        }
    }

    /// Resets the internal state of the minimizer.
    pub fn reset(&mut self) {
        self.h_inv.fill_with_identity();
        self.fx = f64::INFINITY;
        self.iter = 0;
    }

    /// Returns the norm of the gradient in the current point, or infinity if
    /// no iteration was done yet.
    pub fn grad_norm(&self) -> f64 {
        if self.iter == 0 {
            f64::INFINITY
        } else {
            self.grad.norm()
        }
    }
}

/// Error returned from [`Bfgs`] minimizer.
#[derive(Debug, Error)]
pub enum BfgsError {
    /// Function value or gradient is not finite in the current point.
    #[error("function value or gradient is not finite")]
    NonFinite,
    /// No step length satisfying the sufficient decrease condition was found.
    #[error("line search failed to find sufficient decrease")]
    LineSearchFailed,
}

impl<F: Differentiable> Minimizer<F> for Bfgs {
    const NAME: &'static str = "BFGS";

    type Error = BfgsError;

    fn opt_next<Sx>(&mut self, f: &F, x: &mut Vector<f64, Dyn, Sx>) -> Result<f64, Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous,
    {
        let BfgsOptions {
            c1,
            backtrack_factor,
            max_line_search,
            curvature_thresh,
            initial_scaling,
        } = self.options;

        let Self {
            h_inv,
            grad,
            grad_new,
            p,
            s,
            y,
            hy,
            x_trial,
            fx,
            iter,
            ..
        } = self;

        if *iter == 0 {
            *fx = f.apply(x);
            f.gradient(x, grad);
        }

        if !fx.is_finite() || grad.iter().any(|gi| !gi.is_finite()) {
            return Err(BfgsError::NonFinite);
        }

        if grad.norm() == 0.0 {
            // Stationary point, there is no descent direction.
            debug!("gradient is zero, staying in the point");
            *iter += 1;
            return Ok(*fx);
        }

        // Compute search direction p = -H^{-1} grad.
        h_inv.mul_to(grad, p);
        p.neg_mut();

        let mut slope = p.dot(grad);

        if slope >= 0.0 {
            // The approximation lost positive definiteness due to round-off.
            // Restart from the steepest descent.
            debug!("not a descent direction (slope = {}), reset inverse Hessian", slope);
            h_inv.fill_with_identity();
            p.copy_from(grad);
            p.neg_mut();
            slope = p.dot(grad);
        }

        // Backtracking line search.
        let mut alpha = 1.0;
        let mut accepted = None;

        for _ in 0..max_line_search {
            x_trial.copy_from(p);
            *x_trial *= alpha;
            *x_trial += &*x;

            let fx_trial = f.apply(x_trial);

            if fx_trial.is_finite() && fx_trial <= *fx + c1 * alpha * slope {
                accepted = Some(fx_trial);
                break;
            }

            alpha *= backtrack_factor;
        }

        let fx_trial = match accepted {
            Some(fx_trial) => fx_trial,
            None => {
                debug!(
                    "line search failed after {} reductions, || grad || = {}",
                    max_line_search,
                    grad.norm()
                );
                return Err(BfgsError::LineSearchFailed);
            }
        };

        f.gradient(x_trial, grad_new);

        // s = x' - x, y = grad' - grad
        x_trial.sub_to(x, s);
        grad_new.sub_to(grad, y);

        let sy = s.dot(y);

        if sy > curvature_thresh {
            if *iter == 0 && initial_scaling {
                let scale = sy / y.norm_squared();
                *h_inv *= scale;
                debug!("scale initial inverse Hessian by {}", scale);
            }

            // H' = (I - rho s y^T) H (I - rho y s^T) + rho s s^T, expanded to
            // avoid the matrix products.
            let rho = 1.0 / sy;
            h_inv.mul_to(y, hy);
            let yhy = y.dot(hy);

            h_inv.ger(rho * (1.0 + rho * yhy), s, s, 1.0);
            h_inv.ger(-rho, hy, s, 1.0);
            h_inv.ger(-rho, s, hy, 1.0);
        } else {
            debug!("skip inverse Hessian update, s^T y = {}", sy);
        }

        debug!(
            "step accepted (alpha = {}), fx = {}, x = {:?}",
            alpha,
            fx_trial,
            x_trial.as_slice()
        );

        x.copy_from(x_trial);
        grad.copy_from(grad_new);
        *fx = fx_trial;
        *iter += 1;

        Ok(fx_trial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn rosenbrock() {
        let f = ExtendedRosenbrock::new(2);
        let eps = 1e-10;

        for x in f.initials() {
            let minimizer = Bfgs::new(&f);
            let x = optimize(&f, minimizer, x, 0.0, 500, eps).unwrap();
            assert!(f.is_optimum(&x, 1e-4));
        }
    }

    #[test]
    fn shifted_paraboloid() {
        let f = ShiftedParaboloid::new(vec![2.0, -3.0, 0.5]);
        let minimizer = Bfgs::new(&f);

        let x = optimize(&f, minimizer, dvector![0.0, 0.0, 0.0], 0.0, 50, 1e-14).unwrap();
        assert_abs_diff_eq!(x, dvector![2.0, -3.0, 0.5], epsilon = 1e-6);
    }

    #[test]
    fn gradient_norm_decreases() {
        let f = Sphere::new(3);
        let mut minimizer = Bfgs::new(&f);
        assert!(minimizer.grad_norm().is_infinite());

        let mut x = dvector![1.0, -2.0, 3.0];
        let initial = 2.0 * x.norm();

        minimizer.opt_next(&f, &mut x).unwrap();
        assert!(minimizer.grad_norm() < initial);
    }

    #[test]
    fn non_finite_start() {
        let f = LogBarrier;
        let minimizer = Bfgs::new(&f);

        assert!(matches!(
            optimize(&f, minimizer, dvector![-1.0, -1.0], 0.0, 10, 1e-6),
            Err(TestingError::Inner(BfgsError::NonFinite))
        ));
    }
}
