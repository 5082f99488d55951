//! Trust region method for systems of equations.
//!
//! More than a particular algorithm, [trust
//! region](https://en.wikipedia.org/wiki/Trust_region) methods is actually sort
//! of a framework of various techniques. This also applies to the
//! implementation of this method here; it is composed of multiple techniques
//! that are applied in specific cases. The basis is [Powell's dogleg
//! method](https://en.wikipedia.org/wiki/Powell%27s_dog_leg_method), while a
//! variant of
//! [Levenberg-Marquardt](https://en.wikipedia.org/wiki/Levenberg%E2%80%93Marquardt_algorithm)
//! method is used when using newton direction is not possible.
//!
//! The solver is used to find the roots of non-linear optimality conditions
//! (see [`solve_system`](crate::symbolic::solve_system)).
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Methods for Non-Linear Least Squares
//! Problems](https://api.semanticscholar.org/CorpusID:64217935)
//!
//! \[3\] [A Modified Two Steps Levenberg-Marquardt Method for Nonlinear
//! Equations](https://www.sciencedirect.com/science/article/pii/S0377042715002666)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{storage::StorageMut, DMatrix, DVector, Dyn, IsContiguous, Vector};
use thiserror::Error;

use crate::core::{NumericProblem, Solver, System};

/// Specification for initial value of trust region size.
#[derive(Debug, Clone, Copy)]
pub enum DeltaInit {
    /// Fixed value.
    Fixed(f64),
    /// Estimated from Jacobian matrix in the initial point.
    Estimated,
}

/// Options for [`TrustRegion`] solver.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct TrustRegionOptions {
    /// Minimum allowed trust region size. Default: `f64::EPSILON.sqrt()`.
    delta_min: f64,
    /// Maximum allowed trust region size. Default: `1e9`.
    delta_max: f64,
    /// Initial trust region size. Default: estimated (see [`DeltaInit`]).
    delta_init: DeltaInit,
    /// Minimum scaling factor for lambda in Levenberg-Marquardt step. Default:
    /// `1e-10`.
    mu_min: f64,
    /// Threshold for gain ratio to shrink trust region size if lower. Default:
    /// `0.25`.
    shrink_thresh: f64,
    /// Threshold for gain ratio to expand trust region size if higher. Default:
    /// `0.75`.
    expand_thresh: f64,
    /// Threshold for gain ratio that needs to be exceeded to accept the
    /// calculated step. Default: `0.0001`.
    accept_thresh: f64,
    /// Number of step rejections that are allowed to happen before returning
    /// [`TrustRegionError::NoProgress`] error. Default: `10`.
    rejections_thresh: usize,
    /// Determines whether steps that increase the error can be accepted.
    /// Default: `true`.
    allow_ascent: bool,
}

impl Default for TrustRegionOptions {
    fn default() -> Self {
        Self {
            delta_min: f64::EPSILON.sqrt(),
            delta_max: 1e9,
            delta_init: DeltaInit::Estimated,
            mu_min: 1e-10,
            shrink_thresh: 0.25,
            expand_thresh: 0.75,
            accept_thresh: 0.0001,
            rejections_thresh: 10,
            allow_ascent: true,
        }
    }
}

/// Trust region solver.
///
/// See [module](self) documentation for more details.
pub struct TrustRegion {
    options: TrustRegionOptions,
    delta: f64,
    mu: f64,
    jac: DMatrix<f64>,
    q_tr_rx_neg: DVector<f64>,
    newton: DVector<f64>,
    grad_neg: DVector<f64>,
    cauchy: DVector<f64>,
    jac_tr_jac: DMatrix<f64>,
    p: DVector<f64>,
    temp: DVector<f64>,
    iter: usize,
    rejections_cnt: usize,
}

impl TrustRegion {
    /// Initializes trust region solver with default options.
    pub fn new<P: NumericProblem>(p: &P) -> Self {
        Self::with_options(p, TrustRegionOptions::default())
    }

    /// Initializes trust region solver with given options.
    pub fn with_options<P: NumericProblem>(p: &P, options: TrustRegionOptions) -> Self {
        let n = p.dim();
        let delta_init = match options.delta_init {
            DeltaInit::Fixed(fixed) => fixed,
            // Zero is recognized in the function `solve_next`.
            DeltaInit::Estimated => 0.0,
        };

        Self {
            options,
            delta: delta_init,
            mu: 0.5,
            jac: DMatrix::zeros(n, n),
            q_tr_rx_neg: DVector::zeros(n),
            newton: DVector::zeros(n),
            grad_neg: DVector::zeros(n),
            cauchy: DVector::zeros(n),
            jac_tr_jac: DMatrix::zeros(n, n),
            p: DVector::zeros(n),
            temp: DVector::zeros(n),
            iter: 1,
            rejections_cnt: 0,
        }
    }

    /// Resets the internal state of the solver.
    pub fn reset(&mut self) {
        self.delta = match self.options.delta_init {
            DeltaInit::Fixed(fixed) => fixed,
            DeltaInit::Estimated => 0.0,
        };
        self.mu = 0.5;
        self.iter = 1;
        self.rejections_cnt = 0;
    }
}

/// Error returned from [`TrustRegion`] solver.
#[derive(Debug, Error)]
pub enum TrustRegionError {
    /// Could not take any valid step.
    #[error("neither newton nor steepest descent step can be taken from the point")]
    NoValidStep,
    /// Maximum number of step rejections exceeded.
    #[error("cannot make progress")]
    NoProgress,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StepType {
    FullNewton,
    ScaledNewton,
    LevenbergMarquardt,
    ScaledCauchy,
    Dogleg,
}

impl<R: System> Solver<R> for TrustRegion {
    const NAME: &'static str = "Trust-region";

    type Error = TrustRegionError;

    fn solve_next<Sx, Srx>(
        &mut self,
        r: &R,
        x: &mut Vector<f64, Dyn, Sx>,
        rx: &mut Vector<f64, Dyn, Srx>,
    ) -> Result<(), Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        let TrustRegionOptions {
            delta_min,
            delta_max,
            mu_min,
            shrink_thresh,
            expand_thresh,
            accept_thresh,
            rejections_thresh,
            allow_ascent,
            ..
        } = self.options;

        let Self {
            delta,
            mu,
            jac,
            q_tr_rx_neg,
            newton,
            grad_neg,
            cauchy,
            jac_tr_jac,
            p,
            temp,
            iter,
            rejections_cnt,
            ..
        } = self;

        // Compute r(x) and r'(x).
        r.eval(x, rx);
        r.jacobian(x, jac);

        let rx_norm = rx.norm();

        if *delta == 0.0 {
            // Zero delta signifies that the initial delta is to be set
            // automatically and it has not been done yet.
            //
            // The initial delta is estimated as follows. Let vector d be
            // defined as
            //
            //     d_j = || F'(x)_*j || or 1 if it would be 0
            //
            // Then delta = K * || diag(d) x || or K if || diag(d) x || = 0,
            // where K = 100. The approach is taken from GSL.
            for (j, col) in jac.column_iter().enumerate() {
                temp[j] = col.norm();
                if temp[j] == 0.0 {
                    temp[j] = 1.0;
                }
            }
            temp.component_mul_assign(x);

            let factor = 100.0;
            *delta = temp.norm() * factor;

            if *delta == 0.0 {
                *delta = factor;
            }
        }

        // Perform QR decomposition of F'(x).
        let (qr_q, qr_r) = jac.clone_owned().qr().unpack();

        // Compute -Q^T r(x).
        qr_q.tr_mul_to(rx, q_tr_rx_neg);
        q_tr_rx_neg.neg_mut();

        // Find the Newton step by solving the system R newton = -Q^T r(x).
        newton.copy_from(q_tr_rx_neg);
        let is_newton_valid = qr_r.solve_upper_triangular_mut(newton);

        if !is_newton_valid {
            debug!(
                "Newton step is invalid for ill-defined Jacobian (zero columns: {:?})",
                jac.column_iter()
                    .enumerate()
                    .filter(|(_, col)| col.norm() == 0.0)
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>()
            );
        }

        let newton_norm = newton.norm();

        let step_type = if is_newton_valid && newton_norm <= *delta {
            // Newton step is inside the trust region. We can safely take it.
            p.copy_from(newton);
            debug!("take full Newton: {:?}", p.as_slice());
            StepType::FullNewton
        } else {
            // Newton step is outside the trust region. We need to involve the
            // gradient.

            // Compute -grad r(x) = -r'(x)^T r(x) = -R^T Q^T r(x).
            qr_r.tr_mul_to(q_tr_rx_neg, grad_neg);

            let grad_norm = grad_neg.norm();

            if grad_norm == 0.0 {
                // Gradient is zero, it is useless to compute the dogleg step.
                // Instead, we take the Newton direction to the trust region
                // boundary.
                if is_newton_valid {
                    p.copy_from(newton);
                    *p *= *delta / newton_norm;
                    debug!(
                        "take scaled Newton to trust-region boundary: {:?}",
                        p.as_slice()
                    );
                    StepType::ScaledNewton
                } else {
                    return Err(TrustRegionError::NoValidStep);
                }
            } else {
                // Compute tau = || grad r(x) ||^2 / || r'(x) grad r(x) ||^2.
                jac.mul_to(grad_neg, temp);
                let tau = grad_neg.norm_squared() / temp.norm_squared();

                // Scale the steepest descent to the Cauchy point.
                cauchy.copy_from(grad_neg);
                *cauchy *= tau;

                let cauchy_norm = cauchy.norm();

                if cauchy_norm >= *delta {
                    // Cauchy point is outside the trust region. We take the
                    // steepest gradient descent to the trust region boundary.
                    p.copy_from(cauchy);
                    *p *= *delta / cauchy_norm;
                    debug!(
                        "take scaled Cauchy to trust region-boundary: {:?}",
                        p.as_slice()
                    );
                    StepType::ScaledCauchy
                } else if is_newton_valid {
                    // The trust region boundary is crossed by the dogleg path
                    // p(alpha) = cauchy + alpha (newton - cauchy). We need to
                    // find alpha such that || p || = delta. It is found by
                    // solving the following quadratic equation:
                    //
                    //     || p ||^2 - delta^2 = 0
                    //
                    // For equation a alpha^2 + 2b alpha + c = 0, we get:
                    //
                    //     a = || newton - cauchy ||^2
                    //     b = cauchy^T (newton - cauchy)
                    //     c = || cauchy ||^2 - delta^2
                    //
                    // This polynomial has one negative root and one root in
                    // range (0, 1). We seek for the latter. Since c is always
                    // negative and a nonnegative, sqrt(b^2 - ac) >= b and the
                    // root using minus sign is negative. Thus we can safely
                    // compute only one root.
                    //
                    // For slightly better numerical accuracy, we will avoid
                    // some subtractions (possible catastrophic cancellation) by
                    // computing -c and using Muller's formula for b > 0.
                    newton.sub_to(cauchy, temp);

                    let a = temp.norm_squared();
                    let b = cauchy.dot(temp);
                    let c_neg = *delta * *delta - cauchy_norm * cauchy_norm;

                    let d = (b * b + a * c_neg).sqrt();
                    let alpha = if b <= 0.0 {
                        (-b + d) / a
                    } else {
                        c_neg / (b + d)
                    };

                    // Finally, compute the dogleg step p = cauchy + alpha
                    // (newton - cauchy).
                    p.copy_from(temp);
                    *p *= alpha;
                    *p += &*cauchy;
                    debug!("take dogleg (factor = {}): {:?}", alpha, p.as_slice());
                    StepType::Dogleg
                } else {
                    // Since F'(x) cannot be inverted so the Newton step is
                    // undefined, we need to fallback to Levenberg-Marquardt
                    // which overcomes this issue but at higher computational
                    // expense. We are looking for lambda such that
                    //
                    //     (B + lambda I) p = - grad r(x)
                    //
                    // such that p is the solution to
                    //
                    //     min 1/2 || r'(x) p + r(x) ||^2 s.t. || p || <= delta.
                    //
                    // A common choice proven to lead to quadratic convergence
                    // is lambda = || r(x) ||^d, where d is from (0, 2]. An
                    // adaptive choice for d is:
                    //
                    //     d = 1 / || r(x) || if || r(x) || >= 1 and 1 + 1 / k otherwise,
                    //
                    // where k denotes the current iteration. Such choice
                    // ensures that lambda is not large when the point is far
                    // from the solution (i.e., for large || r(x) ||).
                    let d = if rx_norm >= 1.0 {
                        1.0 / rx_norm
                    } else {
                        1.0 + 1.0 / (*iter as f64)
                    };

                    let lambda = *mu * rx_norm.powf(d);

                    // Compute B = F'(x)^T F'(x), which is a symmetric matrix.
                    jac.tr_mul_to(jac, jac_tr_jac);

                    // Compute B + lambda I.
                    for i in 0..jac_tr_jac.nrows() {
                        jac_tr_jac[(i, i)] += lambda;
                    }

                    // Solve p for (B + lambda I) p = - grad r(x).
                    p.copy_from(grad_neg);

                    let is_levenberg_marquardt_valid = jac_tr_jac.clone_owned().qr().solve_mut(p);

                    if !is_levenberg_marquardt_valid {
                        debug!(
                            "Levenberg-Marquardt step is invalid for ill-defined matrix B (lambda = {})",
                            lambda
                        );
                    }

                    let p_norm = p.norm();

                    if p_norm > *delta {
                        // The original step was outside, scale it to the
                        // boundary.
                        *p *= *delta / p_norm;
                    }

                    debug!(
                        "take Levenberg-Marquardt (lambda = {}): {:?}",
                        lambda,
                        p.as_slice()
                    );
                    StepType::LevenbergMarquardt
                }
            }
        };

        // Vectors for Newton and Cauchy steps are no longed used, so we reuse
        // their allocations for another purpose.
        let x_trial = newton;
        let rx_trial = cauchy;

        // Get candidate x' for the next iterate.
        x.add_to(p, x_trial);

        // Compute r(x').
        r.eval(x_trial, rx_trial);
        let is_trial_valid = rx_trial.iter().all(|rix| rix.is_finite());
        let rx_trial_norm = rx_trial.norm();

        let gain_ratio = if is_trial_valid {
            // Compute the gain ratio.
            jac.mul_to(p, temp);
            *temp += &*rx;
            let predicted = rx_norm - temp.norm();

            let deny = if allow_ascent {
                // If ascent is allowed, then check only for zero, which would
                // make the gain ratio calculation ill-defined.
                predicted == 0.0
            } else {
                // If ascent is not allowed, test positivity of the predicted
                // gain.
                predicted <= 0.0
            };

            if deny {
                debug!("predicted gain = {}", predicted);
                0.0
            } else {
                let actual = rx_norm - rx_trial_norm;
                let gain_ratio = actual / predicted;
                debug!("gain ratio = {} / {} = {}", actual, predicted, gain_ratio);

                gain_ratio
            }
        } else {
            debug!("trial step is invalid, gain ratio = 0");
            0.0
        };

        // Decide if the step is accepted or not.
        if gain_ratio > accept_thresh {
            // Accept the trial step.
            x.copy_from(x_trial);
            rx.copy_from(rx_trial);
            debug!(
                "step accepted, || rx || = {}, x = {:?}",
                rx_trial_norm,
                x_trial.as_slice()
            );

            *rejections_cnt = 0;
        } else {
            debug!("step rejected, threshold for accepting = {}", accept_thresh);
            *rejections_cnt += 1;

            if *rejections_cnt == rejections_thresh {
                debug!(
                    "solving reached the rejections count limit ({})",
                    rejections_thresh
                );
                return Err(TrustRegionError::NoProgress);
            }
        }

        let p_norm = p.norm();

        // Potentially update the size of the trust region.
        let delta_old = *delta;
        if gain_ratio < shrink_thresh {
            *delta = (delta_old * 0.25).min(p_norm * 0.25).max(delta_min);
            debug!(
                "shrink delta from {} to {} (|| p || = {})",
                delta_old, *delta, p_norm
            );
        } else if gain_ratio > expand_thresh {
            *delta = (delta_old * 2.0).max(p_norm * 3.0).min(delta_max);
            debug!(
                "expand delta from {} to {} (|| p || = {})",
                delta_old, *delta, p_norm
            );
        }

        // Potentially update the mu parameter for LM method.
        if step_type == StepType::LevenbergMarquardt {
            let mu_old = *mu;

            // Shrinkage and expansion are reversed for mu compared to delta.
            // The less mu is, the more LM step exploits the information from
            // Jacobian, because it is less "deformed" by adding lambda I.
            if gain_ratio < shrink_thresh {
                *mu = mu_old * 4.0;
                debug!("expand mu from {} to {}", mu_old, *mu);
            } else if gain_ratio > expand_thresh {
                *mu = (mu_old * 0.25).max(mu_min);
                debug!("shrink mu from {} to {}", mu_old, *mu);
            }
        }

        *iter += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn rosenbrock() {
        let r = ExtendedRosenbrock::new(2);
        let eps = 1e-12;

        for x in r.initials() {
            let solver = TrustRegion::new(&r);
            assert!(r.is_root(&solve(&r, solver, x, 25, eps).unwrap(), eps));
        }
    }

    #[test]
    fn circle_and_line() {
        let r = CircleLine::default();
        let eps = 1e-12;

        for x in r.initials() {
            let solver = TrustRegion::new(&r);
            assert!(r.is_root(&solve(&r, solver, x, 50, eps).unwrap(), eps));
        }
    }

    #[test]
    fn singular_jacobian_in_stationary_point() {
        // x^2 + 1 = 0 has no root and its Jacobian vanishes in zero.
        let r = NoRoot;
        let solver = TrustRegion::new(&r);

        assert!(matches!(
            solve(&r, solver, dvector![0.0], 10, 1e-12),
            Err(TestingError::Inner(TrustRegionError::NoValidStep))
        ));
    }

    #[test]
    fn fixed_delta() {
        let r = ExtendedRosenbrock::new(2);
        let mut options = TrustRegionOptions::default();
        options.set_delta_init(DeltaInit::Fixed(0.5));
        let eps = 1e-12;

        for x in r.initials() {
            let solver = TrustRegion::with_options(&r, options.clone());
            assert!(r.is_root(&solve(&r, solver, x, 100, eps).unwrap(), eps));
        }
    }
}
