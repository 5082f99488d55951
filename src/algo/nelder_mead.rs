//! Nelder-mead (simplex) minimization method.
//!
//! [Nelder-Mead](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
//! simplex-reflection method is a popular derivative-free optimization
//! algorithm. It keeps a [simplex](https://en.wikipedia.org/wiki/Simplex) of
//! _n + 1_ points and the simplex is reflected, expanded or contracted based on
//! the function values comparison.
//!
//! In this crate it serves as the gradient-free inner minimizer of the
//! augmented Lagrangian method (see
//! [`InnerMinimizer`](crate::methods::InnerMinimizer)).
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Implementing the Nelder-Mead simplex algorithm with adaptive
//! parameters](https://link.springer.com/article/10.1007/s10589-010-9329-3)
//!
//! \[3\] [Less is more: Simplified Nelder-Mead method for large unconstrained
//! optimization](https://api.semanticscholar.org/CorpusID:59403095)
//!
//! \[4\] [Gilding the Lily: A Variant of the Nelder-Mead Algorithm Based on
//! Golden-Section
//! Search](https://link.springer.com/article/10.1023/A:1014842520519)

use std::cmp::Ordering;

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{
    storage::{Storage, StorageMut},
    DVector, Dyn, IsContiguous, Vector,
};
use thiserror::Error;

use crate::core::{Function, Minimizer, NumericProblem};

/// Family of coefficients for reflection, expansion and contractions.
#[derive(Debug, Clone, Copy)]
pub enum CoefficientsFamily {
    /// Standard ("textbook") choice.
    Standard,
    /// The coefficients are adjusted compared to standard by taking problem
    /// dimension into account to avoid diminishing of expansion and contraction
    /// steps in higher dimensions.
    Balanced,
    /// The coefficients are chosen such that the algorithm becomes a
    /// golden-section search.
    GoldenSection,
    /// The coefficients are left unchanged so it is the responsibility of the
    /// user to set them through [`NelderMeadOptions`].
    Fixed,
}

/// Options for [`NelderMead`] minimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NelderMeadOptions {
    /// Family for coefficients adaptation or fixed coefficients. Default:
    /// standard (see [`CoefficientsFamily`]).
    family: CoefficientsFamily,
    /// Coefficient for reflection operation. Default: `-1`.
    reflection_coeff: f64,
    /// Coefficient for expansion operation. Default: `-2`.
    expansion_coeff: f64,
    /// Coefficient for outer contraction operation. Default: `-0.5`.
    outer_contraction_coeff: f64,
    /// Coefficient for inner contraction operation. Default: `0.5`.
    inner_contraction_coeff: f64,
    /// Coefficient for shrinking operation. Default: `0.5`.
    shrink_coeff: f64,
    /// Distance of the initial simplex vertices from the initial point along
    /// each axis. Default: `1`.
    initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            family: CoefficientsFamily::Standard,
            reflection_coeff: -1.0,
            expansion_coeff: -2.0,
            outer_contraction_coeff: -0.5,
            inner_contraction_coeff: 0.5,
            shrink_coeff: 0.5,
            initial_step: 1.0,
        }
    }
}

impl NelderMeadOptions {
    fn overwrite_coeffs(&mut self, n: usize) {
        let Self {
            family,
            reflection_coeff,
            expansion_coeff,
            outer_contraction_coeff,
            inner_contraction_coeff,
            shrink_coeff,
            ..
        } = self;

        match family {
            CoefficientsFamily::Standard => {
                *reflection_coeff = -1.0;
                *expansion_coeff = -2.0;
                *outer_contraction_coeff = -0.5;
                *inner_contraction_coeff = -*outer_contraction_coeff;
                *shrink_coeff = 0.5;
            }
            CoefficientsFamily::Balanced => {
                let n_inv = 1.0 / (n as f64);

                *reflection_coeff = -1.0;
                *expansion_coeff = -(n_inv * 2.0 + 1.0);
                *outer_contraction_coeff = -(1.0 - n_inv);
                *inner_contraction_coeff = -*outer_contraction_coeff;
                *shrink_coeff = 1.0 - n_inv;
            }
            CoefficientsFamily::GoldenSection => {
                let alpha = 1.0 / (0.5 * (5f64.sqrt() + 1.0));
                *reflection_coeff = -1.0;
                *expansion_coeff = -1.0 / alpha;
                *outer_contraction_coeff = -alpha;
                *inner_contraction_coeff = alpha.powi(2);
                *shrink_coeff = alpha.powi(2);
            }
            CoefficientsFamily::Fixed => {
                // Leave unchanged.
            }
        }
    }
}

/// Nelder-Mead minimizer.
///
/// See [module](self) documentation for more details.
pub struct NelderMead {
    options: NelderMeadOptions,
    centroid: DVector<f64>,
    reflection: DVector<f64>,
    expansion: DVector<f64>,
    contraction: DVector<f64>,
    simplex: Vec<DVector<f64>>,
    values: Vec<f64>,
    sort_perm: Vec<usize>,
}

impl NelderMead {
    /// Initializes Nelder-Mead minimizer with default options.
    pub fn new<P: NumericProblem>(p: &P) -> Self {
        Self::with_options(p, NelderMeadOptions::default())
    }

    /// Initializes Nelder-Mead minimizer with given options.
    pub fn with_options<P: NumericProblem>(p: &P, mut options: NelderMeadOptions) -> Self {
        let n = p.dim();

        options.overwrite_coeffs(n);

        Self {
            options,
            centroid: DVector::zeros(n),
            reflection: DVector::zeros(n),
            expansion: DVector::zeros(n),
            contraction: DVector::zeros(n),
            simplex: Vec::with_capacity(n + 1),
            values: Vec::with_capacity(n + 1),
            sort_perm: Vec::with_capacity(n + 1),
        }
    }

    /// Resets the internal state of the minimizer.
    pub fn reset(&mut self) {
        // Causes simplex to be initialized again.
        self.simplex.clear();
        self.values.clear();
        self.sort_perm.clear();
    }

    /// Returns the spread of function values in the simplex (the worst minus
    /// the best), or infinity if the simplex was not initialized yet.
    pub fn value_spread(&self) -> f64 {
        match (self.sort_perm.first(), self.sort_perm.last()) {
            (Some(&best), Some(&worst)) => self.values[worst] - self.values[best],
            _ => f64::INFINITY,
        }
    }
}

/// Error returned from [`NelderMead`] minimizer.
#[derive(Debug, Error)]
pub enum NelderMeadError {
    /// Simplex collapsed so it is impossible to make any progress.
    #[error("simplex collapsed")]
    SimplexCollapsed,
    /// Simplex contains too many invalid values (NaN, infinity).
    #[error("simplex contains too many invalid values")]
    SimplexInvalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transformation {
    Reflection,
    Expansion,
    OuterContraction,
    InnerContraction,
    Shrinkage,
}

impl Transformation {
    fn as_str(&self) -> &str {
        match self {
            Transformation::Reflection => "reflection",
            Transformation::Expansion => "expansion",
            Transformation::OuterContraction => "outer contraction",
            Transformation::InnerContraction => "inner contraction",
            Transformation::Shrinkage => "shrinkage",
        }
    }
}

impl<F: Function> Minimizer<F> for NelderMead {
    const NAME: &'static str = "Nelder-Mead";

    type Error = NelderMeadError;

    fn opt_next<Sx>(&mut self, f: &F, x: &mut Vector<f64, Dyn, Sx>) -> Result<f64, Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous,
    {
        let NelderMeadOptions {
            reflection_coeff,
            expansion_coeff,
            outer_contraction_coeff,
            inner_contraction_coeff,
            shrink_coeff,
            initial_step,
            ..
        } = self.options;

        let Self {
            simplex,
            values,
            sort_perm,
            centroid,
            reflection,
            expansion,
            contraction,
            ..
        } = self;

        let n = f.dim();

        if simplex.is_empty() {
            // Simplex initialization.
            values.push(f.apply(x));
            simplex.push(x.clone_owned());

            for j in 0..n {
                let mut xi = x.clone_owned();
                xi[j] += initial_step;

                values.push(f.apply(&xi));
                simplex.push(xi);
            }

            let invalid_count = values.iter().filter(|v| !v.is_finite()).count();

            if invalid_count >= simplex.len() / 2 && invalid_count > 0 {
                // The simplex is too degenerate.
                debug!(
                    "{} out of {} points in simplex have invalid value, returning error",
                    invalid_count,
                    simplex.len()
                );
                simplex.clear();
                values.clear();
                return Err(NelderMeadError::SimplexInvalid);
            }

            values.iter_mut().for_each(|v| *v = nan_to_inf(*v));

            sort_perm.extend(0..=n);
            sort_by_values(sort_perm, values);
        }

        // Calculate the centroid of all points except the worst.
        centroid.fill(0.0);
        (0..n)
            .map(|i| &simplex[sort_perm[i]])
            .for_each(|xi| *centroid += xi);
        *centroid /= n as f64;

        debug!("centroid of simplex: {:?}", centroid.as_slice());

        let best = sort_perm[0];
        let worst = sort_perm[n];
        let second_worst = sort_perm[n.saturating_sub(1)];

        // Perform one of possible simplex transformations.
        on_line(reflection, centroid, &simplex[worst], reflection_coeff);
        let reflection_value = nan_to_inf(f.apply(reflection));

        #[allow(clippy::suspicious_else_formatting)]
        let transformation = if values[best] <= reflection_value
            && reflection_value < values[second_worst]
        {
            // Reflected point is neither best nor worst in the new simplex.
            // Just replace the worst point.
            simplex[worst].copy_from(reflection);
            values[worst] = reflection_value;
            Transformation::Reflection
        } else if reflection_value < values[best] {
            // Reflected point is better than the current best. Try to go
            // farther along this direction.
            on_line(expansion, centroid, &simplex[worst], expansion_coeff);
            let expansion_value = nan_to_inf(f.apply(expansion));

            if expansion_value < reflection_value {
                simplex[worst].copy_from(expansion);
                values[worst] = expansion_value;
                Transformation::Expansion
            } else {
                simplex[worst].copy_from(reflection);
                values[worst] = reflection_value;
                Transformation::Reflection
            }
        } else
        /* reflection_value >= values[second_worst] */
        {
            // Reflected point is still worse than the second to last point. Try
            // to do a contraction.
            let contracted = if reflection_value < values[worst] {
                on_line(contraction, centroid, &simplex[worst], outer_contraction_coeff);
                let contraction_value = nan_to_inf(f.apply(contraction));

                if contraction_value <= reflection_value {
                    simplex[worst].copy_from(contraction);
                    values[worst] = contraction_value;
                    Some(Transformation::OuterContraction)
                } else {
                    None
                }
            } else {
                on_line(contraction, centroid, &simplex[worst], inner_contraction_coeff);
                let contraction_value = nan_to_inf(f.apply(contraction));

                if contraction_value <= values[worst] {
                    simplex[worst].copy_from(contraction);
                    values[worst] = contraction_value;
                    Some(Transformation::InnerContraction)
                } else {
                    None
                }
            };

            match contracted {
                Some(transformation) => transformation,
                None => {
                    // Neither outside nor inside contraction was acceptable.
                    // Shrink the simplex towards the best point.
                    contraction.copy_from(&simplex[best]);

                    for &i in sort_perm.iter().skip(1) {
                        let xi = &mut simplex[i];
                        shrink_towards(xi, contraction, shrink_coeff);
                        values[i] = nan_to_inf(f.apply(xi));
                    }

                    Transformation::Shrinkage
                }
            }
        };

        // Establish the ordering of simplex points.
        sort_by_values(sort_perm, values);

        let best = sort_perm[0];
        let worst = sort_perm[n];

        debug!(
            "performed {},\tfx = {} - {}",
            transformation.as_str(),
            values[best],
            values[worst]
        );

        // Return the best simplex point.
        x.copy_from(&simplex[best]);

        if transformation == Transformation::Shrinkage
            || transformation == Transformation::InnerContraction
        {
            // Check whether the simplex collapsed or not. It can happen only
            // when shrinkage or, when n = 1, inner contraction is performed,
            // because otherwise a value reduction was achieved. The criterion
            // follows "Less is more: Simplified Nelder-Mead method for large
            // unconstrained optimization".
            let eps = f64::EPSILON.sqrt();

            let numer = (values[worst] - values[best]) * 2.0;
            let denom = values[worst].abs() + values[best].abs() + eps;

            if numer / denom <= eps {
                debug!("simplex collapsed: {} / {} <= {}", numer, denom, eps);
                return Err(NelderMeadError::SimplexCollapsed);
            }
        }

        Ok(values[best])
    }
}

fn sort_by_values(sort_perm: &mut [usize], values: &[f64]) {
    sort_perm.sort_by(|a, b| {
        values[*a]
            .partial_cmp(&values[*b])
            .unwrap_or(Ordering::Equal)
    });
}

// Computes `from + t (to - from)`.
fn on_line<Sfrom, Sto>(
    out: &mut DVector<f64>,
    from: &Vector<f64, Dyn, Sfrom>,
    to: &Vector<f64, Dyn, Sto>,
    t: f64,
) where
    Sfrom: Storage<f64, Dyn>,
    Sto: Storage<f64, Dyn>,
{
    to.sub_to(from, out);
    *out *= t;
    *out += from;
}

// Moves `x` to `best + s (x - best)`.
fn shrink_towards(x: &mut DVector<f64>, best: &DVector<f64>, s: f64) {
    *x -= best;
    *x *= s;
    *x += best;
}

fn nan_to_inf(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        // Not finite also covers NaN and negative infinity.
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn rosenbrock() {
        let f = ExtendedRosenbrock::new(2);
        let eps = 1e-10;

        for x in f.initials() {
            let minimizer = NelderMead::new(&f);
            let x = optimize(&f, minimizer, x, 0.0, 1000, eps).unwrap();
            assert!(f.is_optimum(&x, 1e-4));
        }
    }

    #[test]
    fn univariate_optimization() {
        let f = Sphere::new(1);
        let eps = 1e-3;

        for x in f.initials() {
            let minimizer = NelderMead::new(&f);
            optimize(&f, minimizer, x, 0.0, 50, eps).unwrap();
        }
    }

    #[test]
    fn balanced_coefficients() {
        let f = Sphere::new(4);
        let mut options = NelderMeadOptions::default();
        options.set_family(CoefficientsFamily::Balanced);

        let minimizer = NelderMead::with_options(&f, options);
        assert!(minimizer.options.expansion_coeff() > -2.0);

        let eps = 1e-6;
        for x in f.initials() {
            let minimizer = NelderMead::with_options(&f, minimizer.options.clone());
            optimize(&f, minimizer, x, 0.0, 2000, eps).unwrap();
        }
    }

    #[test]
    fn invalid_simplex() {
        let f = LogBarrier;
        let minimizer = NelderMead::new(&f);

        // All vertices of the initial simplex are outside of the domain of
        // logarithm.
        assert!(matches!(
            optimize(&f, minimizer, dvector![-0.5, -0.5], 0.0, 10, 1e-6),
            Err(TestingError::Inner(NelderMeadError::SimplexInvalid))
        ));
    }

    #[test]
    fn spread_is_reported() {
        let f = Sphere::new(2);
        let mut minimizer = NelderMead::new(&f);
        assert!(minimizer.value_spread().is_infinite());

        let mut x = dvector![1.0, 1.0];
        minimizer.opt_next(&f, &mut x).unwrap();
        assert!(minimizer.value_spread().is_finite());
    }
}
