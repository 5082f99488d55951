//! Critical points from the first-order optimality condition.
//!
//! The system `∂f/∂xᵢ = 0` is solved symbolically and the critical point with
//! the smallest objective value is reported. Second-order conditions are not
//! enforced, so the reported point can be a saddle point or even a maximum when
//! no minimum exists. The kind of every critical point is, however, determined
//! from the eigenvalues of the Hessian matrix and logged.

use std::fmt;

use log::debug;
use nalgebra::DMatrix;

use crate::core::{Method, MethodError, Optimizer, Problem, Solution};
use crate::derivatives::Hessian;
use crate::symbolic::{gradient, solve_system};

use super::select_minimum;

/// Partial derivatives method.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialDerivatives;

/// Kind of a critical point determined by the second-order derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalPointKind {
    /// Hessian is positive definite.
    Minimum,
    /// Hessian is negative definite.
    Maximum,
    /// Hessian is indefinite.
    Saddle,
    /// Hessian is singular and the test is inconclusive.
    Degenerate,
}

impl fmt::Display for CriticalPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CriticalPointKind::Minimum => "local minimum",
            CriticalPointKind::Maximum => "local maximum",
            CriticalPointKind::Saddle => "saddle point",
            CriticalPointKind::Degenerate => "degenerate",
        })
    }
}

/// Classifies a critical point by the signs of the eigenvalues of the Hessian
/// matrix evaluated in it.
pub fn classify_critical_point(hessian: &DMatrix<f64>) -> CriticalPointKind {
    let eigenvalues = hessian.clone().symmetric_eigen().eigenvalues;
    let eps = f64::EPSILON.sqrt() * hessian.amax().max(1.0);

    let positive = eigenvalues.iter().filter(|&&e| e > eps).count();
    let negative = eigenvalues.iter().filter(|&&e| e < -eps).count();

    if positive > 0 && negative > 0 {
        CriticalPointKind::Saddle
    } else if positive == eigenvalues.len() {
        CriticalPointKind::Minimum
    } else if negative == eigenvalues.len() {
        CriticalPointKind::Maximum
    } else {
        CriticalPointKind::Degenerate
    }
}

impl Optimizer for PartialDerivatives {
    fn method(&self) -> Method {
        Method::PartialDerivatives
    }

    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError> {
        let objective = problem.parse_objective()?;
        let vars = objective.free_variables();

        if problem.has_constraints() {
            debug!("constraints are ignored by the method");
        }

        let equations = gradient(&objective, &vars);
        let candidates = solve_system(&equations, &vars)?;

        if candidates.is_empty() {
            return Err(MethodError::UnsolvableSystem(
                "no critical point found".to_string(),
            ));
        }

        if !vars.is_empty() {
            let hessian = Hessian::new(&objective, &vars)?;

            for candidate in &candidates {
                if let Some(x) = vars
                    .iter()
                    .map(|var| candidate.get(var).copied())
                    .collect::<Option<Vec<_>>>()
                {
                    let kind = classify_critical_point(&hessian.eval_slice(&x));
                    debug!("critical point {:?} is {}", candidate, kind);
                }
            }
        }

        select_minimum(&objective, &candidates, &vars).map(Solution::analytic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn parabola() {
        let result = PartialDerivatives.solve(&Problem::new("x^2"));

        assert_eq!(result.optimal_point().unwrap()["x"], 0.0);
        assert_eq!(result.optimal_value(), Some(0.0));
        assert_eq!(result.iterations(), 1);
        assert_eq!(result.converged(), None);
    }

    #[test]
    fn minimum_among_critical_points() {
        // Critical points -1, 0, 1; the minima are in -1 and 1 with value -1
        // and the first one found is reported.
        let result = PartialDerivatives.solve(&Problem::new("x^4 - 2x^2"));
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.optimal_value().unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn quadratic_form() {
        let result = PartialDerivatives.solve(&Problem::new("x^2 + x*y + y^2 - 3x"));
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(point["y"], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.optimal_value().unwrap(), -3.0, epsilon = 1e-9);
    }

    #[test]
    fn no_critical_point() {
        let result = PartialDerivatives.solve(&Problem::new("x + y"));

        assert!(matches!(
            result.error(),
            Some(MethodError::UnsolvableSystem(_))
        ));
        assert!(result.optimal_value().is_none());
    }

    #[test]
    fn valley_of_critical_points() {
        // Every point of the line x = -y is critical, none is unique.
        let result = PartialDerivatives.solve(&Problem::new("(x + y)^2"));

        assert_eq!(result.error(), Some(&MethodError::IncompleteBinding));
    }

    #[test]
    fn degenerate_critical_points() {
        for (objective, expected) in [("x^4", 0.0), ("(x - 1)^4", 1.0), ("x^3", 0.0)] {
            let result = PartialDerivatives.solve(&Problem::new(objective));
            let point = result.optimal_point().unwrap();

            assert_abs_diff_eq!(point["x"], expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn non_isolated_critical_points() {
        // Both axes consist of critical points.
        let result = PartialDerivatives.solve(&Problem::new("(x*y)^2"));

        assert_eq!(result.error(), Some(&MethodError::IncompleteBinding));
    }

    #[test]
    fn classification() {
        let hessian = |entries: &[f64]| DMatrix::from_row_slice(2, 2, entries);

        assert_eq!(
            classify_critical_point(&hessian(&[2.0, 0.0, 0.0, 1.0])),
            CriticalPointKind::Minimum
        );
        assert_eq!(
            classify_critical_point(&hessian(&[-2.0, 1.0, 1.0, -2.0])),
            CriticalPointKind::Maximum
        );
        assert_eq!(
            classify_critical_point(&hessian(&[0.0, 1.0, 1.0, 0.0])),
            CriticalPointKind::Saddle
        );
        assert_eq!(
            classify_critical_point(&hessian(&[1.0, 1.0, 1.0, 1.0])),
            CriticalPointKind::Degenerate
        );
    }
}
