use std::fmt;

use getset::{CopyGetters, Getters};
use thiserror::Error;

use crate::symbolic::{EvalError, ParseError, SolveError};

use super::problem::{ConstraintKind, Point};

/// Optimization method.
///
/// The order of variants is the order in which the methods are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    /// Gradient descent with fixed learning rate.
    GradientDescent,
    /// Lagrange multipliers for equality constraints.
    Lagrange,
    /// Analytic solution of the first-order optimality condition.
    PartialDerivatives,
    /// BFGS quasi-Newton minimization without constraints.
    Unconstrained,
    /// Augmented Lagrangian minimization with constraints.
    Constrained,
}

impl Method {
    /// Short machine-friendly name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            Method::GradientDescent => "gradient_descent",
            Method::Lagrange => "lagrange",
            Method::PartialDerivatives => "partial_derivatives",
            Method::Unconstrained => "numerical_unconstrained",
            Method::Constrained => "numerical_constrained",
        }
    }

    /// Kind of a constraint written without any relational operator. The
    /// constrained numerical method reads it as `expr <= 0`, the other
    /// methods as `expr == 0`.
    pub fn bare_constraint_kind(&self) -> ConstraintKind {
        match self {
            Method::Constrained => ConstraintKind::Inequality,
            _ => ConstraintKind::Equality,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Method::GradientDescent => "Gradient Descent",
            Method::Lagrange => "Lagrange Multipliers",
            Method::PartialDerivatives => "Partial Derivatives",
            Method::Unconstrained => "Numerical (unconstrained)",
            Method::Constrained => "Numerical (constrained)",
        };
        f.write_str(label)
    }
}

/// Error of an optimization method.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    /// Objective or constraint could not be parsed.
    #[error("invalid expression: {0}")]
    Parse(#[from] ParseError),
    /// Expression could not be evaluated.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
    /// The system of optimality conditions has no solution.
    #[error("{0}")]
    UnsolvableSystem(String),
    /// Solutions were found but none of them binds every variable of the
    /// objective.
    #[error("no solution determines all variables of the objective")]
    IncompleteBinding,
    /// The method needs constraints but none were given.
    #[error("method requires at least one constraint")]
    MissingConstraints,
    /// The method cannot handle given constraint.
    #[error("constraint `{0}` is not supported by the method")]
    UnsupportedConstraint(String),
    /// The iteration produced NaN or infinity.
    #[error("iteration diverged to a non-finite value")]
    NonFinite,
    /// Invalid setting of the method.
    #[error("invalid option: {0}")]
    InvalidOption(String),
    /// The equation solver failed.
    #[error("{0}")]
    Solve(#[from] SolveError),
}

/// Optimal point and the objective value in it.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Optimum {
    /// Values of the objective variables.
    #[getset(get = "pub")]
    point: Point,
    /// Objective value.
    #[getset(get_copy = "pub")]
    value: f64,
}

impl Optimum {
    /// Creates the optimum.
    pub fn new(point: Point, value: f64) -> Self {
        Self { point, value }
    }
}

/// Successful outcome of [`Optimizer::minimize`](super::Optimizer::minimize).
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The optimum found.
    pub optimum: Optimum,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Whether the convergence criterion was met. `None` for analytic
    /// methods.
    pub converged: Option<bool>,
}

impl Solution {
    /// Solution of an analytic method, which takes exactly one iteration.
    pub fn analytic(optimum: Optimum) -> Self {
        Self {
            optimum,
            iterations: 1,
            converged: None,
        }
    }
}

/// Normalized result of an optimization method.
///
/// The optimal point and value are available if and only if the method did
/// not fail.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct OptimizationResult {
    /// The method that produced the result.
    #[getset(get_copy = "pub")]
    method: Method,
    /// Optimum or the error.
    #[getset(get = "pub")]
    outcome: Result<Optimum, MethodError>,
    /// Number of iterations performed.
    #[getset(get_copy = "pub")]
    iterations: usize,
    /// Wall-clock time of the computation in seconds.
    #[getset(get_copy = "pub")]
    computation_time: f64,
    /// Whether the convergence criterion was met. `None` for analytic
    /// methods.
    #[getset(get_copy = "pub")]
    converged: Option<bool>,
}

impl OptimizationResult {
    pub(crate) fn new(
        method: Method,
        outcome: Result<Solution, MethodError>,
        computation_time: f64,
    ) -> Self {
        match outcome {
            Ok(Solution {
                optimum,
                iterations,
                converged,
            }) => Self {
                method,
                outcome: Ok(optimum),
                iterations,
                computation_time,
                converged,
            },
            Err(error) => Self {
                method,
                outcome: Err(error),
                iterations: 0,
                computation_time,
                converged: None,
            },
        }
    }

    /// Optimal point, unavailable on error.
    pub fn optimal_point(&self) -> Option<&Point> {
        self.outcome.as_ref().ok().map(Optimum::point)
    }

    /// Optimal objective value, unavailable on error.
    pub fn optimal_value(&self) -> Option<f64> {
        self.outcome.as_ref().ok().map(Optimum::value)
    }

    /// The error of the method, if any.
    pub fn error(&self) -> Option<&MethodError> {
        self.outcome.as_ref().err()
    }

    /// Returns true if the method succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_makes_optimum_unavailable() {
        let result = OptimizationResult::new(
            Method::Lagrange,
            Err(MethodError::MissingConstraints),
            0.0,
        );

        assert!(result.optimal_point().is_none());
        assert!(result.optimal_value().is_none());
        assert_eq!(result.error(), Some(&MethodError::MissingConstraints));
        assert_eq!(result.iterations(), 0);
        assert_eq!(result.converged(), None);
    }

    #[test]
    fn success_exposes_optimum() {
        let point: Point = [("x".to_string(), 1.0)].into();
        let result = OptimizationResult::new(
            Method::GradientDescent,
            Ok(Solution {
                optimum: Optimum::new(point.clone(), 2.0),
                iterations: 12,
                converged: Some(true),
            }),
            0.5,
        );

        assert_eq!(result.optimal_point(), Some(&point));
        assert_eq!(result.optimal_value(), Some(2.0));
        assert!(result.error().is_none());
        assert_eq!(result.iterations(), 12);
        assert_eq!(result.converged(), Some(true));
        assert_eq!(result.computation_time(), 0.5);
    }

    #[test]
    fn methods_are_ordered_for_reporting() {
        let mut methods = vec![
            Method::Constrained,
            Method::PartialDerivatives,
            Method::GradientDescent,
            Method::Lagrange,
        ];
        methods.sort();

        assert_eq!(
            methods,
            vec![
                Method::GradientDescent,
                Method::Lagrange,
                Method::PartialDerivatives,
                Method::Constrained
            ]
        );
    }
}
