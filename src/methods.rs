//! Implementations of the optimization methods.
//!
//! Every method is a type implementing the [`Optimizer`] trait. The closed set
//! of methods is enumerated by [`Method`], which dispatches to the
//! implementations via [`Method::solve`].
//!
//! ```rust
//! use optcalc::{Method, Problem};
//!
//! let problem = Problem::new("(x - 1)^2 + (y + 2)^2");
//! let result = Method::PartialDerivatives.solve(&problem);
//!
//! assert_eq!(result.optimal_value(), Some(0.0));
//! assert_eq!(result.iterations(), 1);
//! ```

pub mod gradient_descent;
pub mod lagrange;
pub mod numerical;
pub mod partial_derivatives;

pub use gradient_descent::GradientDescent;
pub use lagrange::Lagrange;
pub use numerical::{
    AugmentedLagrangian, AugmentedLagrangianOptions, Constrained, InnerMinimizer, Unconstrained,
};
pub use partial_derivatives::{classify_critical_point, CriticalPointKind, PartialDerivatives};

use std::collections::BTreeSet;

use log::debug;

use crate::core::{Method, MethodError, OptimizationResult, Optimizer, Optimum, Point, Problem};
use crate::symbolic::Expr;

impl Method {
    /// Runs the method on the problem.
    ///
    /// Failures are reported inside the returned record, this function never
    /// fails.
    pub fn solve(&self, problem: &Problem) -> OptimizationResult {
        match self {
            Method::GradientDescent => GradientDescent.solve(problem),
            Method::Lagrange => Lagrange.solve(problem),
            Method::PartialDerivatives => PartialDerivatives.solve(problem),
            Method::Unconstrained => Unconstrained.solve(problem),
            Method::Constrained => Constrained::default().solve(problem),
        }
    }
}

/// Builds the initial vector in given variable order. Missing variables start
/// at zero and values of unknown variables are ignored.
pub(crate) fn initial_vector(initial: &Point, vars: &[String]) -> Vec<f64> {
    for name in initial.keys() {
        if !vars.contains(name) {
            debug!("initial value of unknown variable `{}` is ignored", name);
        }
    }

    vars.iter()
        .map(|var| initial.get(var).copied().unwrap_or(0.0))
        .collect()
}

/// Maps the values of a vector back to the variable names.
pub(crate) fn to_point(vars: &[String], x: &[f64]) -> Point {
    vars.iter().cloned().zip(x.iter().copied()).collect()
}

/// Sorted union of the variables of all given expressions.
pub(crate) fn union_variables<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> Vec<String> {
    exprs
        .into_iter()
        .flat_map(Expr::free_variables)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Selects the candidate with the smallest objective value. Candidates that do
/// not bind every variable are discarded, ties are won by the first candidate.
/// The selected point is restricted to `vars`.
pub(crate) fn select_minimum(
    objective: &Expr,
    candidates: &[Point],
    vars: &[String],
) -> Result<Optimum, MethodError> {
    let mut best: Option<Optimum> = None;
    let mut complete = 0;

    for candidate in candidates {
        let point = match vars
            .iter()
            .map(|var| candidate.get(var).map(|value| (var.clone(), *value)))
            .collect::<Option<Point>>()
        {
            Some(point) => point,
            None => {
                debug!("discard incomplete solution {:?}", candidate);
                continue;
            }
        };

        complete += 1;

        let value = objective.eval(&point)?;

        if !value.is_finite() {
            debug!("discard solution {:?} with value {}", point, value);
            continue;
        }

        debug!("candidate {:?} with value {}", point, value);

        match &best {
            Some(optimum) if value >= optimum.value() => {}
            _ => best = Some(Optimum::new(point, value)),
        }
    }

    match best {
        Some(optimum) => Ok(optimum),
        None if complete == 0 => Err(MethodError::IncompleteBinding),
        None => Err(MethodError::NonFinite),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::symbolic::parse;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn initial_vector_defaults_to_zero() {
        let vars = vec!["x".to_string(), "y".to_string()];
        let initial = point(&[("y", 2.0), ("z", 5.0)]);

        assert_eq!(initial_vector(&initial, &vars), vec![0.0, 2.0]);
    }

    #[test]
    fn minimum_selection() {
        let objective = parse("x^2 + y").unwrap();
        let vars = vec!["x".to_string(), "y".to_string()];

        let candidates = [
            point(&[("x", 2.0), ("y", 0.0)]),
            point(&[("x", 1.0)]),
            point(&[("lambda_0", 3.0), ("x", -1.0), ("y", 1.0)]),
            point(&[("x", 1.0), ("y", 1.0)]),
        ];

        let optimum = select_minimum(&objective, &candidates, &vars).unwrap();
        assert_eq!(optimum.point(), &point(&[("x", -1.0), ("y", 1.0)]));
        assert_eq!(optimum.value(), 2.0);
    }

    #[test]
    fn no_complete_candidate() {
        let objective = parse("x + y").unwrap();
        let vars = vec!["x".to_string(), "y".to_string()];

        assert_eq!(
            select_minimum(&objective, &[point(&[("x", 1.0)])], &vars),
            Err(MethodError::IncompleteBinding)
        );
    }

    #[test]
    fn dispatch_reports_method() {
        let problem = Problem::new("x^2");

        for method in [
            Method::GradientDescent,
            Method::Lagrange,
            Method::PartialDerivatives,
            Method::Unconstrained,
            Method::Constrained,
        ] {
            assert_eq!(method.solve(&problem).method(), method);
        }
    }
}
