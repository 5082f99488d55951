//! Lagrange multipliers for equality constraints.
//!
//! For constraints `hᵢ(x) = 0`, the Lagrangian `L = f + Σ λᵢ hᵢ` is built with
//! one fresh multiplier per constraint and its stationarity system
//! `∇L = 0` (with respect to both the variables and the multipliers) is solved
//! symbolically. Among the solutions that determine every variable of the
//! objective, the one with the smallest objective value is reported.

use std::collections::BTreeSet;

use log::debug;

use crate::core::{Method, MethodError, Optimizer, Problem, Solution};
use crate::symbolic::{gradient, solve_system, Expr};

use super::{select_minimum, union_variables};

/// Lagrange multipliers method.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lagrange;

/// Returns `count` multiplier names `lambda_0`, `lambda_1`, ... that do not
/// clash with any of the taken names.
fn multiplier_names(count: usize, taken: &BTreeSet<String>) -> Vec<String> {
    (0..count)
        .map(|i| {
            let mut name = format!("lambda_{}", i);
            while taken.contains(&name) {
                name.push('_');
            }
            name
        })
        .collect()
}

impl Optimizer for Lagrange {
    fn method(&self) -> Method {
        Method::Lagrange
    }

    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError> {
        if !problem.has_constraints() {
            return Err(MethodError::MissingConstraints);
        }

        let objective = problem.parse_objective()?;
        let constraints = problem.parse_constraints()?;

        if let Some(inequality) = constraints.iter().find(|c| !c.is_equality()) {
            return Err(MethodError::UnsupportedConstraint(
                inequality.source().clone(),
            ));
        }

        let objective_vars = objective.free_variables();
        let vars = union_variables(
            std::iter::once(&objective).chain(constraints.iter().map(|c| c.residual())),
        );

        let multipliers = multiplier_names(constraints.len(), &vars.iter().cloned().collect());

        let lagrangian = constraints
            .iter()
            .zip(multipliers.iter())
            .fold(objective.clone(), |lagrangian, (constraint, multiplier)| {
                lagrangian + Expr::var(multiplier.as_str()) * constraint.residual().clone()
            });

        debug!("Lagrangian: {}", lagrangian);

        let unknowns = vars
            .iter()
            .chain(multipliers.iter())
            .cloned()
            .collect::<Vec<_>>();

        let equations = gradient(&lagrangian, &unknowns);
        let solutions = solve_system(&equations, &unknowns)?;

        if solutions.is_empty() {
            return Err(MethodError::UnsolvableSystem(
                "the system of Lagrange conditions has no solution".to_string(),
            ));
        }

        select_minimum(&objective, &solutions, &objective_vars).map(Solution::analytic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn circle_distance() {
        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let result = Lagrange.solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(point["y"], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(result.optimal_value().unwrap(), 0.5, epsilon = 1e-9);
        assert_eq!(result.iterations(), 1);
    }

    #[test]
    fn multipliers_are_not_reported() {
        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let result = Lagrange.solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_eq!(point.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn linear_objective_on_circle() {
        let problem = Problem::new("x + y").with_constraint("x^2 + y^2 = 1");
        let result = Lagrange.solve(&problem);
        let point = result.optimal_point().unwrap();
        let s = std::f64::consts::FRAC_1_SQRT_2;

        assert_abs_diff_eq!(point["x"], -s, epsilon = 1e-8);
        assert_abs_diff_eq!(point["y"], -s, epsilon = 1e-8);
        assert_abs_diff_eq!(
            result.optimal_value().unwrap(),
            -std::f64::consts::SQRT_2,
            epsilon = 1e-8
        );
    }

    #[test]
    fn two_constraints() {
        let problem = Problem::new("x^2 + y^2 + z^2")
            .with_constraints(["x + y + z == 3", "x - y == 0"]);
        let result = Lagrange.solve(&problem);
        let point = result.optimal_point().unwrap();

        for var in ["x", "y", "z"] {
            assert_abs_diff_eq!(point[var], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn missing_constraints() {
        let result = Lagrange.solve(&Problem::new("x^2 + y^2"));

        assert_eq!(result.error(), Some(&MethodError::MissingConstraints));
        assert!(result.optimal_point().is_none());
        assert!(result.optimal_value().is_none());
    }

    #[test]
    fn inequality_is_unsupported() {
        let problem = Problem::new("x^2").with_constraint("x >= 1");

        assert_eq!(
            Lagrange.solve(&problem).error(),
            Some(&MethodError::UnsupportedConstraint("x >= 1".to_string()))
        );
    }

    #[test]
    fn infeasible_constraints() {
        let problem = Problem::new("x^2").with_constraints(["x == 1", "x == 2"]);

        assert!(matches!(
            Lagrange.solve(&problem).error(),
            Some(MethodError::UnsolvableSystem(_))
        ));
    }

    #[test]
    fn undetermined_variables() {
        // The objective is constant along the constraint.
        let problem = Problem::new("x + y").with_constraint("x + y == 1");

        assert_eq!(
            Lagrange.solve(&problem).error(),
            Some(&MethodError::IncompleteBinding)
        );
    }

    #[test]
    fn multiplier_names_are_fresh() {
        let taken = ["lambda_0".to_string(), "x".to_string()].into();

        assert_eq!(multiplier_names(2, &taken), vec!["lambda_0_", "lambda_1"]);
    }
}
