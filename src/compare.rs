//! Running several methods on the same problem and comparing their results.
//!
//! The [`Comparator`] runs the methods implied by the [`MethodSelector`] of
//! the problem, each of them independently, so that a failure of one method
//! never prevents the others from being run and reported. When the problem
//! has constraints, every reported optimum is checked against them and the
//! [verdict](ConstraintVerdict) is stored alongside the result.
//!
//! ```rust
//! use optcalc::{compare, Method, Problem};
//!
//! let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
//! let report = compare(&problem);
//!
//! let lagrange = report.get(Method::Lagrange).unwrap();
//! assert!((lagrange.optimal_value().unwrap() - 0.5).abs() < 1e-9);
//! assert!(report.verdict(Method::Lagrange).unwrap().is_satisfied());
//!
//! println!("{}", report);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use getset::Getters;
use log::debug;
use thiserror::Error;

use crate::core::{
    Constraint, ConstraintKind, Method, OptimizationResult, Optimizer, Point, Problem,
};
use crate::methods::{AugmentedLagrangianOptions, Constrained};
use crate::symbolic::{parse, ParseError};

/// Residual threshold under which a constraint is considered satisfied.
pub const CONSTRAINT_EPS: f64 = 1e-6;

/// Selection of methods to be run by the [`Comparator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodSelector {
    /// Gradient descent, Lagrange multipliers, partial derivatives and the
    /// numerical method.
    #[default]
    All,
    /// Gradient descent only.
    Gradient,
    /// Lagrange multipliers only.
    Lagrange,
    /// Partial derivatives only.
    Partial,
    /// The numerical method only. Its constrained variant is used if the
    /// problem has constraints.
    Unconstrained,
    /// The constrained numerical method only.
    Constrained,
}

impl MethodSelector {
    /// Methods to be run for a problem with or without constraints.
    pub fn methods(&self, has_constraints: bool) -> Vec<Method> {
        let numerical = if has_constraints {
            Method::Constrained
        } else {
            Method::Unconstrained
        };

        match self {
            MethodSelector::All => vec![
                Method::GradientDescent,
                Method::Lagrange,
                Method::PartialDerivatives,
                numerical,
            ],
            MethodSelector::Gradient => vec![Method::GradientDescent],
            MethodSelector::Lagrange => vec![Method::Lagrange],
            MethodSelector::Partial => vec![Method::PartialDerivatives],
            MethodSelector::Unconstrained => vec![numerical],
            MethodSelector::Constrained => vec![Method::Constrained],
        }
    }
}

/// Error returned when parsing an unknown [`MethodSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown method `{0}`, expected one of all, gradient, lagrange, partial, unconstrained, constrained (or 1-5)"
)]
pub struct UnknownMethodError(String);

impl FromStr for MethodSelector {
    type Err = UnknownMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "1" => Ok(MethodSelector::All),
            "gradient" | "2" => Ok(MethodSelector::Gradient),
            "lagrange" | "3" => Ok(MethodSelector::Lagrange),
            "partial" | "4" => Ok(MethodSelector::Partial),
            "unconstrained" | "5" => Ok(MethodSelector::Unconstrained),
            "constrained" => Ok(MethodSelector::Constrained),
            _ => Err(UnknownMethodError(s.to_string())),
        }
    }
}

/// Result of checking the constraints in a reported optimum.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintVerdict {
    /// Every constraint is satisfied.
    Satisfied {
        /// The largest violation among the constraints.
        max_residual: f64,
    },
    /// The first constraint that is violated.
    NotSatisfied {
        /// The constraint as written.
        constraint: String,
        /// Its violation.
        residual: f64,
    },
    /// A constraint could not be parsed or evaluated in the point.
    EvaluationError(String),
    /// The method did not report any point.
    NotApplicable,
}

impl ConstraintVerdict {
    /// Returns true if all constraints are satisfied.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConstraintVerdict::Satisfied { .. })
    }
}

impl fmt::Display for ConstraintVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintVerdict::Satisfied { max_residual } => {
                write!(f, "yes (max residual {:.1e})", max_residual)
            }
            ConstraintVerdict::NotSatisfied {
                constraint,
                residual,
            } => write!(f, "no (`{}` violated by {:.1e})", constraint, residual),
            ConstraintVerdict::EvaluationError(message) => {
                write!(f, "evaluation error: {}", message)
            }
            ConstraintVerdict::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// Checks the constraints in given point.
///
/// Equality `h` is satisfied if `|h| < 1e-6`, inequality `g <= 0` if
/// `max(0, g) < 1e-6`. Bare expressions are equalities.
pub fn check_constraints<S: AsRef<str>>(constraints: &[S], point: &Point) -> ConstraintVerdict {
    check_constraints_as(constraints, point, ConstraintKind::Equality)
}

/// Checks the constraints in given point, bare expressions are of given kind.
pub fn check_constraints_as<S: AsRef<str>>(
    constraints: &[S],
    point: &Point,
    bare: ConstraintKind,
) -> ConstraintVerdict {
    let mut max_residual: f64 = 0.0;

    for text in constraints {
        let constraint = match Constraint::parse_with_default(text.as_ref(), bare) {
            Ok(constraint) => constraint,
            Err(error) => return ConstraintVerdict::EvaluationError(error.to_string()),
        };

        let residual = match constraint.violation(point) {
            Ok(residual) => residual,
            Err(error) => return ConstraintVerdict::EvaluationError(error.to_string()),
        };

        if !(residual < CONSTRAINT_EPS) {
            return ConstraintVerdict::NotSatisfied {
                constraint: constraint.source().clone(),
                residual,
            };
        }

        max_residual = max_residual.max(residual);
    }

    ConstraintVerdict::Satisfied { max_residual }
}

/// Runs the selected methods on a problem.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    constrained: AugmentedLagrangianOptions,
}

impl Comparator {
    /// Creates the comparator with default settings of all methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the options of the constrained numerical method.
    pub fn with_constrained_options(mut self, options: AugmentedLagrangianOptions) -> Self {
        self.constrained = options;
        self
    }

    /// Runs the methods selected by the problem and collects the results.
    pub fn compare(&self, problem: &Problem) -> ComparisonReport {
        let methods = problem.method().methods(problem.has_constraints());
        let mut results = BTreeMap::new();
        let mut verdicts = BTreeMap::new();

        for method in methods {
            let result = match method {
                Method::Constrained => {
                    Constrained::with_options(self.constrained.clone()).solve(problem)
                }
                _ => method.solve(problem),
            };

            if problem.has_constraints() {
                let verdict = match result.optimal_point() {
                    Some(point) => check_constraints_as(
                        problem.constraints(),
                        point,
                        method.bare_constraint_kind(),
                    ),
                    None => ConstraintVerdict::NotApplicable,
                };

                debug!("{}: constraints satisfied: {}", method, verdict);
                verdicts.insert(method, verdict);
            }

            results.insert(method, result);
        }

        ComparisonReport { results, verdicts }
    }
}

/// Runs the methods selected by the problem with default settings.
pub fn compare(problem: &Problem) -> ComparisonReport {
    Comparator::default().compare(problem)
}

/// Results of all methods run on a problem.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct ComparisonReport {
    /// Result of every method that was run.
    results: BTreeMap<Method, OptimizationResult>,
    /// Constraint verdict of every method that was run. Empty for problems
    /// without constraints.
    verdicts: BTreeMap<Method, ConstraintVerdict>,
}

impl ComparisonReport {
    /// Result of given method, if it was run.
    pub fn get(&self, method: Method) -> Option<&OptimizationResult> {
        self.results.get(&method)
    }

    /// Constraint verdict of given method, if it was run on a problem with
    /// constraints.
    pub fn verdict(&self, method: Method) -> Option<&ConstraintVerdict> {
        self.verdicts.get(&method)
    }

    /// Number of methods that were run.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no method was run.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Describes how the results can be visualized together with the
    /// objective.
    pub fn plot_request(&self, objective: &str) -> Result<PlotRequest, ParseError> {
        let variables = parse(objective)?.free_variables();

        let markers = || {
            self.results
                .values()
                .filter_map(|result| {
                    let point = result.optimal_point()?;
                    let coords = variables
                        .iter()
                        .map(|var| point.get(var).copied())
                        .collect::<Option<Vec<_>>>()?;

                    Some(PlotMarker {
                        label: result.method().to_string(),
                        point: coords,
                        value: result.optimal_value()?,
                    })
                })
                .collect::<Vec<_>>()
        };

        Ok(match variables.as_slice() {
            [x] => PlotRequest::Curve {
                variable: x.clone(),
                markers: markers(),
            },
            [x, y] => PlotRequest::Surface {
                variables: [x.clone(), y.clone()],
                markers: markers(),
            },
            _ => PlotRequest::Unsupported { variables },
        })
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=<60}", "")?;
        writeln!(f, "Comparison of results")?;
        writeln!(f, "{:=<60}", "")?;

        for (method, result) in &self.results {
            writeln!(f)?;
            writeln!(f, " {}:", method)?;

            match result.outcome() {
                Ok(optimum) => {
                    let point = optimum
                        .point()
                        .iter()
                        .map(|(var, value)| format!("{} = {:.6}", var, value))
                        .collect::<Vec<_>>()
                        .join(", ");

                    writeln!(f, "  optimal point: {{{}}}", point)?;
                    writeln!(f, "  optimal value: {:.6}", optimum.value())?;
                }
                Err(error) => writeln!(f, "  error: {}", error)?,
            }

            writeln!(f, "  iterations: {}", result.iterations())?;
            writeln!(f, "  time: {:.6} s", result.computation_time())?;

            if let Some(converged) = result.converged() {
                writeln!(f, "  converged: {}", if converged { "yes" } else { "no" })?;
            }

            if let Some(verdict) = self.verdicts.get(method) {
                writeln!(f, "  constraints satisfied: {}", verdict)?;
            }
        }

        Ok(())
    }
}

/// Reported optimum of a method to be marked in a plot.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotMarker {
    /// Label of the method.
    pub label: String,
    /// Coordinates in the order of the plotted variables.
    pub point: Vec<f64>,
    /// Objective value.
    pub value: f64,
}

/// Description of a plot of the objective with the optima marked.
///
/// Rendering is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotRequest {
    /// Curve of a function of one variable.
    Curve {
        /// The variable.
        variable: String,
        /// Reported optima.
        markers: Vec<PlotMarker>,
    },
    /// Surface of a function of two variables.
    Surface {
        /// The variables.
        variables: [String; 2],
        /// Reported optima.
        markers: Vec<PlotMarker>,
    },
    /// The function has too many (or no) variables to be plotted.
    Unsupported {
        /// The variables of the function.
        variables: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    use crate::core::MethodError;

    #[test]
    fn selector_from_str() {
        assert_eq!("all".parse(), Ok(MethodSelector::All));
        assert_eq!(" Gradient ".parse(), Ok(MethodSelector::Gradient));
        assert_eq!("3".parse(), Ok(MethodSelector::Lagrange));
        assert_eq!("partial".parse(), Ok(MethodSelector::Partial));
        assert_eq!("5".parse(), Ok(MethodSelector::Unconstrained));
        assert_eq!("constrained".parse(), Ok(MethodSelector::Constrained));
        assert!("newton".parse::<MethodSelector>().is_err());
    }

    #[test]
    fn all_methods_without_constraints() {
        let report = compare(&Problem::new("(x - 1)^2 + (y + 2)^2"));

        assert_eq!(report.len(), 4);
        assert_eq!(
            report.results().keys().copied().collect::<Vec<_>>(),
            vec![
                Method::GradientDescent,
                Method::Lagrange,
                Method::PartialDerivatives,
                Method::Unconstrained
            ]
        );
        assert_eq!(
            report.get(Method::Lagrange).unwrap().error(),
            Some(&MethodError::MissingConstraints)
        );
        assert!(report.get(Method::PartialDerivatives).unwrap().is_ok());
        assert!(report.get(Method::Unconstrained).unwrap().is_ok());
        assert!(report.verdicts().is_empty());
    }

    #[test]
    fn lagrange_satisfies_constraints() {
        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let report = compare(&problem);

        assert!(report.get(Method::Constrained).is_some());
        assert!(report.get(Method::Unconstrained).is_none());

        match report.verdict(Method::Lagrange) {
            Some(ConstraintVerdict::Satisfied { max_residual }) => {
                assert_abs_diff_eq!(*max_residual, 0.0, epsilon = 1e-9)
            }
            other => panic!("unexpected verdict {:?}", other),
        }

        // The unconstrained minimum is in the origin.
        assert_eq!(
            report.verdict(Method::PartialDerivatives),
            Some(&ConstraintVerdict::NotSatisfied {
                constraint: "x + y == 1".to_string(),
                residual: 1.0,
            })
        );
    }

    #[test]
    fn single_method() {
        let problem = Problem::new("x^2").with_method(MethodSelector::Partial);
        let report = compare(&problem);

        assert_eq!(report.len(), 1);
        assert!(report.get(Method::PartialDerivatives).is_some());
    }

    #[test]
    fn numerical_selector_respects_constraints() {
        let problem = Problem::new("x^2")
            .with_constraint("x >= 1")
            .with_method(MethodSelector::Unconstrained);
        let report = compare(&problem);

        assert_eq!(
            report.results().keys().copied().collect::<Vec<_>>(),
            vec![Method::Constrained]
        );
    }

    #[test]
    fn failures_are_isolated() {
        let problem = Problem::new("x^2 +").with_constraint("x == 1");
        let report = compare(&problem);

        assert_eq!(report.len(), 4);

        for (method, result) in report.results() {
            assert!(result.error().is_some());
            assert_eq!(
                report.verdict(*method),
                Some(&ConstraintVerdict::NotApplicable)
            );
        }
    }

    #[test]
    fn constraint_checks() {
        let point: Point = [("x".to_string(), 0.5)].into();

        assert_eq!(
            check_constraints(&["x <= 1"], &point),
            ConstraintVerdict::Satisfied { max_residual: 0.0 }
        );
        assert_eq!(
            check_constraints(&["x >= 1", "x <= 1"], &point),
            ConstraintVerdict::NotSatisfied {
                constraint: "x >= 1".to_string(),
                residual: 0.5,
            }
        );
        assert!(matches!(
            check_constraints(&["x + z == 2"], &point),
            ConstraintVerdict::EvaluationError(_)
        ));

        assert_eq!(
            check_constraints(&["x - 1"], &point),
            ConstraintVerdict::NotSatisfied {
                constraint: "x - 1".to_string(),
                residual: 0.5,
            }
        );
        assert_eq!(
            check_constraints_as(&["x - 1"], &point, ConstraintKind::Inequality),
            ConstraintVerdict::Satisfied { max_residual: 0.0 }
        );
    }

    #[test]
    fn bare_constraint_verdicts_follow_method() {
        let problem = Problem::new("x^2")
            .with_constraint("x - 1")
            .with_method(MethodSelector::All);
        let report = compare(&problem);

        let constrained = report.get(Method::Constrained).unwrap();
        assert_abs_diff_eq!(constrained.optimal_point().unwrap()["x"], 0.0, epsilon = 1e-6);
        assert!(report.verdict(Method::Constrained).unwrap().is_satisfied());

        // Lagrange reads the bare expression as `x - 1 == 0`.
        let lagrange = report.get(Method::Lagrange).unwrap();
        assert_abs_diff_eq!(lagrange.optimal_point().unwrap()["x"], 1.0, epsilon = 1e-9);
        assert!(report.verdict(Method::Lagrange).unwrap().is_satisfied());
    }

    #[test]
    fn plot_requests() {
        let report = compare(&Problem::new("(x - 1)^2").with_method(MethodSelector::Partial));

        match report.plot_request("(x - 1)^2").unwrap() {
            PlotRequest::Curve { variable, markers } => {
                assert_eq!(variable, "x");
                assert_eq!(markers.len(), 1);
                assert_abs_diff_eq!(markers[0].point[0], 1.0, epsilon = 1e-12);
            }
            other => panic!("unexpected request {:?}", other),
        }

        assert_eq!(
            report.plot_request("x + y + z").unwrap(),
            PlotRequest::Unsupported {
                variables: vec!["x".to_string(), "y".to_string(), "z".to_string()]
            }
        );
    }

    #[test]
    fn report_display() {
        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let text = compare(&problem).to_string();

        assert!(text.contains("Lagrange Multipliers"));
        assert!(text.contains("constraints satisfied: yes"));
        assert!(text.contains("Partial Derivatives"));
    }
}
