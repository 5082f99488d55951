//! Description of an optimization problem as entered by the user.

use std::collections::BTreeMap;
use std::fmt;

use getset::{CopyGetters, Getters};

use crate::compare::MethodSelector;
use crate::symbolic::{parse, EvalError, Expr, ParseError};

use super::result::MethodError;

/// Assignment of values to variables.
///
/// The iteration order of the map (lexicographic by name) is the canonical
/// variable order used throughout the crate.
pub type Point = BTreeMap<String, f64>;

/// Kind of a constraint in its zero form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// `h(x) = 0`
    Equality,
    /// `g(x) <= 0`
    Inequality,
}

/// Relational operator of a constraint as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `==` or `=`
    Eq,
    /// `<=` or `<`
    Le,
    /// `>=` or `>`
    Ge,
}

impl Relation {
    fn symbol(&self) -> &'static str {
        match self {
            Relation::Eq => "==",
            Relation::Le => "<=",
            Relation::Ge => ">=",
        }
    }
}

/// A constraint parsed from `lhs <op> rhs`, stored in zero form.
///
/// Equalities are stored as `h = lhs - rhs`. Inequalities are normalized to
/// `g <= 0`, i.e., `lhs <= rhs` becomes `g = lhs - rhs` and `lhs >= rhs`
/// becomes `g = rhs - lhs`. Strict operators are treated as their non-strict
/// counterparts. A bare expression without any operator means `expr == 0`
/// unless parsed by [`Constraint::parse_with_default`] with
/// [`ConstraintKind::Inequality`], in which case it means `expr <= 0`.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Constraint {
    /// The constraint as written by the user.
    #[getset(get = "pub")]
    source: String,
    /// The relational operator.
    #[getset(get_copy = "pub")]
    relation: Relation,
    /// The zero-form expression (`h` or `g`).
    #[getset(get = "pub")]
    residual: Expr,
}

const OPERATORS: [(&str, Relation); 6] = [
    ("==", Relation::Eq),
    ("<=", Relation::Le),
    (">=", Relation::Ge),
    ("=", Relation::Eq),
    ("<", Relation::Le),
    (">", Relation::Ge),
];

impl Constraint {
    /// Parses a constraint.
    ///
    /// ```rust
    /// use optcalc::{Constraint, ConstraintKind};
    ///
    /// let c = Constraint::parse("x + y >= 1").unwrap();
    /// assert_eq!(c.kind(), ConstraintKind::Inequality);
    /// assert_eq!(c.residual().to_string(), "(1 - (x + y))");
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Self::parse_with_default(text, ConstraintKind::Equality)
    }

    /// Parses a constraint, a bare expression without any operator is of
    /// given kind.
    ///
    /// ```rust
    /// use optcalc::{Constraint, ConstraintKind};
    ///
    /// let c = Constraint::parse_with_default("x - 1", ConstraintKind::Inequality).unwrap();
    /// assert_eq!(c.kind(), ConstraintKind::Inequality);
    /// ```
    pub fn parse_with_default(text: &str, bare: ConstraintKind) -> Result<Self, ParseError> {
        let source = text.trim().to_string();

        let (relation, residual) = match find_operator(&source)? {
            None => {
                let relation = match bare {
                    ConstraintKind::Equality => Relation::Eq,
                    ConstraintKind::Inequality => Relation::Le,
                };
                (relation, parse(&source)?)
            }
            Some((at, op, relation)) => {
                let lhs = parse(&source[..at])?;
                let rhs = parse(&source[at + op.len()..])?;

                let residual = match relation {
                    Relation::Eq | Relation::Le => lhs - rhs,
                    Relation::Ge => rhs - lhs,
                };

                (relation, residual)
            }
        };

        Ok(Self {
            source,
            relation,
            residual: residual.simplify(),
        })
    }

    /// Kind of the constraint.
    pub fn kind(&self) -> ConstraintKind {
        match self.relation {
            Relation::Eq => ConstraintKind::Equality,
            Relation::Le | Relation::Ge => ConstraintKind::Inequality,
        }
    }

    /// Returns true if the constraint is an equality.
    pub fn is_equality(&self) -> bool {
        self.kind() == ConstraintKind::Equality
    }

    /// Computes the violation of the constraint in given point. It is `|h|`
    /// for equalities and `max(0, g)` for inequalities.
    pub fn violation(&self, point: &Point) -> Result<f64, EvalError> {
        let value = self.residual.eval(point)?;

        Ok(match self.kind() {
            ConstraintKind::Equality => value.abs(),
            ConstraintKind::Inequality => value.max(0.0),
        })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ConstraintKind::Equality => write!(f, "{} == 0", self.residual),
            ConstraintKind::Inequality => write!(f, "{} <= 0", self.residual),
        }
    }
}

fn find_operator(text: &str) -> Result<Option<(usize, &'static str, Relation)>, ParseError> {
    let mut found = None;
    let mut at = 0;

    while at < text.len() {
        let matched = OPERATORS
            .iter()
            .find(|(op, _)| text[at..].starts_with(op));

        match (matched, found) {
            (Some(&(op, relation)), None) => {
                found = Some((at, op, relation));
                at += op.len();
            }
            (Some(&(_, relation)), Some(_)) => {
                return Err(ParseError::new(
                    format!("constraint contains more than one relation (`{}`)", relation.symbol()),
                    at,
                ));
            }
            (None, _) => {
                at += text[at..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    Ok(found)
}

/// Splits constraints separated by `;` and drops empty entries.
///
/// ```rust
/// use optcalc::split_constraints;
///
/// assert_eq!(split_constraints("x + y == 1; ; x >= 0"), vec!["x + y == 1", "x >= 0"]);
/// ```
pub fn split_constraints(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a point written as comma-separated assignments such as
/// `"x=1, y=2.5"`. Empty input gives an empty point.
pub fn parse_point(text: &str) -> Result<Point, ParseError> {
    let mut point = Point::new();
    let mut offset = 0;

    for item in text.split(',') {
        let trimmed = item.trim();

        if !trimmed.is_empty() {
            let (name, value) = trimmed.split_once('=').ok_or_else(|| {
                ParseError::new(format!("expected `name=value`, found `{}`", trimmed), offset)
            })?;

            let name = name.trim();
            let valid_name = name
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

            if !valid_name {
                return Err(ParseError::new(
                    format!("invalid variable name `{}`", name),
                    offset,
                ));
            }

            let value = value.trim().parse::<f64>().map_err(|_| {
                ParseError::new(format!("invalid value `{}`", value.trim()), offset)
            })?;

            point.insert(name.to_string(), value);
        }

        offset += item.len() + 1;
    }

    Ok(point)
}

/// Input of the optimization methods.
///
/// ```rust
/// use optcalc::{MethodSelector, Problem};
///
/// let problem = Problem::new("x^2 + y^2")
///     .with_constraint("x + y == 1")
///     .with_tolerance(1e-8)
///     .with_method(MethodSelector::Lagrange);
///
/// assert_eq!(problem.constraints().len(), 1);
/// assert_eq!(problem.max_iterations(), 1000);
/// ```
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Problem {
    /// Objective function to be minimized.
    #[getset(get = "pub")]
    objective: String,
    /// Constraints, possibly empty.
    #[getset(get = "pub")]
    constraints: Vec<String>,
    /// Initial point for iterative methods. Missing variables start at zero.
    #[getset(get = "pub")]
    initial_point: Point,
    /// Learning rate of gradient descent. Default: `0.01`.
    #[getset(get_copy = "pub")]
    learning_rate: f64,
    /// Iteration cap of iterative methods. Default: `1000`.
    #[getset(get_copy = "pub")]
    max_iterations: usize,
    /// Convergence tolerance of iterative methods. Default: `1e-6`.
    #[getset(get_copy = "pub")]
    tolerance: f64,
    /// Which methods to run. Default: all.
    #[getset(get_copy = "pub")]
    method: MethodSelector,
}

impl Problem {
    /// Creates a problem with given objective and default settings.
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            constraints: Vec::new(),
            initial_point: Point::new(),
            learning_rate: 0.01,
            max_iterations: 1000,
            tolerance: 1e-6,
            method: MethodSelector::All,
        }
    }

    /// Adds a constraint.
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Adds multiple constraints.
    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints
            .extend(constraints.into_iter().map(Into::into));
        self
    }

    /// Sets the initial point.
    pub fn with_initial_point(mut self, initial_point: Point) -> Self {
        self.initial_point = initial_point;
        self
    }

    /// Sets the learning rate of gradient descent.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets which methods are run by the comparator.
    pub fn with_method(mut self, method: MethodSelector) -> Self {
        self.method = method;
        self
    }

    /// Returns true if any constraint was given.
    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    /// Parses the objective function.
    pub fn parse_objective(&self) -> Result<Expr, MethodError> {
        Ok(parse(&self.objective)?)
    }

    /// Parses all constraints, bare expressions are equalities.
    pub fn parse_constraints(&self) -> Result<Vec<Constraint>, MethodError> {
        self.parse_constraints_as(ConstraintKind::Equality)
    }

    /// Parses all constraints, bare expressions are of given kind.
    pub fn parse_constraints_as(
        &self,
        bare: ConstraintKind,
    ) -> Result<Vec<Constraint>, MethodError> {
        self.constraints
            .iter()
            .map(|c| Constraint::parse_with_default(c, bare).map_err(MethodError::from))
            .collect()
    }

    /// Validates the settings of iterative methods.
    pub(crate) fn check_iteration_options(&self) -> Result<(), MethodError> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MethodError::InvalidOption(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if self.max_iterations == 0 {
            return Err(MethodError::InvalidOption(
                "maximum number of iterations must be positive".to_string(),
            ));
        }

        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(MethodError::InvalidOption(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn constraint_forms() {
        let at = point(&[("x", 2.0), ("y", 3.0)]);

        let c = Constraint::parse("x + y == 5").unwrap();
        assert!(c.is_equality());
        assert_eq!(c.residual().eval(&at), Ok(0.0));

        let c = Constraint::parse("x = y").unwrap();
        assert!(c.is_equality());
        assert_eq!(c.residual().eval(&at), Ok(-1.0));

        let c = Constraint::parse("x * y").unwrap();
        assert!(c.is_equality());
        assert_eq!(c.residual().eval(&at), Ok(6.0));

        let c = Constraint::parse_with_default("x - 1", ConstraintKind::Inequality).unwrap();
        assert_eq!(c.relation(), Relation::Le);
        assert_eq!(c.residual().eval(&at), Ok(1.0));
        assert_eq!(c.violation(&at), Ok(1.0));

        let c = Constraint::parse_with_default("x == 2", ConstraintKind::Inequality).unwrap();
        assert!(c.is_equality());

        let c = Constraint::parse("x <= 1").unwrap();
        assert_eq!(c.kind(), ConstraintKind::Inequality);
        assert_eq!(c.residual().eval(&at), Ok(1.0));
        assert_eq!(c.violation(&at), Ok(1.0));

        let c = Constraint::parse("x > 1").unwrap();
        assert_eq!(c.relation(), Relation::Ge);
        assert_eq!(c.residual().eval(&at), Ok(-1.0));
        assert_eq!(c.violation(&at), Ok(0.0));
    }

    #[test]
    fn constraint_errors() {
        assert!(Constraint::parse("x == ").is_err());
        assert!(Constraint::parse("0 <= x <= 1").is_err());
        assert!(Constraint::parse("").is_err());
    }

    #[test]
    fn points() {
        assert_eq!(
            parse_point("x=1, y = -2.5").unwrap(),
            point(&[("x", 1.0), ("y", -2.5)])
        );
        assert_eq!(parse_point("  ").unwrap(), Point::new());
        assert!(parse_point("x").is_err());
        assert!(parse_point("1x=2").is_err());
        assert!(parse_point("x=abc").is_err());
    }

    #[test]
    fn iteration_options() {
        assert!(Problem::new("x").check_iteration_options().is_ok());
        assert!(Problem::new("x")
            .with_learning_rate(0.0)
            .check_iteration_options()
            .is_err());
        assert!(Problem::new("x")
            .with_max_iterations(0)
            .check_iteration_options()
            .is_err());
        assert!(Problem::new("x")
            .with_tolerance(f64::NAN)
            .check_iteration_options()
            .is_err());
    }
}
