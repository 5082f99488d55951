//! Symbolic expression tree.
//!
//! An [`Expr`] is an immutable tree over numeric constants, named variables,
//! arithmetic operators and a small set of elementary functions. All
//! transformations (differentiation, substitution, simplification) produce a
//! new tree.

use std::collections::BTreeSet;
use std::fmt;
use std::ops;

use num_traits::{One, ToPrimitive, Zero};
use thiserror::Error;

use crate::core::Point;

/// Elementary function applicable to an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Tangent.
    Tan,
    /// Exponential function.
    Exp,
    /// Natural logarithm.
    Log,
    /// Square root.
    Sqrt,
    /// Absolute value.
    Abs,
}

impl Func {
    /// Looks up a function by its name as written in expressions.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "exp" => Some(Func::Exp),
            "log" | "ln" => Some(Func::Log),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    /// Name of the function as written in expressions.
    pub fn name(&self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
        }
    }

    /// Applies the function to a number.
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Exp => x.exp(),
            Func::Log => x.ln(),
            Func::Sqrt => x.sqrt(),
            Func::Abs => x.abs(),
        }
    }
}

/// Symbolic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric constant.
    Const(f64),
    /// Named variable.
    Var(String),
    /// Unary negation.
    Neg(Box<Expr>),
    /// `lhs + rhs`
    Add(Box<Expr>, Box<Expr>),
    /// `lhs - rhs`
    Sub(Box<Expr>, Box<Expr>),
    /// `lhs * rhs`
    Mul(Box<Expr>, Box<Expr>),
    /// `lhs / rhs`
    Div(Box<Expr>, Box<Expr>),
    /// `base ^ exponent`
    Pow(Box<Expr>, Box<Expr>),
    /// Elementary function call.
    Func(Func, Box<Expr>),
}

/// Error encountered while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The expression references a variable that has no value.
    #[error("variable `{0}` is not bound")]
    UnboundVariable(String),
}

/// Outcome of substituting a (possibly partial) point into an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    /// All variables were bound and the expression evaluated to a number.
    Value(f64),
    /// Some variables remained free; the simplified residual expression.
    Residual(Expr),
}

impl Expr {
    /// Creates a variable.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Creates a constant.
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    /// Raises the expression to given power.
    pub fn pow(self, exponent: Expr) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    /// Applies an elementary function to the expression.
    pub fn apply(self, func: Func) -> Self {
        Expr::Func(func, Box::new(self))
    }

    /// Returns the constant value if the expression is a constant.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns true if the expression is the constant zero.
    pub fn is_zero(&self) -> bool {
        self.as_const().map_or(false, |c| c.is_zero())
    }

    fn is_one(&self) -> bool {
        self.as_const().map_or(false, |c| c.is_one())
    }

    /// Collects names of all variables that occur in the expression, sorted
    /// lexicographically and without duplicates.
    pub fn free_variables(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names.into_iter().collect()
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => {
                names.insert(name.clone());
            }
            Expr::Neg(a) | Expr::Func(_, a) => a.collect_variables(names),
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Pow(a, b) => {
                a.collect_variables(names);
                b.collect_variables(names);
            }
        }
    }

    /// Returns true if the variable occurs in the expression.
    pub fn contains_var(&self, var: &str) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Var(name) => name == var,
            Expr::Neg(a) | Expr::Func(_, a) => a.contains_var(var),
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Pow(a, b) => a.contains_var(var) || b.contains_var(var),
        }
    }

    /// Evaluates the expression in given point.
    ///
    /// Every variable of the expression must be bound in the point. Invalid
    /// operations (division by zero, logarithm of a negative number) follow
    /// IEEE semantics and the caller is responsible for checking finiteness.
    pub fn eval(&self, point: &Point) -> Result<f64, EvalError> {
        let value = match self {
            Expr::Const(c) => *c,
            Expr::Var(name) => *point
                .get(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone()))?,
            Expr::Neg(a) => -a.eval(point)?,
            Expr::Add(a, b) => a.eval(point)? + b.eval(point)?,
            Expr::Sub(a, b) => a.eval(point)? - b.eval(point)?,
            Expr::Mul(a, b) => a.eval(point)? * b.eval(point)?,
            Expr::Div(a, b) => a.eval(point)? / b.eval(point)?,
            Expr::Pow(a, b) => powf(a.eval(point)?, b.eval(point)?),
            Expr::Func(func, a) => func.apply(a.eval(point)?),
        };

        Ok(value)
    }

    /// Substitutes the values of bound variables. If the point binds all
    /// variables of the expression, the numeric value is returned, otherwise
    /// the simplified residual expression.
    pub fn substitute(&self, point: &Point) -> Substitution {
        match self.replace_vars(point).simplify() {
            Expr::Const(value) => Substitution::Value(value),
            residual if residual.free_variables().is_empty() => {
                // Folding stops at non-finite intermediate results, evaluate
                // the rest directly.
                match residual.eval(&Point::new()) {
                    Ok(value) => Substitution::Value(value),
                    Err(_) => Substitution::Residual(residual),
                }
            }
            residual => Substitution::Residual(residual),
        }
    }

    fn replace_vars(&self, point: &Point) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Var(name) => point
                .get(name)
                .map_or_else(|| self.clone(), |value| Expr::Const(*value)),
            Expr::Neg(a) => Expr::Neg(Box::new(a.replace_vars(point))),
            Expr::Func(func, a) => Expr::Func(*func, Box::new(a.replace_vars(point))),
            Expr::Add(a, b) => a.replace_vars(point) + b.replace_vars(point),
            Expr::Sub(a, b) => a.replace_vars(point) - b.replace_vars(point),
            Expr::Mul(a, b) => a.replace_vars(point) * b.replace_vars(point),
            Expr::Div(a, b) => a.replace_vars(point) / b.replace_vars(point),
            Expr::Pow(a, b) => a.replace_vars(point).pow(b.replace_vars(point)),
        }
    }

    /// Simplifies the expression by constant folding and elimination of
    /// neutral and absorbing elements.
    ///
    /// Folding is skipped whenever it would produce a non-finite constant so
    /// that such expressions keep their structure.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Const(_) | Expr::Var(_) => self.clone(),
            Expr::Neg(a) => match a.simplify() {
                Expr::Const(c) => Expr::Const(-c),
                Expr::Neg(inner) => *inner,
                a => Expr::Neg(Box::new(a)),
            },
            Expr::Add(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Const(x), Expr::Const(y)) => fold(x + y, || Expr::Const(x) + Expr::Const(y)),
                (zero, e) | (e, zero) if zero.is_zero() => e,
                (a, Expr::Neg(b)) => Expr::Sub(Box::new(a), b),
                (a, b) => a + b,
            },
            Expr::Sub(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Const(x), Expr::Const(y)) => fold(x - y, || Expr::Const(x) - Expr::Const(y)),
                (e, zero) if zero.is_zero() => e,
                (zero, e) if zero.is_zero() => Expr::Neg(Box::new(e)),
                (a, b) if a == b => Expr::Const(0.0),
                (a, Expr::Neg(b)) => Expr::Add(Box::new(a), b),
                (a, b) => a - b,
            },
            Expr::Mul(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Const(x), Expr::Const(y)) => fold(x * y, || Expr::Const(x) * Expr::Const(y)),
                (zero, _) | (_, zero) if zero.is_zero() => Expr::Const(0.0),
                (one, e) | (e, one) if one.is_one() => e,
                (Expr::Const(m), e) | (e, Expr::Const(m)) if m == -1.0 => Expr::Neg(Box::new(e)),
                (Expr::Const(x), Expr::Mul(inner, e)) if inner.as_const().is_some() => {
                    let y = inner.as_const().unwrap_or(1.0);
                    Expr::Mul(Box::new(Expr::Const(x * y)), e).simplify()
                }
                (e, c @ Expr::Const(_)) => c * e,
                (a, b) => a * b,
            },
            Expr::Div(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Const(x), Expr::Const(y)) => fold(x / y, || Expr::Const(x) / Expr::Const(y)),
                (zero, b) if zero.is_zero() && !b.is_zero() => Expr::Const(0.0),
                (e, one) if one.is_one() => e,
                (a, b) if a == b && !a.is_zero() => Expr::Const(1.0),
                (a, b) => a / b,
            },
            Expr::Pow(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Const(x), Expr::Const(y)) => {
                    fold(powf(x, y), || Expr::Const(x).pow(Expr::Const(y)))
                }
                (_, zero) if zero.is_zero() => Expr::Const(1.0),
                (e, one) if one.is_one() => e,
                (one, _) if one.is_one() => Expr::Const(1.0),
                (a, b) => a.pow(b),
            },
            Expr::Func(func, a) => match a.simplify() {
                Expr::Const(x) => fold(func.apply(x), || Expr::Const(x).apply(*func)),
                a => a.apply(*func),
            },
        }
    }
}

fn fold(value: f64, keep: impl FnOnce() -> Expr) -> Expr {
    if value.is_finite() {
        Expr::Const(value)
    } else {
        keep()
    }
}

/// Power with exact integer exponents where possible.
pub(crate) fn powf(base: f64, exponent: f64) -> f64 {
    match exponent.to_i32() {
        Some(n) if f64::from(n) == exponent => base.powi(n),
        _ => base.powf(exponent),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) if c.is_sign_negative() => write!(f, "({})", c),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Neg(a) => write!(f, "(-{})", a),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "({} * {})", a, b),
            Expr::Div(a, b) => write!(f, "({} / {})", a, b),
            Expr::Pow(a, b) => write!(f, "({} ^ {})", a, b),
            Expr::Func(func, a) => write!(f, "{}({})", func.name(), a),
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn free_variables_are_sorted_and_unique() {
        let e = Expr::var("y") * Expr::var("x") + Expr::var("y").apply(Func::Sin);
        assert_eq!(e.free_variables(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn eval_requires_all_variables() {
        let e = Expr::var("x") + Expr::var("y");
        assert_eq!(e.eval(&point(&[("x", 1.0), ("y", 2.0)])), Ok(3.0));
        assert_eq!(
            e.eval(&point(&[("x", 1.0)])),
            Err(EvalError::UnboundVariable("y".to_string()))
        );
    }

    #[test]
    fn substitute_partial_point() {
        let e = Expr::var("x") * Expr::var("y") + Expr::Const(1.0);

        assert_eq!(
            e.substitute(&point(&[("x", 2.0), ("y", 3.0)])),
            Substitution::Value(7.0)
        );

        match e.substitute(&point(&[("x", 0.0)])) {
            Substitution::Value(value) => assert_eq!(value, 1.0),
            other => panic!("unexpected {:?}", other),
        }

        match e.substitute(&point(&[("x", 2.0)])) {
            Substitution::Residual(residual) => {
                assert_eq!(residual.free_variables(), vec!["y".to_string()])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn simplify_folds_constants() {
        let e = (Expr::Const(2.0) * Expr::Const(3.0) + Expr::var("x") * Expr::Const(0.0))
            .pow(Expr::Const(1.0));
        assert_eq!(e.simplify(), Expr::Const(6.0));

        let e = Expr::var("x") - Expr::var("x");
        assert_eq!(e.simplify(), Expr::Const(0.0));
    }

    #[test]
    fn simplify_keeps_non_finite_structure() {
        let e = Expr::Const(1.0) / Expr::Const(0.0);
        assert_eq!(e.simplify(), e);
    }

    #[test]
    fn integer_powers_are_exact() {
        assert_eq!(powf(-2.0, 3.0), -8.0);
        assert!(powf(-2.0, 0.5).is_nan());
    }
}
