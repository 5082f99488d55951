//! Symbolic expressions and the operations on them.
//!
//! This is the expression service used by all optimization methods: text is
//! [parsed](parse) into an immutable [`Expr`] tree which can be
//! [differentiated](differentiate), [substituted](substitute) or
//! [compiled](to_numeric_function) into a closure over `f64` values. Systems of
//! equations are solved by [`solve_system`] which returns every solution found
//! as a sequence of [`Point`]s.
//!
//! ```rust
//! use optcalc::symbolic::{free_variables, gradient, parse, solve_system};
//!
//! let f = parse("x^2 + 2x*y + 3y^2 - 4x").unwrap();
//! let vars = free_variables(&f);
//! assert_eq!(vars, vec!["x", "y"]);
//!
//! let critical = solve_system(&gradient(&f, &vars), &vars).unwrap();
//! assert_eq!(critical.len(), 1);
//! assert!((critical[0]["x"] - 3.0).abs() < 1e-9);
//! assert!((critical[0]["y"] + 1.0).abs() < 1e-9);
//! ```

mod diff;
mod expr;
mod lambdify;
mod parse;
mod solve;

pub use diff::{differentiate, gradient, hessian};
pub use expr::{EvalError, Expr, Func, Substitution};
pub use lambdify::{to_numeric_function, CompiledFunction, CompiledSystem, NumericFunction};
pub use parse::{parse, ParseError};
pub use solve::{solve_system, solve_system_with_options, SolveError, SolveOptions};

pub use crate::core::Point;

/// Returns the free variables of the expression sorted by name. This is the
/// canonical variable order.
pub fn free_variables(expr: &Expr) -> Vec<String> {
    expr.free_variables()
}

/// Substitutes the values of the point into the expression. The result is a
/// number if every variable is bound, otherwise the simplified residual
/// expression.
pub fn substitute(expr: &Expr, point: &Point) -> Substitution {
    expr.substitute(point)
}
