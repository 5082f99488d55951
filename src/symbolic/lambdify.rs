//! Compilation of expressions into numeric closures.
//!
//! The expression tree is turned into nested closures once, so repeated
//! evaluations do not need any lookups by variable name. This is the only way
//! how the text entered by a user becomes executable.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, Dyn, IsContiguous, Vector,
};

use crate::core::{Differentiable, Function, NumericProblem, System};
use crate::derivatives::{Gradient, Jacobian};

use super::expr::{powf, EvalError, Expr};

type Compiled = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Expression compiled into a closure over a slice of variable values.
pub struct NumericFunction {
    arity: usize,
    f: Compiled,
}

impl NumericFunction {
    /// Number of variables the function expects.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Evaluates the function. The values must be given in the variable order
    /// used for compilation.
    pub fn call(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.arity, "invalid number of arguments");
        (self.f)(x)
    }
}

impl fmt::Debug for NumericFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumericFunction")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Compiles the expression into a function of given variables (in given
/// order).
///
/// Referencing a variable that is not listed is an error. Listed variables
/// that do not appear in the expression are allowed.
///
/// ```rust
/// use optcalc::symbolic::{parse, to_numeric_function};
///
/// let f = parse("x^2 + y").unwrap();
/// let f = to_numeric_function(&f, &["y", "x"]).unwrap();
/// assert_eq!(f.call(&[1.0, 3.0]), 10.0);
/// ```
pub fn to_numeric_function<S: AsRef<str>>(
    expr: &Expr,
    vars: &[S],
) -> Result<NumericFunction, EvalError> {
    let index = vars
        .iter()
        .enumerate()
        .map(|(i, var)| (var.as_ref(), i))
        .collect::<HashMap<_, _>>();

    Ok(NumericFunction {
        arity: vars.len(),
        f: compile(expr, &index)?,
    })
}

fn compile(expr: &Expr, index: &HashMap<&str, usize>) -> Result<Compiled, EvalError> {
    let compiled: Compiled = match expr {
        Expr::Const(c) => {
            let c = *c;
            Box::new(move |_| c)
        }
        Expr::Var(name) => {
            let i = *index
                .get(name.as_str())
                .ok_or_else(|| EvalError::UnboundVariable(name.clone()))?;
            Box::new(move |x| x[i])
        }
        Expr::Neg(a) => {
            let a = compile(a, index)?;
            Box::new(move |x| -a(x))
        }
        Expr::Add(a, b) => {
            let (a, b) = (compile(a, index)?, compile(b, index)?);
            Box::new(move |x| a(x) + b(x))
        }
        Expr::Sub(a, b) => {
            let (a, b) = (compile(a, index)?, compile(b, index)?);
            Box::new(move |x| a(x) - b(x))
        }
        Expr::Mul(a, b) => {
            let (a, b) = (compile(a, index)?, compile(b, index)?);
            Box::new(move |x| a(x) * b(x))
        }
        Expr::Div(a, b) => {
            let (a, b) = (compile(a, index)?, compile(b, index)?);
            Box::new(move |x| a(x) / b(x))
        }
        Expr::Pow(base, exponent) => match exponent.as_const() {
            Some(c) if c == 2.0 => {
                let base = compile(base, index)?;
                Box::new(move |x| {
                    let b = base(x);
                    b * b
                })
            }
            Some(c) => {
                let base = compile(base, index)?;
                Box::new(move |x| powf(base(x), c))
            }
            None => {
                let (base, exponent) = (compile(base, index)?, compile(exponent, index)?);
                Box::new(move |x| powf(base(x), exponent(x)))
            }
        },
        Expr::Func(func, a) => {
            let (func, a) = (*func, compile(a, index)?);
            Box::new(move |x| func.apply(a(x)))
        }
    };

    Ok(compiled)
}

/// Objective function compiled together with its analytic gradient.
#[derive(Debug)]
pub struct CompiledFunction {
    value: NumericFunction,
    gradient: Gradient,
}

impl CompiledFunction {
    /// Compiles the expression and its gradient in given variable order.
    pub fn new<S: AsRef<str>>(expr: &Expr, vars: &[S]) -> Result<Self, EvalError> {
        Ok(Self {
            value: to_numeric_function(expr, vars)?,
            gradient: Gradient::new(expr, vars)?,
        })
    }

    /// Evaluates the function on a slice of values.
    pub fn call(&self, x: &[f64]) -> f64 {
        self.value.call(x)
    }
}

impl NumericProblem for CompiledFunction {
    fn dim(&self) -> usize {
        self.value.arity()
    }
}

impl Function for CompiledFunction {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.value.call(x.as_slice())
    }
}

impl Differentiable for CompiledFunction {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        self.gradient.eval(x, grad);
    }
}

/// Square system of equations compiled together with its analytic Jacobian.
#[derive(Debug)]
pub struct CompiledSystem {
    residuals: Vec<NumericFunction>,
    jacobian: Jacobian,
}

impl CompiledSystem {
    /// Compiles the residual expressions and their Jacobian matrix in given
    /// variable order. The caller is responsible for the system being square.
    pub fn new<S: AsRef<str>>(residuals: &[Expr], vars: &[S]) -> Result<Self, EvalError> {
        Ok(Self {
            residuals: residuals
                .iter()
                .map(|r| to_numeric_function(r, vars))
                .collect::<Result<_, _>>()?,
            jacobian: Jacobian::new(residuals, vars)?,
        })
    }
}

impl NumericProblem for CompiledSystem {
    fn dim(&self) -> usize {
        self.jacobian.ncols()
    }
}

impl System for CompiledSystem {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        let x = x.as_slice();
        rx.iter_mut()
            .zip(self.residuals.iter())
            .for_each(|(ri, r)| *ri = r.call(x));
    }

    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.jacobian.eval(x, jac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::dvector;

    use crate::core::Point;
    use crate::symbolic::parse;

    #[test]
    fn variable_order() {
        let f = parse("x - 2*y").unwrap();

        assert_eq!(to_numeric_function(&f, &["x", "y"]).unwrap().call(&[1.0, 2.0]), -3.0);
        assert_eq!(to_numeric_function(&f, &["y", "x"]).unwrap().call(&[1.0, 2.0]), 0.0);
    }

    #[test]
    fn unbound_variable() {
        let f = parse("x + z").unwrap();

        assert_eq!(
            to_numeric_function(&f, &["x", "y"]).unwrap_err(),
            EvalError::UnboundVariable("z".to_string())
        );
    }

    #[test]
    fn matches_tree_evaluation() {
        let f = parse("exp(-x^2) * cos(y) + x^y / (1 + abs(y))").unwrap();
        let compiled = to_numeric_function(&f, &["x", "y"]).unwrap();

        for (x, y) in [(0.5, 1.5), (1.2, -0.3), (2.0, 3.0)] {
            let point: Point = [("x".to_string(), x), ("y".to_string(), y)].into();
            assert_relative_eq!(compiled.call(&[x, y]), f.eval(&point).unwrap());
        }
    }

    #[test]
    fn compiled_function_and_system() {
        let f = CompiledFunction::new(&parse("x^2 + 3*y").unwrap(), &["x", "y"]).unwrap();
        let x = dvector![2.0, 1.0];
        let mut grad = dvector![0.0, 0.0];

        assert_eq!(f.dim(), 2);
        assert_eq!(f.apply(&x), 7.0);
        f.gradient(&x, &mut grad);
        assert_eq!(grad, dvector![4.0, 3.0]);

        let residuals = [parse("x*y - 2").unwrap(), parse("x - y").unwrap()];
        let r = CompiledSystem::new(&residuals, &["x", "y"]).unwrap();
        let mut rx = dvector![0.0, 0.0];
        let mut jac = DMatrix::zeros(2, 2);

        r.eval(&x, &mut rx);
        r.jacobian(&x, &mut jac);
        assert_eq!(rx, dvector![0.0, 1.0]);
        assert_eq!(jac, DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 1.0, -1.0]));
    }
}
