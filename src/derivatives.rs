//! Tools for derivative-based methods.
//!
//! All derivatives are computed symbolically once and compiled into numeric
//! closures, so the evaluation is exact up to floating point arithmetic and no
//! finite difference steps need to be tuned.

use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, Dyn, IsContiguous, Vector,
};

use crate::symbolic::{self, to_numeric_function, EvalError, Expr, NumericFunction};

/// Gradient of a function.
#[derive(Debug)]
pub struct Gradient {
    partials: Vec<NumericFunction>,
}

impl Gradient {
    /// Differentiates the expression with respect to all given variables and
    /// compiles the partial derivatives.
    pub fn new<S: AsRef<str>>(expr: &Expr, vars: &[S]) -> Result<Self, EvalError> {
        let partials = symbolic::gradient(expr, vars)
            .iter()
            .map(|partial| to_numeric_function(partial, vars))
            .collect::<Result<_, _>>()?;

        Ok(Self { partials })
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.partials.len()
    }

    /// Evaluates the gradient in given point.
    pub fn eval<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        self.eval_slice(x.as_slice(), grad);
    }

    /// Evaluates the gradient in given point given as a slice.
    pub fn eval_slice<Sg>(&self, x: &[f64], grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sg: StorageMut<f64, Dyn>,
    {
        grad.iter_mut()
            .zip(self.partials.iter())
            .for_each(|(gi, partial)| *gi = partial.call(x));
    }
}

/// Jacobian matrix of a system of equations.
#[derive(Debug)]
pub struct Jacobian {
    ncols: usize,
    entries: Vec<Vec<NumericFunction>>,
}

impl Jacobian {
    /// Differentiates every residual with respect to all given variables and
    /// compiles the entries.
    pub fn new<S: AsRef<str>>(residuals: &[Expr], vars: &[S]) -> Result<Self, EvalError> {
        let entries = residuals
            .iter()
            .map(|residual| {
                symbolic::gradient(residual, vars)
                    .iter()
                    .map(|partial| to_numeric_function(partial, vars))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            ncols: vars.len(),
            entries,
        })
    }

    /// Number of rows (equations).
    pub fn nrows(&self) -> usize {
        self.entries.len()
    }

    /// Number of columns (variables).
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Evaluates the Jacobian matrix in given point.
    pub fn eval<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let x = x.as_slice();

        for (i, row) in self.entries.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                jac[(i, j)] = entry.call(x);
            }
        }
    }
}

/// Hessian matrix of a function.
#[derive(Debug)]
pub struct Hessian {
    entries: Vec<Vec<NumericFunction>>,
}

impl Hessian {
    /// Computes all second-order partial derivatives of the expression and
    /// compiles them.
    pub fn new<S: AsRef<str>>(expr: &Expr, vars: &[S]) -> Result<Self, EvalError> {
        let entries = symbolic::hessian(expr, vars)
            .iter()
            .map(|row| {
                row.iter()
                    .map(|entry| to_numeric_function(entry, vars))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { entries })
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.entries.len()
    }

    /// Evaluates the Hessian matrix in given point given as a slice.
    pub fn eval_slice(&self, x: &[f64]) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_fn(n, n, |i, j| self.entries[i][j].call(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::{dvector, DVector};

    use crate::symbolic::parse;

    #[test]
    fn gradient_in_given_order() {
        let f = parse("x^2 * y").unwrap();
        let grad = Gradient::new(&f, &["y", "x"]).unwrap();
        let mut g = DVector::zeros(2);

        grad.eval(&dvector![3.0, 2.0], &mut g);
        assert_eq!(g, dvector![4.0, 12.0]);
        assert_eq!(grad.dim(), 2);
    }

    #[test]
    fn jacobian_of_non_square_system() {
        let residuals = [parse("x + y + z").unwrap(), parse("x * z").unwrap()];
        let jacobian = Jacobian::new(&residuals, &["x", "y", "z"]).unwrap();
        let mut jac = DMatrix::zeros(2, 3);

        jacobian.eval(&dvector![1.0, 2.0, 3.0], &mut jac);
        assert_eq!(jacobian.nrows(), 2);
        assert_eq!(jacobian.ncols(), 3);
        assert_eq!(
            jac,
            DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 3.0, 0.0, 1.0])
        );
    }

    #[test]
    fn hessian_is_symmetric() {
        let f = parse("x^3 + x*y^2 - y").unwrap();
        let hessian = Hessian::new(&f, &["x", "y"]).unwrap();
        let hes = hessian.eval_slice(&[1.0, 2.0]);

        assert_eq!(hes, DMatrix::from_row_slice(2, 2, &[6.0, 4.0, 4.0, 2.0]));
    }

    #[test]
    fn unknown_variable() {
        let f = parse("x * w").unwrap();
        assert!(Gradient::new(&f, &["x"]).is_err());
    }
}
