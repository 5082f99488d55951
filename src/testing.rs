//! Testing functions, systems and utilities useful for benchmarking, debugging
//! and smoke testing.
//!
//! [`ExtendedRosenbrock`] and [`Sphere`] are recommended for first tests of
//! both minimizers and solvers. Others can be used for specific conditions
//! (e.g., singular Jacobian matrix, function undefined on a part of the
//! space). Complete [`Problem`]s with known optima are available in
//! [`known_problems`].
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use std::error::Error as StdError;

use nalgebra::{
    dvector,
    storage::{Storage, StorageMut},
    DMatrix, DVector, Dyn, IsContiguous, Vector,
};
use thiserror::Error;

use crate::core::{
    Differentiable, Function, Minimizer, NumericProblem, Point, Problem, Solver, System,
};

/// Extension of the [`NumericProblem`] trait that provides additional
/// information that is useful for testing algorithms.
pub trait TestProblem: NumericProblem {
    /// Standard initial values for the problem. Using the same initial values is
    /// essential for fair comparison of methods.
    fn initials(&self) -> Vec<DVector<f64>>;
}

/// Extension of the [`System`] trait that provides additional information that
/// is useful for testing solvers.
pub trait TestSystem: System + TestProblem {
    /// A set of roots (if known and finite). This is mostly just for
    /// information, for example to know how close a solver got even if it
    /// failed. For testing if a given point is root, [`TestSystem::is_root`]
    /// should be used.
    fn roots(&self) -> Vec<DVector<f64>> {
        Vec::new()
    }

    /// Test if given point is a root of the system, given the tolerance `eps`.
    fn is_root<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.norm(x) <= eps
    }
}

/// Extension of the [`Function`] trait that provides additional information
/// that is useful for testing minimizers.
pub trait TestFunction: Function + TestProblem {
    /// A set of global optima (if known and finite).
    fn optima(&self) -> Vec<DVector<f64>> {
        Vec::new()
    }

    /// Test if given point is within distance `eps` from any of the known
    /// global optima.
    fn is_optimum<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.optima().iter().any(|optimum| (x - optimum).norm() <= eps)
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] (also
/// known as Rosenbrock's valley or banana function).
///
/// As a system, the residuals are `10 (x₂ - x₁²)` and `1 - x₁` for every pair
/// of variables. As a function, the value is the sum of squared residuals. The
/// global minimum is inside a long, narrow, parabolic shaped flat valley.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedRosenbrock {
    n: usize,
}

impl ExtendedRosenbrock {
    /// Initializes the problem with given dimension.
    ///
    /// The dimension **must** be a multiple of 2.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        Self { n }
    }

    fn residuals<'a, Sx>(&self, x: &'a Vector<f64, Dyn, Sx>) -> impl Iterator<Item = f64> + 'a
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        (0..(self.n / 2)).flat_map(move |i| {
            let x1 = x[2 * i];
            let x2 = x[2 * i + 1];

            [10.0 * (x2 - x1 * x1), 1.0 - x1].into_iter()
        })
    }
}

impl Default for ExtendedRosenbrock {
    fn default() -> Self {
        Self::new(2)
    }
}

impl NumericProblem for ExtendedRosenbrock {
    fn dim(&self) -> usize {
        self.n
    }
}

impl System for ExtendedRosenbrock {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        eval(self.residuals(x), rx)
    }

    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        jac.fill(0.0);

        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            let i2 = 2 * i + 1;

            jac[(i1, i1)] = -20.0 * x[i1];
            jac[(i1, i2)] = 10.0;
            jac[(i2, i1)] = -1.0;
        }
    }

    fn norm<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        norm(self.residuals(x))
    }
}

impl Function for ExtendedRosenbrock {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.residuals(x).map(|r| r * r).sum()
    }
}

impl Differentiable for ExtendedRosenbrock {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        // 2 J^T r
        for i in 0..(self.n / 2) {
            let i1 = 2 * i;
            let i2 = 2 * i + 1;

            let r1 = 10.0 * (x[i2] - x[i1] * x[i1]);
            let r2 = 1.0 - x[i1];

            grad[i1] = 2.0 * (-20.0 * x[i1] * r1 - r2);
            grad[i2] = 20.0 * r1;
        }
    }
}

impl TestProblem for ExtendedRosenbrock {
    fn initials(&self) -> Vec<DVector<f64>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );

        let init2 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 6.39 } else { -0.221 }),
        );

        vec![init1, init2]
    }
}

impl TestSystem for ExtendedRosenbrock {
    fn roots(&self) -> Vec<DVector<f64>> {
        vec![DVector::from_element(self.n, 1.0)]
    }
}

impl TestFunction for ExtendedRosenbrock {
    fn optima(&self) -> Vec<DVector<f64>> {
        <ExtendedRosenbrock as TestSystem>::roots(self)
    }
}

/// [Sphere
/// function](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
/// \[1\].
///
/// This is a simple paraboloid which can be used in early development and
/// sanity checking as it can be considered a trivial problem. As a system, the
/// residuals are the squares of the variables, so the Jacobian matrix is
/// singular in the root.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the problem with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl NumericProblem for Sphere {
    fn dim(&self) -> usize {
        self.n
    }
}

impl System for Sphere {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        eval(x.iter().map(|xi| xi.powi(2)), rx)
    }

    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        jac.fill(0.0);
        jac.set_diagonal(&(x * 2.0));
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        x.norm_squared()
    }
}

impl Differentiable for Sphere {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        grad.zip_apply(x, |gi, xi| *gi = 2.0 * xi);
    }
}

impl TestProblem for Sphere {
    fn initials(&self) -> Vec<DVector<f64>> {
        let init = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 10.0 } else { -10.0 }),
        );

        vec![init]
    }
}

impl TestSystem for Sphere {
    fn roots(&self) -> Vec<DVector<f64>> {
        vec![DVector::zeros(self.n)]
    }
}

impl TestFunction for Sphere {
    fn optima(&self) -> Vec<DVector<f64>> {
        <Sphere as TestSystem>::roots(self)
    }
}

/// Intersection of the unit circle and the line `x = y`.
///
/// A small nonlinear system with two roots, typical for the stationarity
/// conditions of Lagrange multipliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircleLine(());

impl NumericProblem for CircleLine {
    fn dim(&self) -> usize {
        2
    }
}

impl System for CircleLine {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        rx[0] = x[0].powi(2) + x[1].powi(2) - 1.0;
        rx[1] = x[0] - x[1];
    }

    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        jac[(0, 0)] = 2.0 * x[0];
        jac[(0, 1)] = 2.0 * x[1];
        jac[(1, 0)] = 1.0;
        jac[(1, 1)] = -1.0;
    }
}

impl TestProblem for CircleLine {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![dvector![0.5, 0.0], dvector![-2.0, 1.5]]
    }
}

impl TestSystem for CircleLine {
    fn roots(&self) -> Vec<DVector<f64>> {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        vec![dvector![s, s], dvector![-s, -s]]
    }
}

/// Equation `x² + 1 = 0` which has no real root.
///
/// The Jacobian matrix vanishes in zero, which is the minimum of the residual
/// norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoot;

impl NumericProblem for NoRoot {
    fn dim(&self) -> usize {
        1
    }
}

impl System for NoRoot {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        rx[0] = x[0].powi(2) + 1.0;
    }

    fn jacobian<Sx>(&self, x: &Vector<f64, Dyn, Sx>, jac: &mut DMatrix<f64>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        jac[(0, 0)] = 2.0 * x[0];
    }
}

impl TestProblem for NoRoot {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![dvector![1.0]]
    }
}

impl TestSystem for NoRoot {}

/// Paraboloid `Σ (xᵢ - cᵢ)²` with the minimum in a given center.
#[derive(Debug, Clone)]
pub struct ShiftedParaboloid {
    center: DVector<f64>,
}

impl ShiftedParaboloid {
    /// Initializes the function with given center.
    pub fn new(center: Vec<f64>) -> Self {
        assert!(!center.is_empty(), "center must not be empty");
        Self {
            center: DVector::from_vec(center),
        }
    }
}

impl NumericProblem for ShiftedParaboloid {
    fn dim(&self) -> usize {
        self.center.len()
    }
}

impl Function for ShiftedParaboloid {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        (x - &self.center).norm_squared()
    }
}

impl Differentiable for ShiftedParaboloid {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        for i in 0..self.center.len() {
            grad[i] = 2.0 * (x[i] - self.center[i]);
        }
    }
}

impl TestProblem for ShiftedParaboloid {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![DVector::zeros(self.center.len())]
    }
}

impl TestFunction for ShiftedParaboloid {
    fn optima(&self) -> Vec<DVector<f64>> {
        vec![self.center.clone()]
    }
}

/// Function `Σ (xᵢ - ln xᵢ)` of two variables with the minimum in ones.
///
/// The function is not defined (NaN) for negative values, which is useful for
/// testing how the algorithms deal with invalid values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBarrier;

impl NumericProblem for LogBarrier {
    fn dim(&self) -> usize {
        2
    }
}

impl Function for LogBarrier {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        x.iter().map(|xi| xi - xi.ln()).sum()
    }
}

impl Differentiable for LogBarrier {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        grad.zip_apply(x, |gi, xi| *gi = 1.0 - 1.0 / xi);
    }
}

impl TestProblem for LogBarrier {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![dvector![2.0, 0.5]]
    }
}

impl TestFunction for LogBarrier {
    fn optima(&self) -> Vec<DVector<f64>> {
        vec![dvector![1.0, 1.0]]
    }
}

/// An optimization problem with known solution.
#[derive(Debug, Clone)]
pub struct KnownProblem {
    /// Short identifier of the problem.
    pub name: &'static str,
    /// The problem.
    pub problem: Problem,
    /// The optimal point.
    pub optimum: Point,
    /// Objective value in the optimal point.
    pub value: f64,
}

fn point(pairs: &[(&str, f64)]) -> Point {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Problems with known optima covering unconstrained, equality constrained and
/// inequality constrained cases.
pub fn known_problems() -> Vec<KnownProblem> {
    vec![
        KnownProblem {
            name: "bowl",
            problem: Problem::new("(x - 1)^2 + (y + 2)^2 + (z - 0.5)^2").with_learning_rate(0.1),
            optimum: point(&[("x", 1.0), ("y", -2.0), ("z", 0.5)]),
            value: 0.0,
        },
        KnownProblem {
            name: "rosenbrock",
            problem: Problem::new("(1 - x)^2 + 100*(y - x^2)^2")
                .with_learning_rate(1e-3)
                .with_max_iterations(10000),
            optimum: point(&[("x", 1.0), ("y", 1.0)]),
            value: 0.0,
        },
        KnownProblem {
            name: "circle_distance",
            problem: Problem::new("x^2 + y^2").with_constraint("x + y == 1"),
            optimum: point(&[("x", 0.5), ("y", 0.5)]),
            value: 0.5,
        },
        KnownProblem {
            name: "active_inequality",
            problem: Problem::new("(x - 2)^2 + (y - 1)^2").with_constraint("x <= 1"),
            optimum: point(&[("x", 1.0), ("y", 1.0)]),
            value: 1.0,
        },
    ]
}

/// Error type for the testing drivers.
#[derive(Debug, Error)]
pub enum TestingError<E: StdError + 'static> {
    /// Error of the algorithm used.
    #[error("{0}")]
    Inner(#[from] E),
    /// Algorithm did not terminate.
    #[error("algorithm did not terminate")]
    Termination,
}

/// A simple solver driver that can be used in tests.
pub fn solve<R: TestSystem, S: Solver<R>>(
    r: &R,
    mut solver: S,
    mut x: DVector<f64>,
    max_iters: usize,
    tolerance: f64,
) -> Result<DVector<f64>, TestingError<S::Error>>
where
    S::Error: StdError,
{
    let mut rx = x.clone_owned();
    let mut iter = 0;

    loop {
        solver.solve_next(r, &mut x, &mut rx)?;

        if rx.norm() <= tolerance {
            return Ok(x);
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

/// A simple minimizer driver that can be used in tests.
pub fn optimize<F: Function, M: Minimizer<F>>(
    f: &F,
    mut minimizer: M,
    mut x: DVector<f64>,
    min: f64,
    max_iters: usize,
    tolerance: f64,
) -> Result<DVector<f64>, TestingError<M::Error>>
where
    M::Error: StdError,
{
    let mut iter = 0;

    loop {
        let fx = minimizer.opt_next(f, &mut x)?;

        if fx <= min + tolerance {
            // Converged.
            return Ok(x);
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

fn eval<Srx>(residuals: impl Iterator<Item = f64>, rx: &mut Vector<f64, Dyn, Srx>)
where
    Srx: StorageMut<f64, Dyn>,
{
    rx.iter_mut().zip(residuals).for_each(|(rxi, v)| *rxi = v);
}

fn norm(residuals: impl Iterator<Item = f64>) -> f64 {
    residuals.map(|v| v.powi(2)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn rosenbrock_gradient_matches_residuals() {
        let f = ExtendedRosenbrock::new(4);
        let x = dvector![-1.2, 1.0, 0.5, 2.0];

        let mut rx = DVector::zeros(4);
        let mut jac = DMatrix::zeros(4, 4);
        f.eval(&x, &mut rx);
        f.jacobian(&x, &mut jac);

        let mut grad = DVector::zeros(4);
        f.gradient(&x, &mut grad);

        assert_abs_diff_eq!(grad, jac.transpose() * &rx * 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.apply(&x), rx.norm_squared(), epsilon = 1e-12);
    }

    #[test]
    fn optima_are_recognized() {
        let f = ExtendedRosenbrock::new(2);
        assert!(f.is_optimum(&dvector![1.0, 1.0], 1e-12));
        assert!(f.is_root(&dvector![1.0, 1.0], 1e-12));

        let r = CircleLine::default();
        for root in r.roots() {
            assert!(r.is_root(&root, 1e-12));
        }
    }

    #[test]
    fn known_problems_are_consistent() {
        for known in known_problems() {
            let objective = known.problem.parse_objective().unwrap();
            assert_abs_diff_eq!(objective.eval(&known.optimum).unwrap(), known.value);
        }
    }
}
