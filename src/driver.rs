//! High-level API for iterative solving and minimization.
//!
//! This module contains "drivers" that encapsulate all internal state and
//! provide a simple API to run the iterative process for solving systems of
//! equations or minimizing functions. This documentation describes usage for
//! the solving, but the API is basically the same for minimization.
//!
//! The simplest way of using the driver is to initialize it with the defaults:
//!
//! ```rust
//! use optcalc::symbolic::{parse, CompiledSystem};
//! use optcalc::SolverDriver;
//!
//! let residuals = [parse("x^2 + y^2 - 1").unwrap(), parse("x - y").unwrap()];
//! let r = CompiledSystem::new(&residuals, &["x", "y"]).unwrap();
//!
//! let mut solver = SolverDriver::new(&r);
//! ```
//!
//! If you need to specify additional settings, use the builder:
//!
//! ```rust
//! # use optcalc::symbolic::{parse, CompiledSystem};
//! use optcalc::algo::{TrustRegion, TrustRegionOptions};
//! use optcalc::SolverDriver;
//! #
//! # let residuals = [parse("x^2 + y^2 - 1").unwrap(), parse("x - y").unwrap()];
//! # let r = CompiledSystem::new(&residuals, &["x", "y"]).unwrap();
//!
//! let mut options = TrustRegionOptions::default();
//! options.set_rejections_thresh(20);
//!
//! let mut solver = SolverDriver::builder(&r)
//!     .with_initial(vec![1.0, 0.5])
//!     .with_algo(|r| TrustRegion::with_options(r, options))
//!     .build();
//! ```
//!
//! Once you have the solver, you can use it to find the solution:
//!
//! ```rust
//! # use optcalc::symbolic::{parse, CompiledSystem};
//! # use optcalc::SolverDriver;
//! #
//! # let residuals = [parse("x^2 + y^2 - 1").unwrap(), parse("x - y").unwrap()];
//! # let r = CompiledSystem::new(&residuals, &["x", "y"]).unwrap();
//! #
//! # let mut solver = SolverDriver::builder(&r).with_initial(vec![1.0, 0.5]).build();
//! #
//! let result = solver.find(|state| state.norm() <= 1e-6 || state.iter() >= 100);
//! ```
//!
//! If you need more control over the iteration process, you can do the
//! iterations manually:
//!
//! ```rust
//! # use optcalc::symbolic::{parse, CompiledSystem};
//! # use optcalc::SolverDriver;
//! #
//! # let residuals = [parse("x^2 + y^2 - 1").unwrap(), parse("x - y").unwrap()];
//! # let r = CompiledSystem::new(&residuals, &["x", "y"]).unwrap();
//! #
//! # let mut solver = SolverDriver::builder(&r).with_initial(vec![1.0, 0.5]).build();
//! #
//! loop {
//!     let (x, norm) = solver.next().expect("no solver error");
//!     // ...
//! #   break;
//! }
//! ```

use nalgebra::DVector;

use crate::algo::{NelderMead, TrustRegion};
use crate::core::{Function, Minimizer, NumericProblem, Solver, System};

struct Builder<'a, P, A> {
    p: &'a P,
    algo: A,
    x0: DVector<f64>,
}

impl<'a, P: NumericProblem, A> Builder<'a, P, A> {
    fn new(p: &'a P, algo: A) -> Self {
        let x0 = DVector::zeros(p.dim());
        Self { p, algo, x0 }
    }

    fn with_initial(mut self, x0: Vec<f64>) -> Self {
        assert_eq!(x0.len(), self.p.dim(), "invalid initial point dimension");
        self.x0 = DVector::from_vec(x0);
        self
    }

    fn with_algo<A2, FA>(self, factory: FA) -> Builder<'a, P, A2>
    where
        FA: FnOnce(&P) -> A2,
    {
        let algo = factory(self.p);

        Builder {
            p: self.p,
            algo,
            x0: self.x0,
        }
    }
}

/// Builder for the [`SolverDriver`].
pub struct SolverBuilder<'a, R, A>(Builder<'a, R, A>);

impl<'a, R: NumericProblem, A> SolverBuilder<'a, R, A> {
    /// Sets the initial point from which the iterative process starts.
    ///
    /// The length of the vector must be equal to the system dimension.
    pub fn with_initial(self, x0: Vec<f64>) -> Self {
        Self(self.0.with_initial(x0))
    }

    /// Sets specific algorithm to be used.
    ///
    /// This builder method accepts a closure that takes the reference to the
    /// system. For the algorithms in this crate, you can simply pass the `new`
    /// constructor directly (e.g., `TrustRegion::new`).
    pub fn with_algo<A2, FA>(self, factory: FA) -> SolverBuilder<'a, R, A2>
    where
        FA: FnOnce(&R) -> A2,
    {
        SolverBuilder(self.0.with_algo(factory))
    }

    /// Builds the [`SolverDriver`].
    pub fn build(self) -> SolverDriver<'a, R, A> {
        let Builder { p, algo, x0 } = self.0;
        let rx = DVector::from_element(x0.len(), f64::INFINITY);

        SolverDriver {
            r: p,
            algo,
            x: x0,
            rx,
        }
    }
}

/// The driver for the process of solving a system of equations.
///
/// For default settings, use [`SolverDriver::new`]. For more flexibility, use
/// [`SolverDriver::builder`]. For the usage of the driver, see [module](self)
/// documentation.
pub struct SolverDriver<'a, R, A> {
    r: &'a R,
    algo: A,
    x: DVector<f64>,
    rx: DVector<f64>,
}

impl<'a, R: NumericProblem> SolverDriver<'a, R, TrustRegion> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(r: &'a R) -> SolverBuilder<'a, R, TrustRegion> {
        SolverBuilder(Builder::new(r, TrustRegion::new(r)))
    }

    /// Initializes the driver with the default settings.
    pub fn new(r: &'a R) -> Self {
        SolverDriver::builder(r).build()
    }
}

impl<'a, R, A> SolverDriver<'a, R, A> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// Returns reference to the current residuals.
    pub fn rx(&self) -> &[f64] {
        self.rx.as_slice()
    }

    /// Returns norm of the residuals.
    pub fn norm(&self) -> f64 {
        self.rx.norm()
    }
}

impl<'a, R: System, A: Solver<R>> SolverDriver<'a, R, A> {
    /// Does one iteration of the process, returning the current point and the
    /// norm of the residuals in case of no error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(&[f64], f64), A::Error> {
        self.algo.solve_next(self.r, &mut self.x, &mut self.rx)?;
        Ok((self.x.as_slice(), self.rx.norm()))
    }

    /// Runs the iterative process until given stopping criterion is satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[f64], f64), A::Error>
    where
        C: Fn(SolverIterState<'_>) -> bool,
    {
        let mut iter = 0;

        loop {
            let norm = self.next()?.1;

            let state = SolverIterState {
                x: &self.x,
                rx: &self.rx,
                iter,
            };

            if stop(state) {
                return Ok((self.x.as_slice(), norm));
            }

            iter += 1;
        }
    }

    /// Returns the name of the used solver.
    pub fn name(&self) -> &str {
        A::NAME
    }
}

/// State of the current solving iteration.
pub struct SolverIterState<'a> {
    x: &'a DVector<f64>,
    rx: &'a DVector<f64>,
    iter: usize,
}

impl<'a> SolverIterState<'a> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// Returns reference to the current residuals.
    pub fn rx(&self) -> &[f64] {
        self.rx.as_slice()
    }

    /// Returns norm of the residuals.
    pub fn norm(&self) -> f64 {
        self.rx.norm()
    }

    /// Returns the current iteration number (starting from zero).
    pub fn iter(&self) -> usize {
        self.iter
    }
}

/// Builder for the [`MinimizerDriver`].
pub struct MinimizerBuilder<'a, F, A>(Builder<'a, F, A>);

impl<'a, F: NumericProblem, A> MinimizerBuilder<'a, F, A> {
    /// Sets the initial point from which the iterative process starts.
    ///
    /// The length of the vector must be equal to the function dimension.
    pub fn with_initial(self, x0: Vec<f64>) -> Self {
        Self(self.0.with_initial(x0))
    }

    /// Sets specific algorithm to be used.
    ///
    /// This builder method accepts a closure that takes the reference to the
    /// function. For the algorithms in this crate, you can simply pass the
    /// `new` constructor directly (e.g., `Bfgs::new`).
    pub fn with_algo<A2, FA>(self, factory: FA) -> MinimizerBuilder<'a, F, A2>
    where
        FA: FnOnce(&F) -> A2,
    {
        MinimizerBuilder(self.0.with_algo(factory))
    }

    /// Builds the [`MinimizerDriver`].
    pub fn build(self) -> MinimizerDriver<'a, F, A> {
        let Builder { p, algo, x0 } = self.0;

        MinimizerDriver {
            f: p,
            algo,
            x: x0,
            fx: f64::INFINITY,
        }
    }
}

/// The driver for the process of minimizing a function.
///
/// For default settings, use [`MinimizerDriver::new`]. For more flexibility,
/// use [`MinimizerDriver::builder`]. For the usage of the driver, see
/// [module](self) documentation.
pub struct MinimizerDriver<'a, F, A> {
    f: &'a F,
    algo: A,
    x: DVector<f64>,
    fx: f64,
}

impl<'a, F: NumericProblem> MinimizerDriver<'a, F, NelderMead> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(f: &'a F) -> MinimizerBuilder<'a, F, NelderMead> {
        MinimizerBuilder(Builder::new(f, NelderMead::new(f)))
    }

    /// Initializes the driver with the default settings.
    pub fn new(f: &'a F) -> Self {
        MinimizerDriver::builder(f).build()
    }
}

impl<'a, F, A> MinimizerDriver<'a, F, A> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> f64 {
        self.fx
    }

    /// Returns reference to the used algorithm.
    pub fn algo(&self) -> &A {
        &self.algo
    }
}

impl<'a, F: Function, A: Minimizer<F>> MinimizerDriver<'a, F, A> {
    /// Does one iteration of the process, returning the current point and the
    /// function value in case of no error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(&[f64], f64), A::Error> {
        self.fx = self.algo.opt_next(self.f, &mut self.x)?;
        Ok((self.x.as_slice(), self.fx))
    }

    /// Runs the iterative process until given stopping criterion is satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[f64], f64), A::Error>
    where
        C: Fn(MinimizerIterState<'_, A>) -> bool,
    {
        let mut iter = 0;

        loop {
            self.next()?;

            let state = MinimizerIterState {
                x: &self.x,
                fx: self.fx,
                algo: &self.algo,
                iter,
            };

            if stop(state) {
                return Ok((self.x.as_slice(), self.fx));
            }

            iter += 1;
        }
    }

    /// Returns the name of the used minimizer.
    pub fn name(&self) -> &str {
        A::NAME
    }
}

/// State of the current minimization iteration.
pub struct MinimizerIterState<'a, A> {
    x: &'a DVector<f64>,
    fx: f64,
    algo: &'a A,
    iter: usize,
}

impl<'a, A> MinimizerIterState<'a, A> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[f64] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> f64 {
        self.fx
    }

    /// Returns reference to the algorithm, so that algorithm-specific
    /// quantities (e.g., gradient norm) can be inspected.
    pub fn algo(&self) -> &A {
        self.algo
    }

    /// Returns the current iteration number (starting from zero).
    pub fn iter(&self) -> usize {
        self.iter
    }
}

#[cfg(test)]
mod tests {
    use crate::{algo::Bfgs, testing::Sphere};

    use super::*;

    #[test]
    fn solver_basic_use_case() {
        let r = Sphere::new(4);
        let mut solver = SolverDriver::builder(&r)
            // Zeros are the root for sphere, there would be no point is such
            // test.
            .with_initial(vec![10.0; 4])
            .build();

        let tolerance = 1e-6;
        let (_, norm) = solver
            .find(|state| state.iter() >= 100 || state.norm() < tolerance)
            .unwrap();

        assert!(norm <= tolerance);
        assert_eq!(solver.name(), "Trust-region");
    }

    #[test]
    fn solver_initial() {
        let x0 = vec![10.0; 4];

        let r = Sphere::new(4);
        let solver = SolverDriver::builder(&r).with_initial(x0.clone()).build();

        assert_eq!(solver.x(), &x0);
        assert!(solver.norm().is_infinite());
    }

    #[test]
    fn minimizer_basic_use_case() {
        let f = Sphere::new(4);
        let mut minimizer = MinimizerDriver::builder(&f)
            .with_initial(vec![10.0; 4])
            .build();

        let tolerance = 1e-6;
        let (_, value) = minimizer
            .find(|state| state.iter() >= 1000 || state.fx() < tolerance)
            .unwrap();

        assert!(value <= tolerance);
        assert_eq!(minimizer.name(), "Nelder-Mead");
    }

    #[test]
    fn minimizer_custom() {
        let f = Sphere::new(4);
        let mut minimizer = MinimizerDriver::builder(&f)
            .with_algo(Bfgs::new)
            .with_initial(vec![10.0; 4])
            .build();

        let tolerance = 1e-8;
        let (_, value) = minimizer
            .find(|state| state.iter() >= 100 || state.algo().grad_norm() < tolerance)
            .unwrap();

        assert!(value <= tolerance);
    }

    #[test]
    fn minimizer_initial() {
        let x0 = vec![10.0; 4];

        let f = Sphere::new(4);
        let minimizer = MinimizerDriver::builder(&f).with_initial(x0.clone()).build();

        assert_eq!(minimizer.x(), &x0);
        assert!(minimizer.fx().is_infinite());
    }
}
