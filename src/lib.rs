#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # Optcalc
//!
//! A pure Rust engine of classical methods for minimizing nonlinear objective
//! functions given as text, with optional equality and inequality
//! constraints.
//!
//! The objective and constraints are parsed into symbolic expressions, which
//! are differentiated exactly and compiled into numeric functions. Several
//! methods can then be run on the same problem and their results compared.
//!
//! ## Methods
//!
//! * [Gradient descent](methods::gradient_descent) -- Fixed learning rate,
//!   constraints are ignored.
//! * [Partial derivatives](methods::partial_derivatives) -- Critical points
//!   from solving `∇f = 0`, constraints are ignored.
//! * [Lagrange multipliers](methods::lagrange) -- Stationary points of the
//!   Lagrangian for equality constraints.
//! * [Numerical](methods::numerical) -- BFGS for unconstrained problems and
//!   augmented Lagrangian for problems with equality and inequality
//!   constraints.
//!
//! ## Problem
//!
//! The problem is described by the objective function, a list of constraints
//! and settings of the iterative methods.
//!
//! ```text
//! minimize f(x)
//!
//! subject to hᵢ(x) = 0
//!        and gⱼ(x) <= 0
//! ```
//!
//! Constraints are written as `lhs == rhs` (or `=`), `lhs <= rhs` or
//! `lhs >= rhs`. Multiplication can be implicit between a number and a
//! variable (`2x`), `^` and `**` both denote the power.
//!
//! ```rust
//! use optcalc::{Problem, Point};
//!
//! let initial: Point = [("x".to_string(), 1.0), ("y".to_string(), 1.0)].into();
//!
//! let problem = Problem::new("(x - 1)^2 + 2*(y - 2)^2")
//!     .with_constraint("x + y <= 2")
//!     .with_initial_point(initial)
//!     .with_learning_rate(0.1)
//!     .with_tolerance(1e-8);
//! ```
//!
//! ## Solving
//!
//! A single method is run by [`Method::solve`] and the outcome is normalized
//! into [`OptimizationResult`], which never panics nor propagates the error of
//! the method.
//!
//! ```rust
//! use optcalc::{Method, Problem};
//!
//! let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
//! let result = Method::Lagrange.solve(&problem);
//!
//! let point = result.optimal_point().unwrap();
//! assert!((point["x"] - 0.5).abs() < 1e-9);
//! assert!((point["y"] - 0.5).abs() < 1e-9);
//! ```
//!
//! Methods selected by the problem can be run at once by [`compare`]
//! function, which also checks whether the reported optima satisfy the
//! constraints.
//!
//! ```rust
//! use optcalc::{compare, Method, MethodSelector, Problem};
//!
//! let problem = Problem::new("(x - 3)^2").with_method(MethodSelector::All);
//! let report = compare(&problem);
//!
//! // Lagrange multipliers method requires constraints.
//! assert!(report.get(Method::Lagrange).unwrap().error().is_some());
//! assert!(report.get(Method::GradientDescent).unwrap().is_ok());
//! ```
//!
//! ## Numeric layer
//!
//! The numerical methods are built on a small framework of [`Function`]s
//! minimized by [`Minimizer`]s (see [algorithms](algo)) and [`System`]s of
//! equations solved by [`Solver`]s. The [`MinimizerDriver`] and
//! [`SolverDriver`] run the iteration process until a stopping criterion is
//! reached. Custom functions and algorithms can be plugged in.
//!
//! ```rust
//! use optcalc::symbolic::{parse, CompiledFunction};
//! use optcalc::{algo::Bfgs, MinimizerDriver};
//!
//! let objective = parse("(x - 1)^2 + (y + 1)^2").unwrap();
//! let f = CompiledFunction::new(&objective, &["x", "y"]).unwrap();
//!
//! let mut minimizer = MinimizerDriver::builder(&f)
//!     .with_algo(Bfgs::new)
//!     .with_initial(vec![0.0, 0.0])
//!     .build();
//!
//! let (x, value) = minimizer
//!     .find(|state| state.iter() >= 100 || state.algo().grad_norm() < 1e-9)
//!     .expect("minimizer error");
//!
//! assert!((x[0] - 1.0).abs() < 1e-6);
//! assert!(value < 1e-12);
//! ```

pub mod algo;
pub mod analysis;
pub mod compare;
mod core;
pub mod derivatives;
pub mod driver;
pub mod methods;
pub mod symbolic;

pub use compare::{
    compare, Comparator, ComparisonReport, ConstraintVerdict, MethodSelector, PlotMarker,
    PlotRequest,
};
pub use core::*;
pub use driver::{MinimizerDriver, SolverDriver};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
