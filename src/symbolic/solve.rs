//! Solving of small systems of equations given symbolically.
//!
//! Affine systems (recognized by [`detect_non_linear_unknowns`]) are solved
//! exactly using singular value decomposition, which also handles
//! under-determined and over-determined systems. Other systems must be square
//! and are solved by a deterministic multi-start [trust
//! region](crate::algo::trust_region) search that collects every distinct root
//! it finds. Every root is refined by Newton steps until the step stagnates,
//! and unknowns that can move along a set of roots through it are left unbound.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::analysis::detect_non_linear_unknowns;
use crate::core::{Point, System};
use crate::derivatives::Jacobian;
use crate::driver::SolverDriver;

use super::expr::Expr;
use super::lambdify::{to_numeric_function, CompiledSystem};

/// Error of the equation solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// A non-linear system must have as many equations as unknowns.
    #[error("non-linear system of {equations} equations in {unknowns} unknowns is not square")]
    NotSquare {
        /// Number of equations.
        equations: usize,
        /// Number of unknowns.
        unknowns: usize,
    },
    /// Equations reference symbols that are not among the unknowns.
    #[error("equations reference symbols that are not unknowns: {}", .0.join(", "))]
    UnboundSymbols(Vec<String>),
}

/// Options for [`solve_system_with_options`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct SolveOptions {
    /// Number of random initial guesses of the multi-start search. Default:
    /// `48`.
    starts: usize,
    /// Seed of the random generator. Default: `42`.
    seed: u64,
    /// Standard deviation of the normal distribution the random initial
    /// guesses are sampled from. Default: `3`.
    spread: f64,
    /// Maximum number of trust region iterations for one initial guess.
    /// Default: `200`.
    max_iterations: usize,
    /// Residual norm under which a point is accepted as a root. Default:
    /// `1e-10`.
    tolerance: f64,
    /// Maximum number of Newton steps refining an accepted root. Default:
    /// `500`.
    polish_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            starts: 48,
            seed: 42,
            spread: 3.0,
            max_iterations: 200,
            tolerance: 1e-10,
            polish_iterations: 500,
        }
    }
}

/// Solves the system of equations `equations[i] = 0` for given unknowns with
/// default options.
///
/// Returns all solutions found. An empty vector means that no solution was
/// found. For under-determined affine systems, a single point binding only the
/// unknowns that are uniquely determined is returned. Likewise, a root of a
/// non-linear system lying on a curve or surface of roots does not bind the
/// unknowns that vary along it.
///
/// ```rust
/// use optcalc::symbolic::{parse, solve_system};
///
/// let equations = [parse("x^2 - 4").unwrap()];
/// let roots = solve_system(&equations, &["x"]).unwrap();
///
/// assert_eq!(roots.len(), 2);
/// assert_eq!(roots[0]["x"], -2.0);
/// assert_eq!(roots[1]["x"], 2.0);
/// ```
pub fn solve_system<S: AsRef<str>>(
    equations: &[Expr],
    unknowns: &[S],
) -> Result<Vec<Point>, SolveError> {
    solve_system_with_options(equations, unknowns, &SolveOptions::default())
}

/// Solves the system of equations `equations[i] = 0` for given unknowns.
///
/// See [`solve_system`] for details.
pub fn solve_system_with_options<S: AsRef<str>>(
    equations: &[Expr],
    unknowns: &[S],
    options: &SolveOptions,
) -> Result<Vec<Point>, SolveError> {
    let unknowns = unknowns
        .iter()
        .map(|u| u.as_ref().to_string())
        .collect::<Vec<_>>();

    let known = unknowns.iter().collect::<BTreeSet<_>>();
    let unbound = equations
        .iter()
        .flat_map(Expr::free_variables)
        .filter(|var| !known.contains(var))
        .collect::<BTreeSet<_>>();

    if !unbound.is_empty() {
        return Err(SolveError::UnboundSymbols(unbound.into_iter().collect()));
    }

    let non_linear = detect_non_linear_unknowns(equations, &unknowns);

    if non_linear.is_empty() {
        debug!(
            "system of {} equations in {} unknowns is affine",
            equations.len(),
            unknowns.len()
        );
        return Ok(solve_affine(equations, &unknowns));
    }

    debug!(
        "system is non-linear in {:?}",
        non_linear
            .iter()
            .map(|&j| unknowns[j].as_str())
            .collect::<Vec<_>>()
    );

    if equations.len() != unknowns.len() {
        return Err(SolveError::NotSquare {
            equations: equations.len(),
            unknowns: unknowns.len(),
        });
    }

    Ok(solve_multistart(equations, &unknowns, options))
}

fn solve_affine(equations: &[Expr], unknowns: &[String]) -> Vec<Point> {
    let n = unknowns.len();
    let m = equations.len();
    let rows = m.max(n);

    if n == 0 {
        let consistent = equations
            .iter()
            .all(|e| e.eval(&Point::new()).map_or(false, |v| v.abs() <= 1e-9));
        return if consistent { vec![Point::new()] } else { Vec::new() };
    }

    let origin = DVector::zeros(n);

    // Equations are affine, so the Jacobian is the constant matrix A and the
    // residuals in the origin are -b. Rows are padded with zeros so that the
    // decomposition yields a complete basis of the null space.
    let mut a = DMatrix::zeros(rows, n);
    let mut b = DVector::zeros(rows);

    match Jacobian::new(equations, unknowns) {
        Ok(jacobian) => {
            let mut jac = DMatrix::zeros(m, n);
            jacobian.eval(&origin, &mut jac);
            a.rows_mut(0, m).copy_from(&jac);
        }
        Err(error) => {
            debug!("cannot compile the Jacobian of affine system: {}", error);
            return Vec::new();
        }
    }

    for (i, equation) in equations.iter().enumerate() {
        match to_numeric_function(equation, unknowns) {
            Ok(residual) => b[i] = -residual.call(origin.as_slice()),
            Err(error) => {
                debug!("cannot compile equation {}: {}", equation, error);
                return Vec::new();
            }
        }
    }

    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        debug!("affine system has non-finite coefficients");
        return Vec::new();
    }

    let svd = a.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    let threshold = (rows as f64) * f64::EPSILON * sigma_max.max(1.0);

    let x = match svd.solve(&b, threshold) {
        Ok(x) => x,
        Err(error) => {
            debug!("singular value decomposition failed: {}", error);
            return Vec::new();
        }
    };

    let residual = (&a * &x - &b).norm();
    if residual > 1e-9 * (1.0 + b.norm()) {
        debug!("affine system is inconsistent (|| Ax - b || = {})", residual);
        return Vec::new();
    }

    let v_t = match svd.v_t.as_ref() {
        Some(v_t) => v_t,
        None => return Vec::new(),
    };

    let null_space = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|(_, sigma)| **sigma <= threshold)
        .map(|(k, _)| k)
        .collect::<Vec<_>>();

    debug!(
        "affine system has rank {} out of {} unknowns",
        n - null_space.len(),
        n
    );

    let point = unknowns
        .iter()
        .enumerate()
        .filter(|(j, _)| null_space.iter().all(|&k| v_t[(k, *j)].abs() <= 1e-9))
        .map(|(j, name)| (name.clone(), snap(x[j])))
        .collect::<Point>();

    vec![point]
}

fn solve_multistart(
    equations: &[Expr],
    unknowns: &[String],
    options: &SolveOptions,
) -> Vec<Point> {
    let n = unknowns.len();

    let system = match CompiledSystem::new(equations, unknowns) {
        Ok(system) => system,
        Err(error) => {
            debug!("cannot compile the system: {}", error);
            return Vec::new();
        }
    };

    let tolerance = options.tolerance;
    let max_iterations = options.max_iterations;
    let mut roots: Vec<Vec<Option<f64>>> = Vec::new();

    for x0 in initial_guesses(n, options) {
        let mut solver = SolverDriver::builder(&system).with_initial(x0).build();

        let found =
            solver.find(|state| state.norm() <= tolerance || state.iter() >= max_iterations);

        let root = match found {
            Ok((x, norm)) if norm <= tolerance => DVector::from_column_slice(x),
            Ok((_, norm)) => {
                debug!("initial guess did not converge (|| r || = {})", norm);
                continue;
            }
            Err(error) => {
                debug!("initial guess failed: {}", error);
                continue;
            }
        };

        let root = polish(&system, root, options);

        if root.iter().any(|v| !v.is_finite()) {
            continue;
        }

        let root = bind(&system, &root, options);

        let is_new = roots.iter().all(|known| {
            known.iter().zip(root.iter()).any(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => (a - b).abs() > 1e-6 * (1.0 + a.abs().max(b.abs())),
                (None, None) => false,
                _ => true,
            })
        });

        if is_new {
            debug!("found root {:?}", root);
            roots.push(root);
        }
    }

    roots.sort_by(|a, b| {
        a.iter()
            .zip(b.iter())
            .map(|(a, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    roots
        .into_iter()
        .map(|root| {
            unknowns
                .iter()
                .zip(root)
                .filter_map(|(name, value)| value.map(|value| (name.clone(), value)))
                .collect()
        })
        .collect()
}

/// Refines a root by Newton steps with the pseudo-inverse of the Jacobian
/// until the step stagnates. The residual is flat around multiple roots, so
/// its norm alone does not tell how close the point is.
fn polish(
    system: &CompiledSystem,
    mut x: DVector<f64>,
    options: &SolveOptions,
) -> DVector<f64> {
    let n = x.len();
    let mut rx = DVector::zeros(n);
    let mut jac = DMatrix::zeros(n, n);

    system.eval(&x, &mut rx);
    let mut norm = rx.norm();

    for _ in 0..options.polish_iterations {
        system.jacobian(&x, &mut jac);

        if jac.iter().chain(rx.iter()).any(|v| !v.is_finite()) {
            break;
        }

        let svd = jac.clone().svd(true, true);
        let eps = (n as f64) * f64::EPSILON * svd.singular_values.max();

        let step = match svd.solve(&rx, eps) {
            Ok(step) => step,
            Err(error) => {
                debug!("cannot compute Newton step: {}", error);
                break;
            }
        };

        if !(step.norm() > STEP_TOLERANCE * (1.0 + x.norm())) {
            break;
        }

        let candidate = &x - &step;
        system.eval(&candidate, &mut rx);
        let candidate_norm = rx.norm();

        // NaN fails both comparisons.
        if !(candidate_norm <= norm || candidate_norm <= options.tolerance) {
            break;
        }

        x = candidate;
        norm = candidate_norm;
    }

    x
}

/// Determines which unknowns the root binds. When the Jacobian is singular,
/// the root is displaced along the projection of each coordinate direction
/// onto the null space and pulled back to the roots. If it stays displaced,
/// the root lies on a set of roots along which the unknown is free.
fn bind(
    system: &CompiledSystem,
    root: &DVector<f64>,
    options: &SolveOptions,
) -> Vec<Option<f64>> {
    let n = root.len();
    let bound = root.iter().map(|&v| Some(snap(v))).collect::<Vec<_>>();

    let mut jac = DMatrix::zeros(n, n);
    system.jacobian(root, &mut jac);

    if jac.iter().any(|v| !v.is_finite()) {
        return bound;
    }

    let svd = jac.svd(false, true);
    let threshold = f64::EPSILON.sqrt() * svd.singular_values.max().max(1.0);

    let v_t = match svd.v_t.as_ref() {
        Some(v_t) => v_t,
        None => return bound,
    };

    let null_space = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|(_, sigma)| **sigma <= threshold)
        .map(|(k, _)| v_t.row(k).transpose())
        .collect::<Vec<DVector<f64>>>();

    if null_space.is_empty() {
        return bound;
    }

    let t = PROBE_DISTANCE * (1.0 + root.norm());

    bound
        .into_iter()
        .enumerate()
        .map(|(j, value)| {
            let direction = null_space
                .iter()
                .fold(DVector::<f64>::zeros(n), |acc, v| acc + v * v[j]);
            let length = direction.norm();

            if length <= 1e-9 {
                return value;
            }

            let direction = direction / length;
            let mut moved = root + &direction * t;

            if system.norm(&moved) > options.tolerance {
                moved = polish(system, moved, options);
            }

            let displacement = (&moved - root).dot(&direction);

            if system.norm(&moved) <= options.tolerance && displacement >= 0.5 * t {
                debug!("root {:?} is not isolated in unknown {}", root.as_slice(), j);
                None
            } else {
                value
            }
        })
        .collect()
}

const STEP_TOLERANCE: f64 = 1e-14;
const PROBE_DISTANCE: f64 = 0.1;

/// Origin, corners of scaled hypercubes (for low dimensions) and normal
/// random samples, in this order.
fn initial_guesses(n: usize, options: &SolveOptions) -> Vec<Vec<f64>> {
    let mut guesses = vec![vec![0.0; n]];

    if n <= 4 {
        for scale in [1.0, 2.5] {
            for pattern in 0..(1usize << n) {
                guesses.push(
                    (0..n)
                        .map(|i| if pattern & (1 << i) == 0 { -scale } else { scale })
                        .collect(),
                );
            }
        }
    }

    match Normal::new(0.0, options.spread) {
        Ok(normal) => {
            let mut rng = StdRng::seed_from_u64(options.seed);
            guesses.extend(
                (0..options.starts).map(|_| (0..n).map(|_| normal.sample(&mut rng)).collect()),
            );
        }
        Err(error) => debug!("invalid spread of initial guesses: {}", error),
    }

    guesses
}

/// Removes round-off noise around zero and integers.
fn snap(value: f64) -> f64 {
    let rounded = value.round();

    if value.abs() < 1e-12 {
        0.0
    } else if (value - rounded).abs() < 1e-10 {
        rounded
    } else {
        value
    }
}
