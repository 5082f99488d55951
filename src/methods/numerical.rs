//! Numerical minimization with and without constraints.
//!
//! [`Unconstrained`] minimizes the objective by [BFGS](crate::algo::bfgs)
//! using the analytic gradient. [`Constrained`] handles both equality and
//! inequality constraints by the augmented Lagrangian method: the constrained
//! problem is replaced by a sequence of unconstrained minimizations of
//!
//! ```text
//! L(x) = f(x) + Σ (λᵢ hᵢ(x) + ρ/2 hᵢ(x)²) + Σ (max(0, μⱼ + ρ gⱼ(x))² - μⱼ²) / 2ρ
//! ```
//!
//! for equalities `hᵢ(x) = 0` and inequalities `gⱼ(x) <= 0`, after each of
//! which the multipliers are updated and the penalty parameter ρ is increased
//! if the violation did not decrease sufficiently.
//!
//! Both methods always report the terminal iterate. Whether the convergence
//! criterion was met is reported separately in the `converged` flag.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5),
//! chapter 17

use getset::{CopyGetters, Setters};
use log::{debug, warn};
use nalgebra::{
    storage::{Storage, StorageMut},
    DVector, Dyn, IsContiguous, Vector,
};

use crate::algo::{bfgs::BfgsError, nelder_mead::NelderMeadError, Bfgs};
use crate::core::{
    ConstraintKind, Differentiable, Function, Method, MethodError, NumericProblem, Optimizer,
    Optimum, Problem, Solution,
};
use crate::driver::MinimizerDriver;
use crate::symbolic::CompiledFunction;

use super::{initial_vector, to_point, union_variables};

/// BFGS minimization without constraints.
///
/// Constraints of the problem are ignored. The iteration stops when the
/// gradient norm drops below the tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl Optimizer for Unconstrained {
    fn method(&self) -> Method {
        Method::Unconstrained
    }

    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError> {
        problem.check_iteration_options()?;

        let objective = problem.parse_objective()?;
        let vars = objective.free_variables();
        let f = CompiledFunction::new(&objective, &vars)?;

        let mut x = DVector::from_vec(initial_vector(problem.initial_point(), &vars));
        let (iterations, converged) = InnerMinimizer::Bfgs.run(
            &f,
            &mut x,
            problem.tolerance(),
            problem.max_iterations(),
        )?;

        if !converged {
            warn!("BFGS did not converge in {} iterations", iterations);
        }

        let value = f.call(x.as_slice());

        if !value.is_finite() {
            return Err(MethodError::NonFinite);
        }

        Ok(Solution {
            optimum: Optimum::new(to_point(&vars, x.as_slice()), value),
            iterations,
            converged: Some(converged),
        })
    }
}

/// Algorithm for the unconstrained subproblems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerMinimizer {
    /// [BFGS](crate::algo::bfgs) using the analytic gradient.
    Bfgs,
    /// Derivative-free [Nelder-Mead](crate::algo::nelder_mead).
    NelderMead,
}

impl InnerMinimizer {
    /// Minimizes the function starting from `x`, which is overwritten by the
    /// terminal iterate. Returns the number of iterations and whether the
    /// convergence criterion was met.
    ///
    /// BFGS converges when the gradient norm is under the tolerance, Nelder-Mead
    /// when the spread of the function values in the simplex is.
    fn run<F: Differentiable>(
        &self,
        f: &F,
        x: &mut DVector<f64>,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<(usize, bool), MethodError> {
        let mut iterations = 0;
        let mut converged = false;

        match self {
            InnerMinimizer::Bfgs => {
                let mut minimizer = MinimizerDriver::builder(f)
                    .with_algo(Bfgs::new)
                    .with_initial(x.as_slice().to_vec())
                    .build();

                while iterations < max_iterations {
                    match minimizer.next() {
                        Ok(_) => iterations += 1,
                        Err(BfgsError::NonFinite) => return Err(MethodError::NonFinite),
                        Err(error @ BfgsError::LineSearchFailed) => {
                            debug!("inner minimization stopped: {}", error);
                            break;
                        }
                    }

                    if minimizer.algo().grad_norm() < tolerance {
                        converged = true;
                        break;
                    }
                }

                x.copy_from_slice(minimizer.x());
            }
            InnerMinimizer::NelderMead => {
                let mut minimizer = MinimizerDriver::builder(f)
                    .with_initial(x.as_slice().to_vec())
                    .build();

                while iterations < max_iterations {
                    match minimizer.next() {
                        Ok(_) => iterations += 1,
                        Err(NelderMeadError::SimplexInvalid) => {
                            return Err(MethodError::NonFinite)
                        }
                        Err(error @ NelderMeadError::SimplexCollapsed) => {
                            debug!("inner minimization stopped: {}", error);
                            break;
                        }
                    }

                    if minimizer.algo().value_spread() < tolerance {
                        converged = true;
                        break;
                    }
                }

                x.copy_from_slice(minimizer.x());
            }
        }

        Ok((iterations, converged))
    }
}

/// Augmented Lagrangian function for given multipliers and penalty parameter.
///
/// See [module](self) documentation for the definition.
pub struct AugmentedLagrangian {
    objective: CompiledFunction,
    equalities: Vec<CompiledFunction>,
    inequalities: Vec<CompiledFunction>,
    lambda: Vec<f64>,
    mu: Vec<f64>,
    rho: f64,
}

impl AugmentedLagrangian {
    /// Creates the function with zero multipliers and given penalty parameter.
    ///
    /// All functions must be compiled in the same variable order.
    pub fn new(
        objective: CompiledFunction,
        equalities: Vec<CompiledFunction>,
        inequalities: Vec<CompiledFunction>,
        rho: f64,
    ) -> Self {
        Self {
            lambda: vec![0.0; equalities.len()],
            mu: vec![0.0; inequalities.len()],
            objective,
            equalities,
            inequalities,
            rho,
        }
    }

    /// The current penalty parameter.
    pub fn penalty(&self) -> f64 {
        self.rho
    }

    /// Multipliers of equality constraints.
    pub fn equality_multipliers(&self) -> &[f64] {
        &self.lambda
    }

    /// Multipliers of inequality constraints.
    pub fn inequality_multipliers(&self) -> &[f64] {
        &self.mu
    }

    /// Maximum constraint violation in given point.
    pub fn violation(&self, x: &[f64]) -> f64 {
        let equalities = self.equalities.iter().map(|h| h.call(x).abs());
        let inequalities = self.inequalities.iter().map(|g| g.call(x).max(0.0));

        equalities
            .chain(inequalities)
            .fold(0.0, |max, v| if v.is_nan() { f64::NAN } else { max.max(v) })
    }

    /// Updates the multipliers using the constraint values in given point.
    pub fn update_multipliers(&mut self, x: &[f64]) {
        let rho = self.rho;

        for (lambda, h) in self.lambda.iter_mut().zip(self.equalities.iter()) {
            *lambda += rho * h.call(x);
        }

        for (mu, g) in self.mu.iter_mut().zip(self.inequalities.iter()) {
            *mu = (*mu + rho * g.call(x)).max(0.0);
        }
    }

    /// Multiplies the penalty parameter by given factor, up to given maximum.
    pub fn increase_penalty(&mut self, factor: f64, max: f64) {
        self.rho = (self.rho * factor).min(max);
    }
}

impl NumericProblem for AugmentedLagrangian {
    fn dim(&self) -> usize {
        self.objective.dim()
    }
}

impl Function for AugmentedLagrangian {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let xs = x.as_slice();
        let rho = self.rho;
        let mut value = self.objective.call(xs);

        for (lambda, h) in self.lambda.iter().zip(self.equalities.iter()) {
            let hx = h.call(xs);
            value += lambda * hx + 0.5 * rho * hx * hx;
        }

        for (mu, g) in self.mu.iter().zip(self.inequalities.iter()) {
            let shifted = (mu + rho * g.call(xs)).max(0.0);
            value += (shifted * shifted - mu * mu) / (2.0 * rho);
        }

        value
    }
}

impl Differentiable for AugmentedLagrangian {
    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        let xs = x.as_slice();
        let rho = self.rho;
        let mut partial = DVector::zeros(self.dim());

        self.objective.gradient(x, grad);

        for (lambda, h) in self.lambda.iter().zip(self.equalities.iter()) {
            let coeff = lambda + rho * h.call(xs);
            h.gradient(x, &mut partial);
            grad.axpy(coeff, &partial, 1.0);
        }

        for (mu, g) in self.mu.iter().zip(self.inequalities.iter()) {
            let coeff = (mu + rho * g.call(xs)).max(0.0);

            if coeff > 0.0 {
                g.gradient(x, &mut partial);
                grad.axpy(coeff, &partial, 1.0);
            }
        }
    }
}

/// Options for [`Constrained`] method.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct AugmentedLagrangianOptions {
    /// Minimizer of the subproblems. Default: BFGS.
    inner: InnerMinimizer,
    /// Initial penalty parameter. Default: `10`.
    initial_penalty: f64,
    /// Factor by which the penalty parameter grows. Default: `10`.
    penalty_growth: f64,
    /// Upper bound of the penalty parameter. Default: `1e8`.
    max_penalty: f64,
    /// Ratio by which the violation must decrease in one outer iteration, the
    /// penalty grows otherwise. Default: `0.25`.
    violation_decrease: f64,
    /// Maximum number of outer iterations. Default: `50`.
    max_outer_iterations: usize,
}

impl Default for AugmentedLagrangianOptions {
    fn default() -> Self {
        Self {
            inner: InnerMinimizer::Bfgs,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e8,
            violation_decrease: 0.25,
            max_outer_iterations: 50,
        }
    }
}

/// Augmented Lagrangian minimization with equality and inequality
/// constraints.
#[derive(Debug, Clone, Default)]
pub struct Constrained {
    options: AugmentedLagrangianOptions,
}

impl Constrained {
    /// Creates the method with given options.
    pub fn with_options(options: AugmentedLagrangianOptions) -> Self {
        Self { options }
    }

    /// The options of the method.
    pub fn options(&self) -> &AugmentedLagrangianOptions {
        &self.options
    }
}

impl Optimizer for Constrained {
    fn method(&self) -> Method {
        Method::Constrained
    }

    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError> {
        if !problem.has_constraints() {
            return Err(MethodError::MissingConstraints);
        }

        problem.check_iteration_options()?;

        let AugmentedLagrangianOptions {
            inner,
            initial_penalty,
            penalty_growth,
            max_penalty,
            violation_decrease,
            max_outer_iterations,
        } = self.options;

        let objective = problem.parse_objective()?;
        let constraints =
            problem.parse_constraints_as(Method::Constrained.bare_constraint_kind())?;
        let objective_vars = objective.free_variables();
        let vars = union_variables(
            std::iter::once(&objective).chain(constraints.iter().map(|c| c.residual())),
        );

        let compile = |kind: ConstraintKind| {
            constraints
                .iter()
                .filter(|c| c.kind() == kind)
                .map(|c| CompiledFunction::new(c.residual(), &vars))
                .collect::<Result<Vec<_>, _>>()
        };

        let equalities = compile(ConstraintKind::Equality)?;
        let inequalities = compile(ConstraintKind::Inequality)?;
        let f = CompiledFunction::new(&objective, &vars)?;

        debug!(
            "augmented Lagrangian with {} equalities and {} inequalities in {:?}",
            equalities.len(),
            inequalities.len(),
            vars
        );

        let mut lagrangian =
            AugmentedLagrangian::new(f, equalities, inequalities, initial_penalty);

        let tolerance = problem.tolerance();
        let mut x = DVector::from_vec(initial_vector(problem.initial_point(), &vars));
        let mut violation = lagrangian.violation(x.as_slice());
        let mut iterations = 0;
        let mut converged = false;

        for outer in 0..max_outer_iterations {
            let (inner_iterations, inner_converged) =
                inner.run(&lagrangian, &mut x, tolerance, problem.max_iterations())?;
            iterations += inner_iterations;

            let new_violation = lagrangian.violation(x.as_slice());

            debug!(
                "outer iteration {}: {} inner iterations, violation = {}, rho = {}, x = {:?}",
                outer,
                inner_iterations,
                new_violation,
                lagrangian.penalty(),
                x.as_slice()
            );

            if new_violation.is_nan() {
                return Err(MethodError::NonFinite);
            }

            if new_violation < tolerance && inner_converged {
                converged = true;
                break;
            }

            lagrangian.update_multipliers(x.as_slice());

            if new_violation > violation_decrease * violation {
                lagrangian.increase_penalty(penalty_growth, max_penalty);
            }

            violation = new_violation;
        }

        if !converged {
            warn!(
                "augmented Lagrangian did not converge (violation = {})",
                lagrangian.violation(x.as_slice())
            );
        }

        let point = to_point(&vars, x.as_slice());
        let value = objective.eval(&point)?;

        if !value.is_finite() {
            return Err(MethodError::NonFinite);
        }

        let point = point
            .into_iter()
            .filter(|(var, _)| objective_vars.contains(var))
            .collect();

        Ok(Solution {
            optimum: Optimum::new(point, value),
            iterations,
            converged: Some(converged),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    use crate::core::Point;
    use crate::symbolic::parse;

    #[test]
    fn unconstrained_rosenbrock() {
        let problem = Problem::new("(1 - x)^2 + 100*(y - x^2)^2");
        let result = Unconstrained.solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(point["y"], 1.0, epsilon = 1e-4);
        assert_eq!(result.converged(), Some(true));
    }

    #[test]
    fn unconstrained_ignores_constraints() {
        let problem = Problem::new("(x - 2)^2").with_constraint("x <= 1");
        let result = Unconstrained.solve(&problem);

        assert_abs_diff_eq!(result.optimal_point().unwrap()["x"], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn equality_constraint() {
        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let result = Constrained::default().solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(point["y"], 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(result.optimal_value().unwrap(), 0.5, epsilon = 1e-5);
        assert_eq!(result.converged(), Some(true));
    }

    #[test]
    fn active_inequality() {
        let problem = Problem::new("(x - 2)^2 + (y - 1)^2").with_constraint("x <= 1");
        let result = Constrained::default().solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(point["y"], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn inactive_inequality() {
        let problem = Problem::new("(x - 2)^2").with_constraint("x >= -3");
        let result = Constrained::default().solve(&problem);

        assert_abs_diff_eq!(result.optimal_point().unwrap()["x"], 2.0, epsilon = 1e-6);
        assert_eq!(result.converged(), Some(true));
    }

    #[test]
    fn bare_constraint_is_inequality() {
        // Read as `x - 1 <= 0`, which is inactive at the unconstrained minimum.
        let problem = Problem::new("x^2").with_constraint("x - 1");
        let result = Constrained::default().solve(&problem);

        assert_abs_diff_eq!(result.optimal_point().unwrap()["x"], 0.0, epsilon = 1e-6);

        // `x + 1 <= 0` is active.
        let problem = Problem::new("x^2").with_constraint("x + 1");
        let result = Constrained::default().solve(&problem);

        assert_abs_diff_eq!(result.optimal_point().unwrap()["x"], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn derivative_free_inner_minimizer() {
        let mut options = AugmentedLagrangianOptions::default();
        options.set_inner(InnerMinimizer::NelderMead);

        let problem = Problem::new("x^2 + y^2").with_constraint("x + y == 1");
        let result = Constrained::with_options(options).solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 0.5, epsilon = 1e-2);
        assert_abs_diff_eq!(point["y"], 0.5, epsilon = 1e-2);
    }

    #[test]
    fn constraint_only_variables_are_not_reported() {
        let problem = Problem::new("x^2").with_constraint("x + z == 2");
        let result = Constrained::default().solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_eq!(point.keys().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn missing_constraints() {
        let result = Constrained::default().solve(&Problem::new("x^2"));
        assert_eq!(result.error(), Some(&MethodError::MissingConstraints));
    }

    #[test]
    fn augmented_lagrangian_gradient() {
        let vars = ["x", "y"];
        let compile = |text: &str| CompiledFunction::new(&parse(text).unwrap(), &vars).unwrap();

        let mut lagrangian = AugmentedLagrangian::new(
            compile("x^2 + y^2"),
            vec![compile("x + y - 1")],
            vec![compile("x - 0.2")],
            10.0,
        );

        let point: Point = [("x".to_string(), 0.4), ("y".to_string(), 0.3)].into();
        let x = DVector::from_vec(point.values().copied().collect());
        lagrangian.update_multipliers(x.as_slice());

        assert_abs_diff_eq!(lagrangian.equality_multipliers()[0], -3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lagrangian.inequality_multipliers()[0], 2.0, epsilon = 1e-12);

        let mut grad = DVector::zeros(2);
        lagrangian.gradient(&x, &mut grad);

        let h = 1e-6;
        for i in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[i] += h;
            xm[i] -= h;
            let numeric = (lagrangian.apply(&xp) - lagrangian.apply(&xm)) / (2.0 * h);
            assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-5);
        }
    }
}
