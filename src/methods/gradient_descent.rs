//! Gradient descent with a fixed learning rate.
//!
//! Starting from the initial point, the iterate moves against the gradient,
//! `x' = x - η ∇f(x)`. The iteration stops when the length of the step would
//! be smaller than the tolerance, in which case the step is not applied and the
//! current point stands.
//!
//! Divergence is not detected specially: with too large learning rate the
//! method runs until the iteration cap and reports the last iterate with
//! `converged == Some(false)`, unless the values overflow.

use log::{debug, warn};
use nalgebra::DVector;

use crate::core::{
    Differentiable, Function, Method, MethodError, Optimizer, Optimum, Problem, Solution,
};
use crate::symbolic::CompiledFunction;

use super::{initial_vector, to_point};

/// Gradient descent method.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDescent;

impl Optimizer for GradientDescent {
    fn method(&self) -> Method {
        Method::GradientDescent
    }

    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError> {
        problem.check_iteration_options()?;

        let objective = problem.parse_objective()?;
        let vars = objective.free_variables();
        let f = CompiledFunction::new(&objective, &vars)?;

        let learning_rate = problem.learning_rate();
        let tolerance = problem.tolerance();
        let max_iterations = problem.max_iterations();

        let mut x = DVector::from_vec(initial_vector(problem.initial_point(), &vars));
        let mut x_new = x.clone();
        let mut grad = DVector::zeros(vars.len());

        let mut iterations = max_iterations;
        let mut converged = false;

        for k in 0..max_iterations {
            f.gradient(&x, &mut grad);

            x_new.copy_from(&x);
            x_new.axpy(-learning_rate, &grad, 1.0);

            if x_new.iter().any(|xi| !xi.is_finite()) {
                debug!("iterate {} is not finite: {:?}", k, x_new.as_slice());
                return Err(MethodError::NonFinite);
            }

            let step = (&x_new - &x).norm();

            if step < tolerance {
                debug!("step {} < {} in iteration {}, stop", step, tolerance, k);
                iterations = k;
                converged = true;
                break;
            }

            std::mem::swap(&mut x, &mut x_new);
            debug!("iteration {}: step = {}, x = {:?}", k, step, x.as_slice());
        }

        if !converged {
            warn!(
                "gradient descent did not converge in {} iterations (learning rate {}), it may diverge",
                max_iterations, learning_rate
            );
        }

        let value = f.apply(&x);

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

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    use crate::core::Point;

    #[test]
    fn quadratic_bowl() {
        let centers = [1.0, -2.0, 0.5];
        let problem = Problem::new("(a - 1)^2 + (b + 2)^2 + (c - 0.5)^2")
            .with_learning_rate(0.1)
            .with_tolerance(1e-9);

        let result = GradientDescent.solve(&problem);
        let point = result.optimal_point().unwrap();

        for (var, center) in ["a", "b", "c"].iter().zip(centers) {
            assert_abs_diff_eq!(point[*var], center, epsilon = 1e-6);
        }
        assert_eq!(result.converged(), Some(true));
        assert!(result.iterations() < problem.max_iterations());
    }

    #[test]
    fn quadratic_bowl_from_any_start() {
        let initial: Point = [("x".to_string(), -40.0), ("y".to_string(), 25.0)].into();
        let problem = Problem::new("(x - 3)^2 + (y - 4)^2")
            .with_initial_point(initial)
            .with_learning_rate(0.05)
            .with_tolerance(1e-10);

        let result = GradientDescent.solve(&problem);
        let point = result.optimal_point().unwrap();

        assert_abs_diff_eq!(point["x"], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(point["y"], 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.optimal_value().unwrap(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn last_step_is_not_applied() {
        // With learning rate 0.5 the first step lands exactly in the minimum
        // and the second step is zero.
        let initial: Point = [("x".to_string(), 3.0)].into();
        let problem = Problem::new("x^2")
            .with_initial_point(initial)
            .with_learning_rate(0.5);

        let result = GradientDescent.solve(&problem);

        assert_eq!(result.iterations(), 1);
        assert_eq!(result.optimal_point().unwrap()["x"], 0.0);
        assert_eq!(result.optimal_value(), Some(0.0));
    }

    #[test]
    fn oscillation_reaches_iteration_cap() {
        let initial: Point = [("x".to_string(), 1.0)].into();
        let problem = Problem::new("x^2")
            .with_initial_point(initial)
            .with_learning_rate(1.0)
            .with_max_iterations(10);

        let result = GradientDescent.solve(&problem);

        assert_eq!(result.iterations(), 10);
        assert_eq!(result.converged(), Some(false));
        assert_eq!(result.optimal_point().unwrap()["x"], 1.0);
    }

    #[test]
    fn divergence_to_infinity_is_an_error() {
        let initial: Point = [("x".to_string(), 1.0)].into();
        let problem = Problem::new("x^2")
            .with_initial_point(initial)
            .with_learning_rate(2.0);

        let result = GradientDescent.solve(&problem);

        assert_eq!(result.error(), Some(&MethodError::NonFinite));
        assert!(result.optimal_point().is_none());
    }

    #[test]
    fn invalid_options() {
        let problem = Problem::new("x^2").with_learning_rate(-0.1);
        assert!(matches!(
            GradientDescent.solve(&problem).error(),
            Some(MethodError::InvalidOption(_))
        ));

        let problem = Problem::new("x^2").with_max_iterations(0);
        assert!(matches!(
            GradientDescent.solve(&problem).error(),
            Some(MethodError::InvalidOption(_))
        ));
    }

    #[test]
    fn parse_error_is_reported() {
        let result = GradientDescent.solve(&Problem::new("(x + 1"));

        assert!(matches!(result.error(), Some(MethodError::Parse(_))));
        assert_eq!(result.iterations(), 0);
    }
}
