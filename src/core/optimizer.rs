use std::time::Instant;

use log::debug;

use super::problem::Problem;
use super::result::{Method, MethodError, OptimizationResult, Solution};

/// Common interface of the optimization methods.
///
/// Implementations provide [`minimize`](Optimizer::minimize); the provided
/// [`solve`](Optimizer::solve) turns its outcome into a normalized
/// [`OptimizationResult`] and measures the computation time on every exit
/// path.
pub trait Optimizer {
    /// The method implemented by the optimizer.
    fn method(&self) -> Method;

    /// Minimizes the objective of the problem.
    fn minimize(&self, problem: &Problem) -> Result<Solution, MethodError>;

    /// Runs the method and records the result.
    fn solve(&self, problem: &Problem) -> OptimizationResult {
        let method = self.method();
        let stopwatch = Stopwatch::start();

        let outcome = self.minimize(problem);
        let elapsed = stopwatch.elapsed();

        match &outcome {
            Ok(solution) => debug!(
                "{} finished in {:.6} s after {} iterations with value {}",
                method, elapsed, solution.iterations, solution.optimum.value()
            ),
            Err(error) => debug!("{} failed in {:.6} s: {}", method, elapsed, error),
        }

        OptimizationResult::new(method, outcome, elapsed)
    }
}

/// Measures elapsed wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Starts the measurement.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time in seconds since the start.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::Optimum;

    struct Failing;

    impl Optimizer for Failing {
        fn method(&self) -> Method {
            Method::Lagrange
        }

        fn minimize(&self, _: &Problem) -> Result<Solution, MethodError> {
            Err(MethodError::MissingConstraints)
        }
    }

    struct Constant;

    impl Optimizer for Constant {
        fn method(&self) -> Method {
            Method::PartialDerivatives
        }

        fn minimize(&self, _: &Problem) -> Result<Solution, MethodError> {
            Ok(Solution::analytic(Optimum::new(Default::default(), 3.0)))
        }
    }

    #[test]
    fn solve_records_failures() {
        let result = Failing.solve(&Problem::new("x"));

        assert_eq!(result.method(), Method::Lagrange);
        assert!(result.error().is_some());
        assert!(result.computation_time() >= 0.0);
    }

    #[test]
    fn solve_records_success() {
        let result = Constant.solve(&Problem::new("3"));

        assert_eq!(result.optimal_value(), Some(3.0));
        assert_eq!(result.iterations(), 1);
        assert!(result.computation_time() >= 0.0);
    }
}
