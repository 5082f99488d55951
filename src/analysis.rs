//! Various analyses for supporting the solving.

use crate::symbolic::{differentiate, Expr};

/// Detects unknowns that appear non-linearly in the system of equations.
///
/// Linear unknowns have no effect on the Jacobian matrix, i.e., the
/// corresponding column is constant. This is recognized symbolically: an
/// unknown is linear if every second-order derivative of every equation with
/// respect to it simplifies to zero. When no unknown is non-linear, the system
/// is affine and can be solved exactly by linear algebra.
///
/// The returned indices refer to the order of `unknowns`. Expressions that the
/// simplifier cannot reduce to zero are conservatively considered non-linear.
pub fn detect_non_linear_unknowns<S: AsRef<str>>(equations: &[Expr], unknowns: &[S]) -> Vec<usize> {
    let mut non_linear = vec![false; unknowns.len()];

    for equation in equations {
        let first = unknowns
            .iter()
            .map(|var| differentiate(equation, var.as_ref()))
            .collect::<Vec<_>>();

        for (j, dj) in first.iter().enumerate() {
            if non_linear[j] {
                continue;
            }

            if unknowns
                .iter()
                .any(|var| !differentiate(dj, var.as_ref()).is_zero())
            {
                non_linear[j] = true;
            }
        }
    }

    non_linear
        .into_iter()
        .enumerate()
        .filter(|(_, is_non_linear)| *is_non_linear)
        .map(|(j, _)| j)
        .collect()
}

/// Returns true if every equation is affine in the unknowns.
pub fn is_affine<S: AsRef<str>>(equations: &[Expr], unknowns: &[S]) -> bool {
    detect_non_linear_unknowns(equations, unknowns).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::symbolic::parse;

    #[test]
    fn non_linear_vars_detection_basic() {
        let equations = [parse("x").unwrap(), parse("y^2").unwrap()];
        assert_eq!(detect_non_linear_unknowns(&equations, &["x", "y"]), vec![1]);
    }

    #[test]
    fn products_are_non_linear() {
        let equations = [parse("x*y - 1").unwrap(), parse("z + 2").unwrap()];
        assert_eq!(
            detect_non_linear_unknowns(&equations, &["x", "y", "z"]),
            vec![0, 1]
        );
    }

    #[test]
    fn lagrangian_stationarity_is_affine() {
        // L = x^2 + y^2 + lambda_0 (x + y - 1)
        let equations = [
            parse("2*x + lambda_0").unwrap(),
            parse("2*y + lambda_0").unwrap(),
            parse("x + y - 1").unwrap(),
        ];
        assert!(is_affine(&equations, &["lambda_0", "x", "y"]));
    }

    #[test]
    fn division_by_constant_is_linear() {
        let equations = [parse("x / 2 - 3 * y").unwrap(), parse("sin(x)").unwrap()];
        assert!(is_affine(&equations[..1], &["x", "y"]));
        assert!(!is_affine(&equations, &["x", "y"]));
    }
}
