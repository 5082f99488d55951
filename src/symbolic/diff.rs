//! Symbolic differentiation.

use super::expr::{Expr, Func};

/// Computes the exact derivative of the expression with respect to given
/// variable. The result is simplified by constant folding.
pub fn differentiate(expr: &Expr, var: &str) -> Expr {
    derive(expr, var).simplify()
}

/// Computes the gradient of the expression, one partial derivative for each
/// variable in given order.
pub fn gradient<S: AsRef<str>>(expr: &Expr, vars: &[S]) -> Vec<Expr> {
    vars.iter()
        .map(|var| differentiate(expr, var.as_ref()))
        .collect()
}

/// Computes the Hessian matrix of the expression in given variable order.
///
/// The second derivatives are computed only for the upper triangle and mirrored,
/// so the result is symmetric by construction.
pub fn hessian<S: AsRef<str>>(expr: &Expr, vars: &[S]) -> Vec<Vec<Expr>> {
    let n = vars.len();
    let grad = gradient(expr, vars);
    let mut hes = vec![vec![Expr::Const(0.0); n]; n];

    for i in 0..n {
        for j in i..n {
            let entry = differentiate(&grad[i], vars[j].as_ref());
            hes[j][i] = entry.clone();
            hes[i][j] = entry;
        }
    }

    hes
}

fn derive(expr: &Expr, var: &str) -> Expr {
    if !expr.contains_var(var) {
        return Expr::Const(0.0);
    }

    match expr {
        Expr::Const(_) => Expr::Const(0.0),
        Expr::Var(name) => Expr::Const(if name == var { 1.0 } else { 0.0 }),
        Expr::Neg(a) => -derive(a, var),
        Expr::Add(a, b) => derive(a, var) + derive(b, var),
        Expr::Sub(a, b) => derive(a, var) - derive(b, var),
        Expr::Mul(a, b) => {
            derive(a, var) * b.as_ref().clone() + a.as_ref().clone() * derive(b, var)
        }
        Expr::Div(a, b) => {
            let (da, db) = (derive(a, var), derive(b, var));
            let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
            (da * b.clone() - a * db) / b.pow(Expr::Const(2.0))
        }
        Expr::Pow(base, exponent) => {
            let (u, v) = (base.as_ref().clone(), exponent.as_ref().clone());

            if !v.contains_var(var) {
                // (u^c)' = c u^(c - 1) u'
                v.clone() * u.clone().pow(v - Expr::Const(1.0)) * derive(&u, var)
            } else if !u.contains_var(var) {
                // (c^v)' = c^v ln(c) v'
                u.clone().pow(v.clone()) * u.apply(Func::Log) * derive(&v, var)
            } else {
                // (u^v)' = u^v (v' ln(u) + v u' / u)
                let (du, dv) = (derive(&u, var), derive(&v, var));
                u.clone().pow(v.clone()) * (dv * u.clone().apply(Func::Log) + v * du / u)
            }
        }
        Expr::Func(func, arg) => {
            let u = arg.as_ref().clone();
            let du = derive(&u, var);

            let outer = match func {
                Func::Sin => u.apply(Func::Cos),
                Func::Cos => -u.apply(Func::Sin),
                Func::Tan => Expr::Const(1.0) / u.apply(Func::Cos).pow(Expr::Const(2.0)),
                Func::Exp => u.apply(Func::Exp),
                Func::Log => Expr::Const(1.0) / u,
                Func::Sqrt => Expr::Const(1.0) / (Expr::Const(2.0) * u.apply(Func::Sqrt)),
                Func::Abs => u.clone() / u.apply(Func::Abs),
            };

            outer * du
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::core::Point;
    use crate::symbolic::parse;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn numeric_derivative(expr: &Expr, var: &str, at: &Point) -> f64 {
        let h = 1e-6;
        let mut plus = at.clone();
        let mut minus = at.clone();
        *plus.get_mut(var).unwrap() += h;
        *minus.get_mut(var).unwrap() -= h;
        (expr.eval(&plus).unwrap() - expr.eval(&minus).unwrap()) / (2.0 * h)
    }

    #[test]
    fn polynomial() {
        let f = parse("x^3 - 2*x^2 + 5").unwrap();
        let df = differentiate(&f, "x");

        assert_relative_eq!(df.eval(&point(&[("x", 2.0)])).unwrap(), 4.0);
        assert_eq!(differentiate(&f, "y"), Expr::Const(0.0));
    }

    #[test]
    fn matches_finite_differences() {
        let samples = [
            "sin(x) * cos(y) + exp(x * y)",
            "log(x^2 + 1) / sqrt(y)",
            "x^y + tan(x / 3)",
            "2^x * abs(y - 5)",
            "(x - y)^2 / (1 + x^2)",
        ];
        let at = point(&[("x", 0.8), ("y", 1.7)]);

        for text in samples {
            let f = parse(text).unwrap();
            for var in ["x", "y"] {
                let exact = differentiate(&f, var).eval(&at).unwrap();
                let approx = numeric_derivative(&f, var, &at);
                assert_relative_eq!(exact, approx, epsilon = 1e-6, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn gradient_and_hessian() {
        let f = parse("x^2 * y + y^3").unwrap();
        let vars = ["x", "y"];
        let at = point(&[("x", 1.0), ("y", 2.0)]);

        let grad = gradient(&f, &vars)
            .iter()
            .map(|g| g.eval(&at).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(grad, vec![4.0, 13.0]);

        let hes = hessian(&f, &vars);
        assert_eq!(hes[0][0].eval(&at), Ok(4.0));
        assert_eq!(hes[0][1].eval(&at), Ok(2.0));
        assert_eq!(hes[1][0], hes[0][1]);
        assert_eq!(hes[1][1].eval(&at), Ok(12.0));
    }
}
