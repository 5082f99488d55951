use criterion::{criterion_group, criterion_main, Criterion};
use optcalc::{
    algo::{Bfgs, NelderMead, TrustRegion},
    nalgebra as na,
    testing::*,
    Function, Method, Minimizer, Solver,
};

const MAX_ITERS: usize = 100_000;
const VALUE_TOLERANCE: f64 = 1e-10;
const NORM_TOLERANCE: f64 = 1e-12;

fn minimize<F, M>(f: &F, mut minimizer: M, mut x: na::DVector<f64>) -> bool
where
    F: Function,
    M: Minimizer<F>,
{
    for _ in 0..MAX_ITERS {
        match minimizer.opt_next(f, &mut x) {
            Ok(fx) if fx < VALUE_TOLERANCE => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }

    false
}

fn solve<R, S>(r: &R, mut solver: S, mut x: na::DVector<f64>) -> bool
where
    R: TestSystem,
    S: Solver<R>,
{
    let mut rx = x.clone_owned();

    for _ in 0..MAX_ITERS {
        if solver.solve_next(r, &mut x, &mut rx).is_err() {
            return false;
        }

        if rx.norm() < NORM_TOLERANCE {
            return true;
        }
    }

    false
}

fn methods(c: &mut Criterion) {
    let all = [
        Method::GradientDescent,
        Method::Lagrange,
        Method::PartialDerivatives,
        Method::Unconstrained,
        Method::Constrained,
    ];

    for known in known_problems() {
        for method in all {
            // Not every method is applicable to every problem, failures are
            // measured as well.
            c.bench_function(&format!("{} {}", method.name(), known.name), |b| {
                b.iter(|| method.solve(&known.problem))
            });
        }
    }
}

fn minimizers(c: &mut Criterion) {
    let f = ExtendedRosenbrock::new(2);

    for (i, x) in f.initials().into_iter().enumerate() {
        c.bench_function(&format!("BFGS rosenbrock {}", i + 1), |b| {
            b.iter(|| assert!(minimize(&f, Bfgs::new(&f), x.clone_owned())))
        });

        c.bench_function(&format!("Nelder-Mead rosenbrock {}", i + 1), |b| {
            b.iter(|| assert!(minimize(&f, NelderMead::new(&f), x.clone_owned())))
        });
    }

    let f = ExtendedRosenbrock::new(20);
    let x = &f.initials()[0];

    c.bench_function("BFGS rosenbrock large", |b| {
        b.iter(|| assert!(minimize(&f, Bfgs::new(&f), x.clone_owned())))
    });
}

fn solvers(c: &mut Criterion) {
    let r = ExtendedRosenbrock::new(2);

    for (i, x) in r.initials().into_iter().enumerate() {
        c.bench_function(&format!("trust region rosenbrock {}", i + 1), |b| {
            b.iter(|| assert!(solve(&r, TrustRegion::new(&r), x.clone_owned())))
        });
    }

    let r = CircleLine::default();
    let x = &r.initials()[0];

    c.bench_function("trust region circle and line", |b| {
        b.iter(|| assert!(solve(&r, TrustRegion::new(&r), x.clone_owned())))
    });
}

criterion_group!(benches, methods, minimizers, solvers);
criterion_main!(benches);
