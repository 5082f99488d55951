use optcalc::nalgebra as na;
use optcalc::{Function, Minimizer, MinimizerDriver, NumericProblem};
use na::{storage::StorageMut, DVector, Dyn, IsContiguous, Vector};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

// Random search around the best point found so far.
struct RandomSearch {
    rng: StdRng,
    noise: Normal<f64>,
    best: f64,
}

impl RandomSearch {
    fn new(seed: u64, sigma: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, sigma).expect("invalid standard deviation"),
            best: f64::INFINITY,
        }
    }
}

impl<F: Function> Minimizer<F> for RandomSearch {
    const NAME: &'static str = "Random search";
    type Error = std::convert::Infallible;

    fn opt_next<Sx>(&mut self, f: &F, x: &mut Vector<f64, Dyn, Sx>) -> Result<f64, Self::Error>
    where
        Sx: StorageMut<f64, Dyn> + IsContiguous,
    {
        if self.best.is_infinite() {
            self.best = f.apply(x);
        }

        // Perturb the current point.
        let trial = DVector::from_iterator(
            x.len(),
            x.iter().map(|xi| xi + self.noise.sample(&mut self.rng)),
        );

        let value = f.apply(&trial);

        if value < self.best {
            self.best = value;
            x.copy_from(&trial);
        }

        // We must return the value in x.
        Ok(self.best)
    }
}

// https://en.wikipedia.org/wiki/Rosenbrock_function
struct Rosenbrock {
    a: f64,
    b: f64,
}

impl NumericProblem for Rosenbrock {
    fn dim(&self) -> usize {
        2
    }
}

impl Function for Rosenbrock {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: na::storage::Storage<f64, Dyn> + IsContiguous,
    {
        (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
    }
}

fn main() {
    let f = Rosenbrock { a: 1.0, b: 1.0 };
    let mut minimizer = MinimizerDriver::builder(&f)
        .with_algo(|_| RandomSearch::new(42, 0.1))
        .with_initial(vec![-2.0, 2.0])
        .build();

    let name = minimizer.name().to_string();
    let result = minimizer.find(|state| {
        println!("f(x) = {}\tx = {:?}", state.fx(), state.x());
        state.iter() >= 100 || state.fx() < 1e-6
    });

    match result {
        Ok((x, value)) => println!("{} found f({:?}) = {}", name, x, value),
        Err(error) => match error {},
    }
}
