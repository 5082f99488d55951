/// The base trait for [`System`](super::system::System) and
/// [`Function`](super::function::Function).
///
/// All numeric problems in this crate work with `f64` values stored in
/// dynamically sized vectors. The only information shared by all of them is
/// the number of variables.
pub trait NumericProblem {
    /// Return the number of variables of the problem.
    fn dim(&self) -> usize;
}

impl<P: NumericProblem + ?Sized> NumericProblem for &P {
    fn dim(&self) -> usize {
        (**self).dim()
    }
}
