//! Core trait and sample types for Parallel Tempering.

use rand::Rng;

/// Defines a Parallel Tempering problem.
///
/// The user implements initial construction, neighbor generation, and
/// cost evaluation. The engine handles replicas, the temperature ladder,
/// replica exchange, and scheduling across worker threads.
///
/// # Minimization
///
/// PT minimizes the cost function. For maximization, negate the cost.
///
/// # Examples
///
/// ```ignore
/// struct TspProblem { distances: Vec<Vec<f64>> }
///
/// impl PtProblem for TspProblem {
///     type Solution = Vec<usize>;
///
///     fn construction<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
///         let mut tour: Vec<usize> = (0..self.distances.len()).collect();
///         tour.shuffle(rng);
///         tour
///     }
///
///     fn neighbor<R: Rng>(&self, tour: &Vec<usize>, rng: &mut R) -> Vec<usize> {
///         let mut new = tour.clone();
///         let i = rng.random_range(0..new.len());
///         let j = rng.random_range(0..new.len());
///         new.swap(i, j);
///         new
///     }
///
///     fn evaluate(&self, tour: &Vec<usize>) -> f64 {
///         tour.windows(2).map(|w| self.distances[w[0]][w[1]]).sum()
///     }
/// }
/// ```
///
/// # Thread Safety
///
/// Every replica calls into the same problem instance from its worker
/// thread, so the problem must be `Send + Sync`.
pub trait PtProblem: Send + Sync {
    /// The solution representation type.
    type Solution: Clone + Send;

    /// Creates an initial solution.
    fn construction<R: Rng>(&self, rng: &mut R) -> Self::Solution;

    /// Creates the initial solution for a specific replica.
    ///
    /// Replica `0` is the coldest rung. Override this to seed selected
    /// replicas with a heuristic construction while the others start
    /// from [`construction`](PtProblem::construction).
    fn construction_for_replica<R: Rng>(&self, _replica: usize, rng: &mut R) -> Self::Solution {
        self.construction(rng)
    }

    /// Generates one stochastic local perturbation of `solution`.
    fn neighbor<R: Rng>(&self, solution: &Self::Solution, rng: &mut R) -> Self::Solution;

    /// Computes the cost of a solution. Lower is better.
    ///
    /// Must be deterministic and finite; a non-finite cost aborts the run.
    fn evaluate(&self, solution: &Self::Solution) -> f64;
}

/// Round-trip label carried by a sample.
///
/// A sample is labelled `Up` when it last sat on the coldest rung after
/// an exchange, and `Down` when it last sat on the hottest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Not yet visited either end of the ladder.
    #[default]
    None,
    /// Last labelled at the coldest rung (travelling towards hot).
    Up,
    /// Last labelled at the hottest rung (travelling towards cold).
    Down,
}

/// An evaluated solution as it moves through the replica chain.
#[derive(Debug, Clone)]
pub struct Sample<S> {
    /// The problem's solution value.
    pub solution: S,

    /// Cost returned by [`PtProblem::evaluate`].
    pub cost: f64,

    /// Round-trip label.
    pub direction: Direction,

    /// Cycle in which this sample was produced (0 = initial construction).
    pub cycle: usize,

    /// Replica that produced this sample.
    pub replica: usize,
}

impl<S> Sample<S> {
    pub(crate) fn new(solution: S, cost: f64, cycle: usize, replica: usize) -> Self {
        Self {
            solution,
            cost,
            direction: Direction::None,
            cycle,
            replica,
        }
    }
}
