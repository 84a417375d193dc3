//! Markov-chain node: one replica's fixed-temperature Monte Carlo chain.

use super::error::PtError;
use super::graph::Exec;
use super::runner::ReplicaReport;
use super::types::{Direction, PtProblem, Sample};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Probability of accepting a move that changes the cost by `delta`.
///
/// `1` for non-worsening moves, `exp(-delta / temperature)` otherwise
/// (Metropolis criterion).
pub fn metropolis_probability(delta: f64, temperature: f64) -> f64 {
    if delta <= 0.0 {
        1.0
    } else {
        (-delta / temperature).exp()
    }
}

/// Position of a replica on the ladder; the two ends label samples for
/// round-trip accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rung {
    Coldest,
    Interior,
    Hottest,
}

pub(crate) struct ChainState<S> {
    pub(crate) current: Sample<S>,
    pub(crate) best: Sample<S>,
    rng: StdRng,
    accepted: usize,
    attempted: usize,
    total_accepted: usize,
    total_attempted: usize,
}

pub(crate) struct ChainNode<S> {
    replica: usize,
    steps: usize,
    rung: Rung,
    /// `f64` bits; written by the controller, read by this node and its
    /// swap nodes.
    temperature: AtomicU64,
    n_up: AtomicUsize,
    n_down: AtomicUsize,
    state: Mutex<ChainState<S>>,
}

impl<S: Clone + Send> ChainNode<S> {
    pub(crate) fn new<P>(
        problem: &P,
        replica: usize,
        temperature: f64,
        steps: usize,
        rung: Rung,
        mut rng: StdRng,
    ) -> Result<Self, PtError>
    where
        P: PtProblem<Solution = S>,
    {
        let solution = problem.construction_for_replica(replica, &mut rng);
        let cost = problem.evaluate(&solution);
        if !cost.is_finite() {
            return Err(PtError::NonFiniteCost {
                replica,
                cycle: 0,
                cost,
            });
        }
        let current = Sample::new(solution, cost, 0, replica);
        Ok(Self {
            replica,
            steps,
            rung,
            temperature: AtomicU64::new(temperature.to_bits()),
            n_up: AtomicUsize::new(0),
            n_down: AtomicUsize::new(0),
            state: Mutex::new(ChainState {
                best: current.clone(),
                current,
                rng,
                accepted: 0,
                attempted: 0,
                total_accepted: 0,
                total_attempted: 0,
            }),
        })
    }

    /// Performs `steps` Metropolis steps at the current temperature.
    pub(crate) fn run<P>(&self, cycle: usize, exec: &Exec<'_, P>) -> Result<(), PtError>
    where
        P: PtProblem<Solution = S>,
    {
        exec.pool.advance_cycle(cycle);
        let temperature = self.temperature();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for _ in 0..self.steps {
            let neighbor = exec.problem.neighbor(&state.current.solution, &mut state.rng);
            let cost = exec.problem.evaluate(&neighbor);
            if !cost.is_finite() {
                return Err(PtError::NonFiniteCost {
                    replica: self.replica,
                    cycle,
                    cost,
                });
            }
            state.attempted += 1;

            let p = metropolis_probability(cost - state.current.cost, temperature);
            let accept = p >= 1.0 || state.rng.random::<f64>() < p;
            let improves_best = cost < state.best.cost;
            let sample = Sample {
                solution: neighbor,
                cost,
                direction: state.current.direction,
                cycle,
                replica: self.replica,
            };

            match (accept, improves_best) {
                (true, true) => {
                    state.best = sample.clone();
                    state.current = sample;
                }
                (true, false) => state.current = sample,
                (false, true) => state.best = sample,
                (false, false) => {}
            }
            if accept {
                state.accepted += 1;
            }
        }
        Ok(())
    }

    /// Finishes an exchange on this side: the swap node has already
    /// moved the incoming sample into `state.current`.
    pub(crate) fn receive(&self, state: &mut ChainState<S>) {
        if state.current.cost < state.best.cost {
            state.best = state.current.clone();
        }
        self.label(state);
        self.update_flow(state);
    }

    fn label(&self, state: &mut ChainState<S>) {
        match self.rung {
            Rung::Coldest => state.current.direction = Direction::Up,
            Rung::Hottest => state.current.direction = Direction::Down,
            Rung::Interior => {}
        }
    }

    fn update_flow(&self, state: &ChainState<S>) {
        match state.current.direction {
            Direction::Up => {
                self.n_up.fetch_add(1, Ordering::Relaxed);
            }
            Direction::Down => {
                self.n_down.fetch_add(1, Ordering::Relaxed);
            }
            Direction::None => {}
        }
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, ChainState<S>> {
        self.state.lock()
    }

    pub(crate) fn temperature(&self) -> f64 {
        f64::from_bits(self.temperature.load(Ordering::Acquire))
    }

    pub(crate) fn set_temperature(&self, temperature: f64) {
        self.temperature
            .store(temperature.to_bits(), Ordering::Release);
    }

    pub(crate) fn best(&self) -> Sample<S> {
        self.state.lock().best.clone()
    }

    /// Acceptance rate since the previous call; reading resets the window.
    pub(crate) fn take_acceptance_rate(&self) -> f64 {
        let mut state = self.state.lock();
        let rate = if state.attempted == 0 {
            0.0
        } else {
            state.accepted as f64 / state.attempted as f64
        };
        state.total_accepted += state.accepted;
        state.total_attempted += state.attempted;
        state.accepted = 0;
        state.attempted = 0;
        rate
    }

    pub(crate) fn flow_counts(&self) -> (usize, usize) {
        (
            self.n_up.load(Ordering::Relaxed),
            self.n_down.load(Ordering::Relaxed),
        )
    }

    /// Fraction of labelled samples that passed through travelling up.
    pub(crate) fn flow(&self) -> f64 {
        let (up, down) = self.flow_counts();
        if up + down == 0 {
            0.0
        } else {
            up as f64 / (up + down) as f64
        }
    }

    pub(crate) fn report(&self, cycles: usize) -> ReplicaReport {
        self.take_acceptance_rate();
        let (n_up, n_down) = self.flow_counts();
        let state = self.state.lock();
        let acceptance_rate = if state.total_attempted == 0 {
            0.0
        } else {
            state.total_accepted as f64 / state.total_attempted as f64
        };
        ReplicaReport {
            replica: self.replica,
            temperature: self.temperature(),
            current_cost: state.current.cost,
            best_cost: state.best.cost,
            acceptance_rate,
            n_up,
            n_down,
            flow: self.flow(),
            cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pt::pool::WorkerPool;
    use rand::SeedableRng;

    /// Walks on the integers with cost |x|.
    struct Walk;

    impl PtProblem for Walk {
        type Solution = i64;

        fn construction<R: Rng>(&self, _rng: &mut R) -> i64 {
            50
        }

        fn construction_for_replica<R: Rng>(&self, replica: usize, rng: &mut R) -> i64 {
            if replica == 3 {
                0
            } else {
                self.construction(rng)
            }
        }

        fn neighbor<R: Rng>(&self, x: &i64, rng: &mut R) -> i64 {
            if rng.random_bool(0.5) {
                x + 1
            } else {
                x - 1
            }
        }

        fn evaluate(&self, x: &i64) -> f64 {
            x.unsigned_abs() as f64
        }
    }

    struct NanAt(i64);

    impl PtProblem for NanAt {
        type Solution = i64;

        fn construction<R: Rng>(&self, _rng: &mut R) -> i64 {
            0
        }

        fn neighbor<R: Rng>(&self, x: &i64, _rng: &mut R) -> i64 {
            x + 1
        }

        fn evaluate(&self, x: &i64) -> f64 {
            if *x == self.0 {
                f64::NAN
            } else {
                *x as f64
            }
        }
    }

    fn node<P: PtProblem<Solution = i64>>(problem: &P, replica: usize, rung: Rung) -> ChainNode<i64> {
        ChainNode::new(problem, replica, 1.0, 25, rung, StdRng::seed_from_u64(9)).unwrap()
    }

    #[test]
    fn test_metropolis_probability() {
        assert_eq!(metropolis_probability(-3.0, 0.5), 1.0);
        assert_eq!(metropolis_probability(0.0, 0.5), 1.0);
        assert!((metropolis_probability(1.0, 1.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!((metropolis_probability(2.0, 4.0) - (-0.5f64).exp()).abs() < 1e-12);
        assert!(metropolis_probability(1e6, 0.01) < 1e-300);
    }

    /// Every neighbor costs exactly one more than the current solution.
    struct Uphill;

    impl PtProblem for Uphill {
        type Solution = i64;

        fn construction<R: Rng>(&self, _rng: &mut R) -> i64 {
            0
        }

        fn neighbor<R: Rng>(&self, x: &i64, _rng: &mut R) -> i64 {
            x + 1
        }

        fn evaluate(&self, x: &i64) -> f64 {
            *x as f64
        }
    }

    #[test]
    fn test_metropolis_frequency_converges() {
        let temperature = 2.0;
        let chain = ChainNode::new(
            &Uphill,
            0,
            temperature,
            1_000,
            Rung::Coldest,
            StdRng::seed_from_u64(42),
        )
        .unwrap();
        let pool = WorkerPool::new(1);
        let exec = Exec {
            problem: &Uphill,
            pool: &pool,
            target_cycles: 100,
        };
        for cycle in 1..=100 {
            chain.run(cycle, &exec).unwrap();
        }

        let freq = chain.take_acceptance_rate();
        let expected = metropolis_probability(1.0, temperature);
        assert!((expected - (-0.5f64).exp()).abs() < 1e-12);
        assert!((freq - expected).abs() < 0.01, "freq {freq} vs {expected}");
        // Rejected moves never touch the current sample.
        let current = chain.lock().current.cost;
        assert!((current / 100_000.0 - freq).abs() < 1e-12);
    }

    #[test]
    fn test_construction_per_replica() {
        assert_eq!(node(&Walk, 0, Rung::Coldest).best().solution, 50);
        let seeded = node(&Walk, 3, Rung::Interior);
        assert_eq!(seeded.best().solution, 0);
        assert_eq!(seeded.best().cost, 0.0);
        assert_eq!(seeded.best().cycle, 0);
    }

    #[test]
    fn test_non_finite_construction_rejected() {
        let result = ChainNode::new(&NanAt(0), 2, 1.0, 5, Rung::Interior, StdRng::seed_from_u64(1));
        assert!(matches!(
            result,
            Err(PtError::NonFiniteCost {
                replica: 2,
                cycle: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_step_is_fatal() {
        let chain = node(&NanAt(1), 0, Rung::Coldest);
        let pool = WorkerPool::new(1);
        let exec = Exec {
            problem: &NanAt(1),
            pool: &pool,
            target_cycles: 10,
        };
        let err = chain.run(1, &exec).unwrap_err();
        assert!(matches!(err, PtError::NonFiniteCost { cycle: 1, .. }));
    }

    #[test]
    fn test_best_is_monotone() {
        let chain = node(&Walk, 0, Rung::Coldest);
        let pool = WorkerPool::new(1);
        let exec = Exec {
            problem: &Walk,
            pool: &pool,
            target_cycles: 100,
        };
        let mut last = chain.best().cost;
        for cycle in 1..=40 {
            chain.run(cycle, &exec).unwrap();
            let best = chain.best();
            assert!(best.cost <= last);
            assert!(best.cost <= chain.lock().current.cost);
            last = best.cost;
        }
        assert!(last < 50.0);
        assert_eq!(pool.cycle_index(), 40);
    }

    #[test]
    fn test_acceptance_rate_window() {
        let chain = node(&Walk, 0, Rung::Coldest);
        let pool = WorkerPool::new(1);
        let exec = Exec {
            problem: &Walk,
            pool: &pool,
            target_cycles: 10,
        };
        chain.run(1, &exec).unwrap();
        let rate = chain.take_acceptance_rate();
        assert!(rate > 0.0 && rate <= 1.0);
        assert_eq!(chain.take_acceptance_rate(), 0.0);
    }

    #[test]
    fn test_labels_and_flow() {
        let cold = node(&Walk, 0, Rung::Coldest);
        let hot = node(&Walk, 2, Rung::Hottest);
        let mid = node(&Walk, 1, Rung::Interior);

        cold.receive(&mut cold.lock());
        hot.receive(&mut hot.lock());
        assert_eq!(cold.lock().current.direction, Direction::Up);
        assert_eq!(hot.lock().current.direction, Direction::Down);
        assert_eq!(cold.flow_counts(), (1, 0));
        assert_eq!(hot.flow_counts(), (0, 1));
        assert_eq!(cold.flow(), 1.0);

        // An interior rung keeps the label and counts it.
        mid.lock().current.direction = Direction::Down;
        mid.receive(&mut mid.lock());
        assert_eq!(mid.lock().current.direction, Direction::Down);
        assert_eq!(mid.flow_counts(), (0, 1));
        assert_eq!(mid.flow(), 0.0);
    }

    #[test]
    fn test_temperature_roundtrip() {
        let chain = node(&Walk, 0, Rung::Coldest);
        assert_eq!(chain.temperature(), 1.0);
        chain.set_temperature(3.25);
        assert_eq!(chain.temperature(), 3.25);
    }
}
