//! Swap node: replica exchange between two adjacent chain nodes.

use super::graph::{Graph, NodeId};
use super::ladder::PairObservation;
use super::runner::SwapReport;
use super::stats::RunningMean;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;

/// Probability of exchanging the samples of two replicas.
///
/// With `x = (1/T_cold - 1/T_hot) * (E_cold - E_hot)`, an exchange is
/// always accepted when `x >= 0` and with probability `exp(x)` otherwise.
pub fn exchange_probability(t_cold: f64, t_hot: f64, e_cold: f64, e_hot: f64) -> f64 {
    let x = (1.0 / t_cold - 1.0 / t_hot) * (e_cold - e_hot);
    if x >= 0.0 {
        1.0
    } else {
        x.exp()
    }
}

struct SwapState {
    rng: StdRng,
    accepted: usize,
    attempted: usize,
    total_accepted: usize,
    total_attempted: usize,
    cold_energy: RunningMean,
    hot_energy: RunningMean,
}

pub(crate) struct SwapNode {
    pair: usize,
    left: NodeId,
    right: NodeId,
    /// Controller id and the period (in cycles) between updates.
    controller: Option<(NodeId, usize)>,
    state: Mutex<SwapState>,
}

impl SwapNode {
    /// `left` must be the colder replica of the pair.
    pub(crate) fn new(
        pair: usize,
        left: NodeId,
        right: NodeId,
        controller: Option<(NodeId, usize)>,
        rng: StdRng,
    ) -> Self {
        Self {
            pair,
            left,
            right,
            controller,
            state: Mutex::new(SwapState {
                rng,
                accepted: 0,
                attempted: 0,
                total_accepted: 0,
                total_attempted: 0,
                cold_energy: RunningMean::new(),
                hot_energy: RunningMean::new(),
            }),
        }
    }

    /// Attempts one exchange, then feeds the controller every `period`
    /// cycles.
    pub(crate) fn run<S: Clone + Send>(&self, graph: &Graph<S>, cycle: usize) {
        let left = graph.chain(self.left);
        let right = graph.chain(self.right);
        let mut state = self.state.lock();

        let accepted = {
            // Colder first: neighbouring swap nodes share one chain node.
            let mut cold = left.lock();
            let mut hot = right.lock();
            let (e_cold, e_hot) = (cold.current.cost, hot.current.cost);
            state.cold_energy.push(e_cold);
            state.hot_energy.push(e_hot);
            state.attempted += 1;

            let p = exchange_probability(left.temperature(), right.temperature(), e_cold, e_hot);
            let accept = p >= 1.0 || state.rng.random::<f64>() < p;
            if accept {
                std::mem::swap(&mut cold.current, &mut hot.current);
                left.receive(&mut cold);
                right.receive(&mut hot);
                state.accepted += 1;
            }
            accept
        };
        if accepted {
            tracing::trace!(pair = self.pair, cycle, "replicas exchanged");
        }

        let Some((controller, period)) = self.controller else {
            return;
        };
        if cycle % period != 0 {
            return;
        }
        let obs = PairObservation {
            pair: self.pair,
            acceptance: state.accepted as f64 / state.attempted.max(1) as f64,
            mean_cold: state.cold_energy.mean(),
            mean_hot: state.hot_energy.mean(),
        };
        state.total_accepted += state.accepted;
        state.total_attempted += state.attempted;
        state.accepted = 0;
        state.attempted = 0;
        state.cold_energy.clear();
        state.hot_energy.clear();
        drop(state);

        graph.controller(controller).update(graph, &obs, cycle);
    }

    pub(crate) fn report(&self, cycles: usize) -> SwapReport {
        let state = self.state.lock();
        let accepted = state.total_accepted + state.accepted;
        let attempted = state.total_attempted + state.attempted;
        SwapReport {
            pair: self.pair,
            accepted,
            attempted,
            acceptance_rate: if attempted == 0 {
                0.0
            } else {
                accepted as f64 / attempted as f64
            },
            cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pt::config::{PtConfig, TempUpdate};
    use crate::pt::types::PtProblem;

    #[test]
    fn test_exchange_probability() {
        // Hot replica holds the better sample: always exchange.
        assert_eq!(exchange_probability(1.0, 2.0, 10.0, 5.0), 1.0);
        // Equal temperatures: x = 0.
        assert_eq!(exchange_probability(1.0, 1.0, 3.0, 9.0), 1.0);
        // Equal energies: x = 0.
        assert_eq!(exchange_probability(1.0, 2.0, 4.0, 4.0), 1.0);
        // x = (1 - 0.5) * (2 - 6) = -2
        let p = exchange_probability(1.0, 2.0, 2.0, 6.0);
        assert!((p - (-2.0f64).exp()).abs() < 1e-12);
    }

    /// Solutions are fixed labels; neighbors never move.
    struct Fixed(&'static [u32]);

    impl PtProblem for Fixed {
        type Solution = u32;

        fn construction<R: Rng>(&self, _rng: &mut R) -> u32 {
            0
        }

        fn construction_for_replica<R: Rng>(&self, replica: usize, _rng: &mut R) -> u32 {
            self.0[replica]
        }

        fn neighbor<R: Rng>(&self, x: &u32, _rng: &mut R) -> u32 {
            *x
        }

        fn evaluate(&self, x: &u32) -> f64 {
            *x as f64
        }
    }

    fn fixed_graph(update: TempUpdate, period: usize) -> Graph<u32> {
        let config = PtConfig::default()
            .with_replicas(3)
            .with_update(update)
            .with_update_period(period)
            .with_seed(11);
        Graph::build(&Fixed(&[30, 10, 20]), &config, &[1.0, 1.0, 1.0]).unwrap()
    }

    fn swap_node(graph: &Graph<u32>, id: NodeId) -> &SwapNode {
        match &graph.node(id).kind {
            crate::pt::graph::NodeKind::Swap(swap) => swap,
            _ => panic!("node {id} is not a swap node"),
        }
    }

    #[test]
    fn test_exchange_frequency_converges() {
        let config = PtConfig::default()
            .with_replicas(2)
            .with_update(TempUpdate::Off)
            .with_seed(3);
        let graph = Graph::build(&Fixed(&[2, 5]), &config, &[1.0, 2.0]).unwrap();
        let swap = swap_node(&graph, 2);

        // x = (1 - 1/2) * (2 - 5) = -1.5
        let expected = exchange_probability(1.0, 2.0, 2.0, 5.0);
        assert!((expected - (-1.5f64).exp()).abs() < 1e-12);

        let trials = 50_000;
        for cycle in 1..=trials {
            swap.run(&graph, cycle);
            // Undo an accepted exchange so every trial starts from {2, 5}.
            let mut cold = graph.chain(0).lock();
            if cold.current.cost != 2.0 {
                let mut hot = graph.chain(1).lock();
                std::mem::swap(&mut cold.current, &mut hot.current);
            }
        }

        let report = swap.report(trials);
        assert_eq!(report.attempted, trials);
        let freq = report.accepted as f64 / trials as f64;
        assert!((freq - expected).abs() < 0.01, "freq {freq} vs {expected}");
        assert_eq!(freq, report.acceptance_rate);
    }

    #[test]
    fn test_accepted_swap_exchanges_samples() {
        let graph = fixed_graph(TempUpdate::Off, 1);
        let (before_left, before_right) =
            (graph.chain(0).lock().current.clone(), graph.chain(1).lock().current.clone());

        swap_node(&graph, 3).run(&graph, 1);

        let after_left = graph.chain(0).lock().current.clone();
        let after_right = graph.chain(1).lock().current.clone();
        assert_eq!(after_left.solution, before_right.solution);
        assert_eq!(after_right.solution, before_left.solution);
        assert_eq!(after_left.cost, before_right.cost);
        assert_eq!(after_right.cost, before_left.cost);
        // The coldest rung labels what it receives; interior rungs keep it.
        assert_eq!(after_left.direction, crate::pt::types::Direction::Up);
        assert_eq!(after_right.direction, crate::pt::types::Direction::None);
        // Best follows the incoming sample when it is cheaper.
        assert_eq!(graph.chain(0).best().cost, 10.0);
        assert_eq!(graph.chain(1).best().cost, 10.0);

        let report = swap_node(&graph, 3).report(1);
        assert_eq!((report.accepted, report.attempted), (1, 1));
    }

    #[test]
    fn test_controller_fires_on_period() {
        let graph = fixed_graph(TempUpdate::Multiplicative, 3);
        let swap = swap_node(&graph, 3);
        for cycle in 1..=2 {
            swap.run(&graph, cycle);
        }
        assert_eq!(graph.controller_updates(), 0);
        swap.run(&graph, 3);
        assert_eq!(graph.controller_updates(), 1);
        for cycle in 4..=6 {
            swap.run(&graph, cycle);
        }
        assert_eq!(graph.controller_updates(), 2);

        // Window counters were folded into the totals.
        let report = swap.report(6);
        assert_eq!(report.attempted, 6);
        assert_eq!(report.accepted, 6);
    }
}
