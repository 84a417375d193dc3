//! Temperature controller node.

use super::graph::{Graph, NodeId};
use super::ladder::{adjust_ladder, AdjustParams, PairObservation};
use parking_lot::Mutex;

struct ControllerState {
    /// Cycle of the last update, per pair.
    last_fired: Vec<Option<usize>>,
    updates: usize,
}

/// Reshapes the ladder of the chain nodes it governs.
///
/// Driven inline by swap nodes; updates from different pairs are
/// serialized on the controller's lock.
pub(crate) struct ControllerNode {
    governed: Vec<NodeId>,
    params: AdjustParams,
    period: usize,
    state: Mutex<ControllerState>,
}

impl ControllerNode {
    /// `governed` lists chain node ids coldest first.
    pub(crate) fn new(governed: Vec<NodeId>, params: AdjustParams, period: usize) -> Self {
        let pairs = governed.len().saturating_sub(1);
        Self {
            governed,
            params,
            period,
            state: Mutex::new(ControllerState {
                last_fired: vec![None; pairs],
                updates: 0,
            }),
        }
    }

    /// Applies one observation. Returns `false` when the pair is unknown
    /// or was already updated less than `period` cycles ago.
    pub(crate) fn update<S: Clone + Send>(
        &self,
        graph: &Graph<S>,
        obs: &PairObservation,
        cycle: usize,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(last) = state.last_fired.get_mut(obs.pair) else {
            return false;
        };
        if last.is_some_and(|at| cycle < at + self.period) {
            return false;
        }
        *last = Some(cycle);

        let mut ladder: Vec<f64> = self
            .governed
            .iter()
            .map(|&id| graph.chain(id).temperature())
            .collect();
        if !adjust_ladder(&mut ladder, obs, &self.params) {
            return false;
        }
        for (&id, &t) in self.governed.iter().zip(&ladder) {
            graph.chain(id).set_temperature(t);
        }
        state.updates += 1;
        tracing::debug!(
            pair = obs.pair,
            cycle,
            acceptance = obs.acceptance,
            ladder = ?ladder,
            "temperature ladder adjusted"
        );
        true
    }

    pub(crate) fn updates(&self) -> usize {
        self.state.lock().updates
    }
}
