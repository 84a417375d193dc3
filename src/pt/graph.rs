//! Dependency graph of execution nodes and the notify/observer protocol.
//!
//! The replica chain is built once per run:
//!
//! ```text
//!   chain 0 ── swap 0 ── chain 1 ── swap 1 ── chain 2 ...
//! ```
//!
//! Every swap node depends on the two chain nodes it bridges (current
//! cycle), and every chain node depends on the swap nodes next to it
//! (previous cycle). Instead of a global barrier, each node keeps one
//! satisfied-flag per predecessor edge. A finishing node resets its own
//! flags and then notifies its successors; the notification that
//! completes a successor's flag set enqueues that successor. Independent
//! pairs therefore never wait on each other.
//!
//! Nodes live in one arena and refer to each other by [`NodeId`].

use super::chain::{ChainNode, Rung};
use super::config::PtConfig;
use super::controller::ControllerNode;
use super::error::PtError;
use super::ladder::AdjustParams;
use super::pool::WorkerPool;
use super::runner::{ReplicaReport, SwapReport};
use super::swap::SwapNode;
use super::types::{PtProblem, Sample};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Index of a node in the graph arena.
pub(crate) type NodeId = usize;

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: NodeId,
    satisfied: bool,
}

/// Protocol state shared by every node kind.
#[derive(Debug)]
pub(crate) struct NodeCore {
    id: NodeId,
    predecessors: Mutex<Vec<Edge>>,
    successors: Vec<NodeId>,
    completed: AtomicUsize,
    finished: AtomicBool,
    queued: AtomicBool,
}

impl NodeCore {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            predecessors: Mutex::new(Vec::new()),
            successors: Vec::new(),
            completed: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            queued: AtomicBool::new(false),
        }
    }

    fn add_predecessor(&mut self, from: NodeId, satisfied: bool) {
        self.predecessors.get_mut().push(Edge { from, satisfied });
    }

    /// True iff every predecessor edge is satisfied.
    pub(crate) fn ready(&self) -> bool {
        self.predecessors.lock().iter().all(|e| e.satisfied)
    }

    /// Marks the edge from `from` satisfied and reports whether the node
    /// is now ready.
    ///
    /// # Panics
    ///
    /// If `from` is not a predecessor, or if its edge was already
    /// satisfied in this cycle. Either means the graph is miswired.
    fn satisfy(&self, from: NodeId) -> bool {
        let mut preds = self.predecessors.lock();
        let Some(edge) = preds.iter_mut().find(|e| e.from == from) else {
            panic!("node {} notified by {from}, which is not a predecessor", self.id);
        };
        assert!(
            !edge.satisfied,
            "edge {from} -> {} satisfied twice in one cycle",
            self.id
        );
        edge.satisfied = true;
        preds.iter().all(|e| e.satisfied)
    }

    fn reset(&self) {
        for edge in self.predecessors.lock().iter_mut() {
            edge.satisfied = false;
        }
    }

    fn is_source(&self) -> bool {
        self.predecessors.lock().is_empty()
    }

    fn mark_queued(&self) {
        let was_queued = self.queued.swap(true, Ordering::AcqRel);
        assert!(!was_queued, "node {} enqueued twice", self.id);
    }

    fn begin(&self) {
        let was_queued = self.queued.swap(false, Ordering::AcqRel);
        assert!(was_queued, "node {} executed without being enqueued", self.id);
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

pub(crate) enum NodeKind<S> {
    Chain(ChainNode<S>),
    Swap(SwapNode),
    Controller(ControllerNode),
}

pub(crate) struct Node<S> {
    pub(crate) core: NodeCore,
    pub(crate) kind: NodeKind<S>,
}

/// Everything a node needs from the run while executing.
pub(crate) struct Exec<'a, P: PtProblem> {
    pub(crate) problem: &'a P,
    pub(crate) pool: &'a WorkerPool<P::Solution>,
    pub(crate) target_cycles: usize,
}

/// Orchestrator-owned node arena.
pub(crate) struct Graph<S> {
    nodes: Vec<Node<S>>,
    chains: Vec<NodeId>,
    swaps: Vec<NodeId>,
    controller: Option<NodeId>,
}

impl<S: Clone + Send> Graph<S> {
    /// Builds `R` chain nodes, `R - 1` swap nodes, and (when the update
    /// policy is active) one controller shared by all swap nodes.
    ///
    /// Chain nodes start with their edges satisfied so the first cycle
    /// can begin without a preceding swap.
    pub(crate) fn build<P>(problem: &P, config: &PtConfig, ladder: &[f64]) -> Result<Self, PtError>
    where
        P: PtProblem<Solution = S>,
    {
        let replicas = ladder.len();
        let base_seed = config.seed.unwrap_or_else(rand::random);
        let node_rng = |id: NodeId| StdRng::seed_from_u64(base_seed.wrapping_add(id as u64));

        let chains: Vec<NodeId> = (0..replicas).collect();
        let swaps: Vec<NodeId> = (replicas..2 * replicas - 1).collect();
        let controller = (config.update.is_active() && replicas > 1).then_some(2 * replicas - 1);

        let mut nodes = Vec::with_capacity(2 * replicas);
        for (replica, &temperature) in ladder.iter().enumerate() {
            let rung = if replica == 0 {
                Rung::Coldest
            } else if replica + 1 == replicas {
                Rung::Hottest
            } else {
                Rung::Interior
            };
            let mut core = NodeCore::new(chains[replica]);
            if replica > 0 {
                core.add_predecessor(swaps[replica - 1], true);
                core.successors.push(swaps[replica - 1]);
            }
            if replica + 1 < replicas {
                core.add_predecessor(swaps[replica], true);
                core.successors.push(swaps[replica]);
            }
            let chain = ChainNode::new(
                problem,
                replica,
                temperature,
                config.steps_per_cycle,
                rung,
                node_rng(chains[replica]),
            )?;
            nodes.push(Node {
                core,
                kind: NodeKind::Chain(chain),
            });
        }

        for (pair, &id) in swaps.iter().enumerate() {
            let (left, right) = (chains[pair], chains[pair + 1]);
            let mut core = NodeCore::new(id);
            core.add_predecessor(left, false);
            core.add_predecessor(right, false);
            core.successors.extend([left, right]);
            let swap = SwapNode::new(
                pair,
                left,
                right,
                controller.map(|c| (c, config.update_period)),
                node_rng(id),
            );
            nodes.push(Node {
                core,
                kind: NodeKind::Swap(swap),
            });
        }

        if let Some(id) = controller {
            let params = AdjustParams::from_initial(
                config.update,
                config.target_acceptance,
                config.update_gain,
                ladder,
            );
            nodes.push(Node {
                core: NodeCore::new(id),
                kind: NodeKind::Controller(ControllerNode::new(
                    chains.clone(),
                    params,
                    config.update_period,
                )),
            });
        }

        Ok(Self {
            nodes,
            chains,
            swaps,
            controller,
        })
    }

    /// Number of nodes the pool schedules (chain + swap nodes).
    pub(crate) fn scheduled_len(&self) -> usize {
        self.chains.len() + self.swaps.len()
    }

    #[cfg(test)]
    pub(crate) fn node(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id]
    }

    pub(crate) fn chain(&self, id: NodeId) -> &ChainNode<S> {
        match &self.nodes[id].kind {
            NodeKind::Chain(chain) => chain,
            _ => panic!("node {id} is not a chain node"),
        }
    }

    pub(crate) fn controller(&self, id: NodeId) -> &ControllerNode {
        match &self.nodes[id].kind {
            NodeKind::Controller(controller) => controller,
            _ => panic!("node {id} is not a controller node"),
        }
    }

    /// Seeds every scheduled node whose predecessors are satisfied.
    pub(crate) fn start(&self, pool: &WorkerPool<S>) {
        for &id in self.chains.iter().chain(&self.swaps) {
            if self.nodes[id].core.ready() {
                self.submit(id, pool);
            }
        }
    }

    fn submit(&self, id: NodeId, pool: &WorkerPool<S>) {
        self.nodes[id].core.mark_queued();
        pool.submit(id);
    }

    /// Called by predecessor `from` once it completed its cycle.
    pub(crate) fn observer(&self, to: NodeId, from: NodeId, pool: &WorkerPool<S>) {
        let core = &self.nodes[to].core;
        if core.satisfy(from) && !core.is_finished() {
            self.submit(to, pool);
        }
    }

    /// Informs every successor of `id` that it completed a cycle.
    pub(crate) fn notify(&self, id: NodeId, pool: &WorkerPool<S>) {
        for &to in &self.nodes[id].core.successors {
            self.observer(to, id, pool);
        }
    }

    /// Runs one cycle of node `id` on the calling worker.
    pub(crate) fn execute<P>(&self, id: NodeId, exec: &Exec<'_, P>) -> Result<(), PtError>
    where
        P: PtProblem<Solution = S>,
    {
        let node = &self.nodes[id];
        node.core.begin();
        let cycle = node.core.completed() + 1;

        match &node.kind {
            NodeKind::Chain(chain) => chain.run(cycle, exec)?,
            NodeKind::Swap(swap) => swap.run(self, cycle),
            NodeKind::Controller(_) => {
                panic!("controller node {id} is driven by swap nodes and never scheduled")
            }
        }
        node.core.completed.store(cycle, Ordering::Release);

        let run_complete = if cycle >= exec.target_cycles {
            node.core.finished.store(true, Ordering::Release);
            let best = match &node.kind {
                NodeKind::Chain(chain) => Some(chain.best()),
                _ => None,
            };
            tracing::debug!(node = id, cycle, "node finished");
            exec.pool.report(best)
        } else {
            false
        };

        node.core.reset();
        self.notify(id, exec.pool);

        // A lone replica has nobody to wake it up.
        if node.core.is_source() && !run_complete && !node.core.is_finished() {
            self.submit(id, exec.pool);
        }
        Ok(())
    }

    pub(crate) fn temperatures(&self) -> Vec<f64> {
        self.chains
            .iter()
            .map(|&id| self.chain(id).temperature())
            .collect()
    }

    pub(crate) fn controller_updates(&self) -> usize {
        self.controller
            .map_or(0, |id| self.controller(id).updates())
    }

    pub(crate) fn replica_reports(&self) -> Vec<ReplicaReport> {
        self.chains
            .iter()
            .map(|&id| self.chain(id).report(self.nodes[id].core.completed()))
            .collect()
    }

    pub(crate) fn swap_reports(&self) -> Vec<SwapReport> {
        self.swaps
            .iter()
            .map(|&id| match &self.nodes[id].kind {
                NodeKind::Swap(swap) => swap.report(self.nodes[id].core.completed()),
                _ => panic!("node {id} is not a swap node"),
            })
            .collect()
    }

    /// Best sample held by each replica, coldest first.
    pub(crate) fn replica_bests(&self) -> Vec<Sample<S>> {
        self.chains.iter().map(|&id| self.chain(id).best()).collect()
    }
}
