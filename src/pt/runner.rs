//! Parallel tempering orchestrator.

use super::config::PtConfig;
use super::error::PtError;
use super::graph::{Exec, Graph};
use super::ladder::initial_ladder;
use super::pool::WorkerPool;
use super::types::PtProblem;

/// Per-replica statistics at the end of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicaReport {
    /// Ladder position, 0 = coldest.
    pub replica: usize,

    /// Final temperature of this rung.
    pub temperature: f64,

    /// Cost of the sample the replica held when the run ended.
    pub current_cost: f64,

    /// Best cost this replica ever produced or received.
    pub best_cost: f64,

    /// Accepted Metropolis steps over attempted steps, whole run.
    pub acceptance_rate: f64,

    /// Samples seen travelling up (labelled at the coldest rung).
    pub n_up: usize,

    /// Samples seen travelling down (labelled at the hottest rung).
    pub n_down: usize,

    /// `n_up / (n_up + n_down)`, or 0 when nothing was labelled.
    pub flow: f64,

    /// Cycles the replica completed.
    pub cycles: usize,
}

/// Exchange statistics of one adjacent pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwapReport {
    /// Pair index: replicas `pair` and `pair + 1`.
    pub pair: usize,

    /// Number of accepted exchanges.
    pub accepted: usize,

    /// Number of attempted exchanges.
    pub attempted: usize,

    /// `accepted / attempted`, or 0 before any attempt.
    pub acceptance_rate: f64,

    /// Cycles the swap node completed.
    pub cycles: usize,
}

/// Result of a parallel tempering run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PtResult<S> {
    /// The best solution found by any replica.
    pub best: S,

    /// Cost of the best solution.
    pub best_cost: f64,

    /// Cycle in which the best solution was produced (0 = construction).
    pub best_cycle: usize,

    /// Replica that produced the best solution.
    pub best_replica: usize,

    /// Cycles every node completed.
    pub cycles: usize,

    /// Ladder at the end of the run, coldest first.
    pub final_temperatures: Vec<f64>,

    /// Number of ladder adjustments the controller applied.
    pub controller_updates: usize,

    /// Per-replica statistics, coldest first.
    pub replicas: Vec<ReplicaReport>,

    /// Per-pair exchange statistics.
    pub swaps: Vec<SwapReport>,
}

/// Executes parallel tempering over a pool of worker threads.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use u_tempering::pt::{PtConfig, PtProblem, PtRunner, TempUpdate};
///
/// /// Minimize |x - 42| over the integers.
/// struct Target;
///
/// impl PtProblem for Target {
///     type Solution = i64;
///
///     fn construction<R: Rng>(&self, rng: &mut R) -> i64 {
///         rng.random_range(-1_000..1_000)
///     }
///
///     fn neighbor<R: Rng>(&self, x: &i64, rng: &mut R) -> i64 {
///         x + rng.random_range(-5..=5)
///     }
///
///     fn evaluate(&self, x: &i64) -> f64 {
///         (x - 42).abs() as f64
///     }
/// }
///
/// let config = PtConfig::default()
///     .with_temperatures(0.5, 50.0)
///     .with_replicas(4)
///     .with_steps_per_cycle(100)
///     .with_cycles(50)
///     .with_update(TempUpdate::Off)
///     .with_seed(42);
/// let result = PtRunner::new(config).unwrap().run(&Target, 2).unwrap();
/// assert!(result.best_cost <= 10.0);
/// assert_eq!(result.replicas.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct PtRunner {
    config: PtConfig,
}

impl PtRunner {
    /// Validates `config` and wraps it in a runner.
    pub fn new(config: PtConfig) -> Result<Self, PtError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PtConfig {
        &self.config
    }

    /// Runs the configured number of cycles on `threads` worker threads.
    ///
    /// Blocks until every chain and swap node completed its cycles or a
    /// node failed. All worker threads are joined before returning.
    pub fn run<P: PtProblem>(
        &self,
        problem: &P,
        threads: usize,
    ) -> Result<PtResult<P::Solution>, PtError> {
        if threads == 0 {
            return Err(PtError::InvalidConfig(
                "at least one worker thread is required".into(),
            ));
        }
        let config = &self.config;
        let ladder = initial_ladder(
            config.initial_temperature,
            config.final_temperature,
            config.replicas,
            config.distribution,
        );

        let pool = WorkerPool::new(threads);
        let graph = Graph::build(problem, config, &ladder)?;
        pool.set_expected(graph.scheduled_len());

        tracing::info!(
            replicas = config.replicas,
            threads,
            cycles = config.cycles,
            steps = config.steps_per_cycle,
            ladder = ?ladder,
            "starting parallel tempering"
        );

        let exec = Exec {
            problem,
            pool: &pool,
            target_cycles: config.cycles,
        };
        graph.start(&pool);
        pool.run(|id| graph.execute(id, &exec))?;

        let best = match pool.take_best() {
            Some(best) => best,
            None => graph
                .replica_bests()
                .into_iter()
                .min_by(|a, b| a.cost.total_cmp(&b.cost))
                .ok_or_else(|| PtError::InvalidConfig("no replicas".into()))?,
        };

        let final_temperatures = graph.temperatures();
        let controller_updates = graph.controller_updates();
        tracing::info!(
            best_cost = best.cost,
            best_cycle = best.cycle,
            best_replica = best.replica,
            last_cycle = pool.cycle_index(),
            controller_updates,
            "parallel tempering finished"
        );

        Ok(PtResult {
            best: best.solution,
            best_cost: best.cost,
            best_cycle: best.cycle,
            best_replica: best.replica,
            cycles: config.cycles,
            final_temperatures,
            controller_updates,
            replicas: graph.replica_reports(),
            swaps: graph.swap_reports(),
        })
    }
}
