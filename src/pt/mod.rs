//! Parallel Tempering (replica-exchange Monte Carlo).
//!
//! Runs `R` Metropolis chains over the same problem, each at its own
//! temperature, and periodically offers adjacent replicas the chance to
//! exchange their current samples. Cold replicas refine, hot replicas
//! explore, and exchanges let good configurations migrate towards the
//! cold end.
//!
//! Scheduling is dataflow-driven rather than barrier-driven: each chain
//! node and each swap node runs as soon as its own neighbours finished
//! the cycle it depends on, on a fixed pool of worker threads. See the
//! `graph` module for the protocol.
//!
//! # Key Types
//!
//! - [`PtProblem`]: Problem definition (construction, neighbor, evaluate)
//! - [`PtConfig`]: Ladder, cycle budget, and adaptation parameters
//! - [`PtRunner`]: Builds the replica chain and drives the worker pool
//! - [`PtResult`]: Best sample plus per-replica and per-pair statistics
//!
//! # Submodules
//!
//! - [`ladder`]: Initial temperature spacing and controller adjustment rules
//!
//! # References
//!
//! - Swendsen & Wang (1986), "Replica Monte Carlo Simulation of Spin-Glasses"
//! - Geyer (1991), "Markov Chain Monte Carlo Maximum Likelihood"
//! - Hukushima & Nemoto (1996), "Exchange Monte Carlo Method and Application
//!   to Spin Glass Simulations"
//! - Katzgraber et al. (2006), "Feedback-optimized parallel tempering Monte
//!   Carlo"

mod chain;
mod config;
mod controller;
mod error;
mod graph;
pub mod ladder;
mod pool;
mod queue;
mod runner;
mod stats;
mod swap;
mod types;

pub use chain::metropolis_probability;
pub use config::{PtConfig, TempDistribution, TempUpdate};
pub use error::PtError;
pub use runner::{PtResult, PtRunner, ReplicaReport, SwapReport};
pub use stats::RunningMean;
pub use swap::exchange_probability;
pub use types::{Direction, PtProblem, Sample};
