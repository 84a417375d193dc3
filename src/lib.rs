//! Domain-agnostic parallel tempering engine.
//!
//! Provides a generic replica-exchange Monte Carlo optimizer:
//!
//! - **Parallel Tempering (PT)**: `R` Metropolis chains at a ladder of
//!   temperatures with adjacent-pair exchanges, scheduled on a fixed pool
//!   of worker threads by point-to-point dependencies instead of global
//!   barriers. An optional controller reshapes the ladder while the run
//!   progresses.
//!
//! # Architecture
//!
//! This crate sits at Layer 2 (Algorithms) in the U-Engine ecosystem. It
//! contains no domain-specific concepts: solutions, neighborhoods and
//! costs are all defined by consumers through [`pt::PtProblem`].

pub mod pt;
