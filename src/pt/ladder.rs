//! Temperature ladder construction and adaptation arithmetic.

use super::config::{TempDistribution, TempUpdate};

/// Largest multiple of the initial span a single gap may grow to.
const MAX_SPAN_FACTOR: f64 = 4.0;

/// Builds the initial ladder, coldest first.
///
/// With a single replica the ladder is `[initial]`. The result is
/// non-decreasing and every rung is positive when both ends are.
pub fn initial_ladder(
    initial: f64,
    final_: f64,
    replicas: usize,
    distribution: TempDistribution,
) -> Vec<f64> {
    if replicas <= 1 {
        return vec![initial; replicas];
    }
    let last = (replicas - 1) as f64;
    let mut ladder: Vec<f64> = (0..replicas)
        .map(|i| {
            let frac = i as f64 / last;
            match distribution {
                TempDistribution::Linear => initial + frac * (final_ - initial),
                TempDistribution::Geometric => initial * (final_ / initial).powf(frac),
                TempDistribution::InverseLinear => {
                    let beta = 1.0 / initial + frac * (1.0 / final_ - 1.0 / initial);
                    1.0 / beta
                }
            }
        })
        .collect();
    // Pin the ends exactly; powf and reciprocals drift in the last ulp.
    ladder[0] = initial;
    ladder[replicas - 1] = final_;
    for i in 1..replicas {
        if ladder[i] < ladder[i - 1] {
            ladder[i] = ladder[i - 1];
        }
    }
    ladder
}

/// Inputs for one controller adjustment of the pair `(pair, pair + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct PairObservation {
    pub pair: usize,
    /// Swap acceptance rate over the last update window.
    pub acceptance: f64,
    /// Mean energy of the colder replica over the window.
    pub mean_cold: f64,
    /// Mean energy of the hotter replica over the window.
    pub mean_hot: f64,
}

/// Tunables for [`adjust_ladder`].
#[derive(Debug, Clone, Copy)]
pub struct AdjustParams {
    pub policy: TempUpdate,
    pub target: f64,
    pub gain: f64,
    /// Average gap of the initial ladder.
    pub mean_gap: f64,
    /// Upper bound for any single gap.
    pub max_gap: f64,
}

impl AdjustParams {
    pub fn from_initial(policy: TempUpdate, target: f64, gain: f64, ladder: &[f64]) -> Self {
        let span = match (ladder.first(), ladder.last()) {
            (Some(&lo), Some(&hi)) => hi - lo,
            _ => 0.0,
        };
        let gaps = ladder.len().saturating_sub(1).max(1) as f64;
        Self {
            policy,
            target,
            gain,
            mean_gap: span / gaps,
            max_gap: span * MAX_SPAN_FACTOR,
        }
    }
}

/// Computes the new gap for one pair.
///
/// Returns a finite value in `[0, max_gap]`; when the policy produces
/// something unusable the current gap is kept.
pub fn next_gap(gap: f64, cold: f64, obs: &PairObservation, params: &AdjustParams) -> f64 {
    let error = obs.acceptance - params.target;
    let proposed = match params.policy {
        TempUpdate::Off => gap,
        TempUpdate::Additive => gap + params.gain * error * params.mean_gap,
        TempUpdate::Multiplicative => gap * (1.0 + params.gain * error).clamp(0.5, 2.0),
        TempUpdate::EnergyMatched => {
            let d_energy = (obs.mean_hot - obs.mean_cold).abs();
            if d_energy <= f64::EPSILON {
                gap
            } else {
                // Acceptance ~ exp(-d_beta * d_energy); solve for d_beta.
                let d_beta = -params.target.ln() / d_energy;
                let beta_hot = 1.0 / cold - d_beta;
                let desired = if beta_hot > 0.0 {
                    1.0 / beta_hot - cold
                } else {
                    params.max_gap
                };
                gap + params.gain * (desired - gap)
            }
        }
    };
    if proposed.is_finite() {
        proposed.clamp(0.0, params.max_gap)
    } else {
        gap
    }
}

/// Resizes the gap of `obs.pair` and shifts every hotter rung by the
/// same amount. The coldest rung never moves.
///
/// Returns `false` (leaving `ladder` untouched) when the pair is out of
/// range.
pub fn adjust_ladder(ladder: &mut [f64], obs: &PairObservation, params: &AdjustParams) -> bool {
    if obs.pair + 1 >= ladder.len() {
        return false;
    }
    let cold = ladder[obs.pair];
    let gap = ladder[obs.pair + 1] - cold;
    let shift = next_gap(gap, cold, obs, params) - gap;
    for t in &mut ladder[obs.pair + 1..] {
        *t += shift;
    }
    for i in obs.pair + 1..ladder.len() {
        if ladder[i] < ladder[i - 1] {
            ladder[i] = ladder[i - 1];
        }
    }
    true
}
