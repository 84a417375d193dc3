//! PT configuration, ladder spacing, and temperature update policies.

use super::error::PtError;

/// Spacing of the initial temperature ladder over `[T_init, T_final]`.
///
/// Replica `0` always gets `T_init` (the coldest rung) and replica
/// `R - 1` gets `T_final`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TempDistribution {
    /// Evenly spaced temperatures: `T_i = T_0 + i * (T_f - T_0) / (R - 1)`.
    Linear,

    /// Constant ratio between neighbours: `T_i = T_0 * (T_f / T_0)^(i / (R - 1))`.
    ///
    /// The usual choice when the heat capacity is roughly constant.
    Geometric,

    /// Evenly spaced inverse temperatures (`beta`), which crowds rungs
    /// near the cold end.
    InverseLinear,
}

impl Default for TempDistribution {
    fn default() -> Self {
        TempDistribution::Geometric
    }
}

impl TempDistribution {
    /// Maps the integer codes used by command-line front ends.
    ///
    /// `1` = linear, `2` = geometric, `3` = inverse-linear.
    pub fn from_code(code: i32) -> Result<Self, PtError> {
        match code {
            1 => Ok(TempDistribution::Linear),
            2 => Ok(TempDistribution::Geometric),
            3 => Ok(TempDistribution::InverseLinear),
            _ => Err(PtError::InvalidConfig(format!(
                "unknown temperature distribution code {code}"
            ))),
        }
    }
}

/// Strategy used by the temperature controller to reshape the ladder.
///
/// Each update looks at one adjacent pair and resizes its temperature
/// gap, shifting every hotter rung by the same amount so that the other
/// gaps are kept.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TempUpdate {
    /// Fixed ladder; no controller is attached.
    Off,

    /// `gap += gain * (rate - target) * mean_gap`, where `mean_gap` is
    /// the initial average spacing.
    Additive,

    /// `gap *= 1 + gain * (rate - target)`, the factor clamped to `[0.5, 2]`.
    Multiplicative,

    /// Moves the pair towards the gap at which
    /// `exp(-|d_beta * d_energy|)` equals the target rate, using the
    /// mean energies observed since the last update.
    EnergyMatched,
}

impl Default for TempUpdate {
    fn default() -> Self {
        TempUpdate::Multiplicative
    }
}

impl TempUpdate {
    /// Maps the integer codes used by command-line front ends.
    ///
    /// `0` = off, `1` = additive, `2` = multiplicative, `3` = energy-matched.
    pub fn from_code(code: i32) -> Result<Self, PtError> {
        match code {
            0 => Ok(TempUpdate::Off),
            1 => Ok(TempUpdate::Additive),
            2 => Ok(TempUpdate::Multiplicative),
            3 => Ok(TempUpdate::EnergyMatched),
            _ => Err(PtError::InvalidConfig(format!(
                "unknown temperature update code {code}"
            ))),
        }
    }

    /// Whether this policy needs a controller node.
    pub fn is_active(self) -> bool {
        !matches!(self, TempUpdate::Off)
    }
}

/// Configuration for Parallel Tempering.
///
/// # Examples
///
/// ```
/// use u_tempering::pt::{PtConfig, TempDistribution, TempUpdate};
///
/// let config = PtConfig::default()
///     .with_temperatures(0.05, 10.0)
///     .with_replicas(8)
///     .with_steps_per_cycle(200)
///     .with_cycles(1_000)
///     .with_distribution(TempDistribution::Geometric)
///     .with_update(TempUpdate::Multiplicative)
///     .with_update_divisor(4);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.update_period, 50);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PtConfig {
    /// Temperature of the coldest replica.
    pub initial_temperature: f64,

    /// Temperature of the hottest replica. Must be `>= initial_temperature`.
    pub final_temperature: f64,

    /// Number of replicas (Markov chains).
    pub replicas: usize,

    /// Monte Carlo steps each replica performs per cycle.
    pub steps_per_cycle: usize,

    /// Number of cycles every node runs before the run ends.
    pub cycles: usize,

    /// Spacing of the initial ladder.
    pub distribution: TempDistribution,

    /// Ladder adaptation policy.
    pub update: TempUpdate,

    /// Swap-node cycles between two controller updates of the same pair.
    pub update_period: usize,

    /// Swap acceptance rate the controller steers towards, in `(0, 1)`.
    pub target_acceptance: f64,

    /// Strength of each controller adjustment, in `(0, 1]`.
    pub update_gain: f64,

    /// Random seed for reproducibility.
    ///
    /// Every node derives its own stream from this seed. `None` uses a
    /// random seed.
    pub seed: Option<u64>,
}

impl Default for PtConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 0.01,
            final_temperature: 20.0,
            replicas: 4,
            steps_per_cycle: 500,
            cycles: 2_500,
            distribution: TempDistribution::default(),
            update: TempUpdate::default(),
            update_period: 125,
            target_acceptance: 0.23,
            update_gain: 0.5,
            seed: None,
        }
    }
}

impl PtConfig {
    pub fn with_temperatures(mut self, initial: f64, final_: f64) -> Self {
        self.initial_temperature = initial;
        self.final_temperature = final_;
        self
    }

    pub fn with_replicas(mut self, n: usize) -> Self {
        self.replicas = n;
        self
    }

    pub fn with_steps_per_cycle(mut self, n: usize) -> Self {
        self.steps_per_cycle = n;
        self
    }

    pub fn with_cycles(mut self, n: usize) -> Self {
        self.cycles = n;
        self
    }

    pub fn with_distribution(mut self, distribution: TempDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_update(mut self, update: TempUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_update_period(mut self, period: usize) -> Self {
        self.update_period = period;
        self
    }

    /// Derives the update period as `steps_per_cycle / divisor`.
    ///
    /// A divisor of 0 uses `steps_per_cycle` unchanged. Call this after
    /// [`with_steps_per_cycle`](Self::with_steps_per_cycle).
    pub fn with_update_divisor(mut self, divisor: usize) -> Self {
        self.update_period = if divisor > 0 {
            (self.steps_per_cycle / divisor).max(1)
        } else {
            self.steps_per_cycle
        };
        self
    }

    pub fn with_target_acceptance(mut self, rate: f64) -> Self {
        self.target_acceptance = rate;
        self
    }

    pub fn with_update_gain(mut self, gain: f64) -> Self {
        self.update_gain = gain;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Preset for short runs: few replicas, short chains, fixed ladder.
    pub fn fast() -> Self {
        Self {
            replicas: 4,
            steps_per_cycle: 100,
            cycles: 200,
            update: TempUpdate::Off,
            ..Self::default()
        }
    }

    /// Preset sized to the machine: one replica per available core minus one.
    pub fn for_available_cores() -> Self {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(2);
        Self {
            replicas: cores.saturating_sub(1).max(2),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), PtError> {
        let invalid = |msg: String| Err(PtError::InvalidConfig(msg));

        if self.replicas == 0 {
            return invalid("replicas must be at least 1".into());
        }
        if !(self.initial_temperature.is_finite() && self.initial_temperature > 0.0) {
            return invalid(format!(
                "initial_temperature must be positive and finite, got {}",
                self.initial_temperature
            ));
        }
        if !(self.final_temperature.is_finite() && self.final_temperature > 0.0) {
            return invalid(format!(
                "final_temperature must be positive and finite, got {}",
                self.final_temperature
            ));
        }
        if self.final_temperature < self.initial_temperature {
            return invalid("final_temperature must not be below initial_temperature".into());
        }
        if self.steps_per_cycle == 0 {
            return invalid("steps_per_cycle must be at least 1".into());
        }
        if self.cycles == 0 {
            return invalid("cycles must be at least 1".into());
        }
        if self.update.is_active() {
            if self.update_period == 0 {
                return invalid("update_period must be at least 1".into());
            }
            if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
                return invalid(format!(
                    "target_acceptance must be in (0, 1), got {}",
                    self.target_acceptance
                ));
            }
            if !(self.update_gain > 0.0 && self.update_gain <= 1.0) {
                return invalid(format!(
                    "update_gain must be in (0, 1], got {}",
                    self.update_gain
                ));
            }
        }
        Ok(())
    }
}
