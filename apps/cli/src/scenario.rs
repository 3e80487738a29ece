//! Scenario files: stage parameters, variance, caseload and steady-state
//! assumptions, plus the built-in demo used when no file is given.

use anyhow::{bail, Context, Result};
use funnel_core::{Case, Funnel, Stage, StageParameters, VarianceConfig};
use funnel_steady::SteadyStateInputs;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Smallest trial count accepted from users.
pub const MIN_TRIALS: usize = 100;
/// Largest trial count accepted from users.
pub const MAX_TRIALS: usize = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Clamp out-of-range stage parameters instead of rejecting them.
    #[serde(default)]
    pub lenient: bool,
    pub funnel: FunnelFile,
    #[serde(default)]
    pub variance: VarianceConfig,
    #[serde(default)]
    pub cases: Vec<CaseRow>,
    #[serde(default)]
    pub simulation: SimulationSettings,
    pub steady_state: Option<SteadyStateFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunnelFile {
    pub stages: Vec<StageParameters>,
    pub bonus_fee: Option<Decimal>,
}

/// A case as delivered by ingestion; `stage` is free text.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRow {
    pub label: String,
    pub stage: String,
    #[serde(default)]
    pub days_in_stage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_trials")]
    pub trials: usize,
    pub seed: Option<u64>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: None,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_trials() -> usize {
    5_000
}

fn default_chunk_size() -> usize {
    funnel_sim::DEFAULT_CHUNK_SIZE
}

fn default_advance_fraction() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SteadyStateFile {
    pub monthly_intake: f64,
    /// One entry per funnel stage.
    pub resolution_fractions: Vec<f64>,
    #[serde(default = "default_advance_fraction")]
    pub advance_fraction: f64,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Validated funnel, clamped first when the scenario is lenient.
    pub fn funnel(&self) -> Result<Funnel> {
        let stages = self.funnel.stages.clone();
        let funnel = if self.lenient {
            Funnel::normalized(stages, self.funnel.bonus_fee)?
        } else {
            Funnel::new(stages, self.funnel.bonus_fee)?
        };
        Ok(funnel)
    }

    /// Caseload with free-text stages classified against `funnel`.
    pub fn cases(&self, funnel: &Funnel) -> Vec<Case> {
        self.cases
            .iter()
            .map(|r| Case::from_raw(r.label.clone(), &r.stage, r.days_in_stage, funnel))
            .collect()
    }

    /// Steady-state inputs. The solver never clamps, so these are built
    /// from a strictly validated funnel even when the scenario is lenient.
    pub fn steady_state_inputs(&self) -> Result<Option<SteadyStateInputs>> {
        let Some(ss) = &self.steady_state else {
            return Ok(None);
        };
        let funnel = Funnel::new(self.funnel.stages.clone(), self.funnel.bonus_fee)
            .context("steady_state requires in-range stage parameters")?;
        let inputs = SteadyStateInputs::from_funnel(
            &funnel,
            ss.monthly_intake,
            &ss.resolution_fractions,
            ss.advance_fraction,
        )
        .context("building steady_state inputs")?;
        Ok(Some(inputs))
    }

    /// Built-in practice defaults.
    pub fn demo() -> Self {
        let row = |stage, fee, win_rate, cycle_time_months, payment_lag_days| StageParameters {
            stage,
            fee: Decimal::new(fee, 0),
            win_rate,
            cycle_time_months,
            payment_lag_days,
        };
        let case = |label: &str, stage: &str, days_in_stage| CaseRow {
            label: label.to_string(),
            stage: stage.to_string(),
            days_in_stage,
        };
        Scenario {
            lenient: false,
            funnel: FunnelFile {
                stages: vec![
                    row(Stage::Initial, 3500, 0.36, 7.0, 45.0),
                    row(Stage::Reconsideration, 3500, 0.13, 6.0, 45.0),
                    row(Stage::Hearing, 6000, 0.52, 12.0, 60.0),
                    row(Stage::AppealsCouncil, 4000, 0.14, 11.0, 60.0),
                    row(Stage::FederalCourt, 7000, 0.45, 14.0, 90.0),
                ],
                bonus_fee: Some(Decimal::new(6500, 0)),
            },
            variance: VarianceConfig {
                fee_variance: 0.15,
                win_rate_variance: 0.05,
            },
            cases: vec![
                case("Alvarez", "Initial application", 35.0),
                case("Brooks", "Initial", 120.0),
                case("Chen", "Recon", 60.0),
                case("Dawson", "ALJ Hearing", 240.0),
                case("Evans", "Hearing", 410.0),
                case("Foster", "Appeals Council", 90.0),
                case("Garcia", "District Court", 150.0),
                case("Hughes", "pending", 10.0),
            ],
            simulation: SimulationSettings {
                trials: 5_000,
                seed: None,
                chunk_size: funnel_sim::DEFAULT_CHUNK_SIZE,
            },
            steady_state: Some(SteadyStateFile {
                monthly_intake: 100.0,
                resolution_fractions: vec![0.55, 0.35, 0.70, 0.60, 1.0],
                advance_fraction: 0.5,
            }),
        }
    }
}

/// Reject trial counts outside the supported range.
pub fn validate_trials(trials: usize) -> Result<()> {
    if !(MIN_TRIALS..=MAX_TRIALS).contains(&trials) {
        bail!("trials must be within {MIN_TRIALS}..={MAX_TRIALS}, got {trials}");
    }
    Ok(())
}
