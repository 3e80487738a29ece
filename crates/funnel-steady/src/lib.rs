#![deny(warnings)]

//! Deterministic steady-state model of the case funnel.
//!
//! A constant monthly intake cascades through the stages: at each stage a
//! fraction of the arriving cohort is resolved (won or lost) and the rest
//! advances. At the terminal stage only `advance_fraction` of arrivals
//! pursue it; the rest withdraw without a fee. The solver reports per-stage
//! flows, monthly revenue, and the equilibrium open caseload via
//! `intake × weighted average lifecycle`.
//!
//! Inputs are validated up front and never clamped.

use funnel_core::{Funnel, Stage, StageParameters, ValidationError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors produced by the steady-state solver.
#[derive(Debug, Error, PartialEq)]
pub enum SteadyStateError {
    /// Out-of-range rate, negative fee or time, or a malformed stage list.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Intake must be finite and non-negative.
    #[error("monthly intake must be >= 0, got {0}")]
    InvalidIntake(f64),
    /// One resolution fraction is required per funnel stage.
    #[error("expected {expected} resolution fractions, got {found}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Aggregate assumptions for one stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowStage {
    pub stage: Stage,
    /// Probability a case reaching this stage is decided here.
    pub resolution_fraction: f64,
    /// Probability of a win given a decision here.
    pub win_rate: f64,
    pub fee: Decimal,
    pub cycle_time_months: f64,
}

impl FlowStage {
    /// Pair existing stage parameters with a resolution fraction.
    pub fn from_parameters(params: &StageParameters, resolution_fraction: f64) -> Self {
        Self {
            stage: params.stage,
            resolution_fraction,
            win_rate: params.win_rate,
            fee: params.fee,
            cycle_time_months: params.cycle_time_months,
        }
    }

    fn validate(&self) -> Result<f64, ValidationError> {
        for (field, value) in [
            ("resolution_fraction", self.resolution_fraction),
            ("win_rate", self.win_rate),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite(field));
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ProbabilityOutOfRange { field, value });
            }
        }
        if !self.cycle_time_months.is_finite() {
            return Err(ValidationError::NonFinite("cycle_time_months"));
        }
        if self.cycle_time_months < 0.0 {
            return Err(ValidationError::NegativeDuration {
                field: "cycle_time_months",
                value: self.cycle_time_months,
            });
        }
        if self.fee < Decimal::ZERO {
            return Err(ValidationError::NegativeFee(self.stage));
        }
        self.fee.to_f64().ok_or(ValidationError::NonFinite("fee"))
    }
}

fn default_advance_fraction() -> f64 {
    1.0
}

/// Inputs to the steady-state solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateInputs {
    /// New cases entering the first stage each month.
    pub monthly_intake: f64,
    /// Stages in funnel order; the last one is terminal.
    pub stages: Vec<FlowStage>,
    /// Share of cases reaching the terminal stage that pursue it.
    #[serde(default = "default_advance_fraction")]
    pub advance_fraction: f64,
    /// Extra fee per terminal-stage win.
    #[serde(default)]
    pub bonus_fee: Decimal,
}

impl SteadyStateInputs {
    /// Build inputs from a funnel plus one resolution fraction per stage.
    pub fn from_funnel(
        funnel: &Funnel,
        monthly_intake: f64,
        resolution_fractions: &[f64],
        advance_fraction: f64,
    ) -> Result<Self, SteadyStateError> {
        if resolution_fractions.len() != funnel.len() {
            return Err(SteadyStateError::LengthMismatch {
                expected: funnel.len(),
                found: resolution_fractions.len(),
            });
        }
        let stages = funnel
            .stages()
            .iter()
            .zip(resolution_fractions)
            .map(|(p, &rf)| FlowStage::from_parameters(p, rf))
            .collect();
        Ok(Self {
            monthly_intake,
            stages,
            advance_fraction,
            bonus_fee: funnel.bonus_fee().unwrap_or(Decimal::ZERO),
        })
    }

    /// Check every input; returns the fees as floating-point amounts.
    fn validate(&self) -> Result<Validated, SteadyStateError> {
        if !self.monthly_intake.is_finite() || self.monthly_intake < 0.0 {
            return Err(SteadyStateError::InvalidIntake(self.monthly_intake));
        }
        if self.stages.is_empty() {
            return Err(ValidationError::EmptyFunnel.into());
        }
        for pair in self.stages.windows(2) {
            if pair[0].stage.next() != Some(pair[1].stage) {
                return Err(ValidationError::StageOrder(pair[1].stage).into());
            }
        }
        let fees = self
            .stages
            .iter()
            .map(FlowStage::validate)
            .collect::<Result<Vec<_>, _>>()?;
        if !self.advance_fraction.is_finite() {
            return Err(ValidationError::NonFinite("advance_fraction").into());
        }
        if !(0.0..=1.0).contains(&self.advance_fraction) {
            return Err(ValidationError::ProbabilityOutOfRange {
                field: "advance_fraction",
                value: self.advance_fraction,
            }
            .into());
        }
        if self.bonus_fee < Decimal::ZERO {
            return Err(ValidationError::NegativeBonusFee.into());
        }
        let bonus = self
            .bonus_fee
            .to_f64()
            .ok_or(ValidationError::NonFinite("bonus_fee"))?;
        Ok(Validated { fees, bonus })
    }
}

struct Validated {
    fees: Vec<f64>,
    bonus: f64,
}

/// Monthly flows through one stage at equilibrium.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageFlow {
    pub stage: Stage,
    /// Cases reaching the stage each month.
    pub arriving: f64,
    /// Cases that pursue the stage; equals `arriving` except at the terminal stage.
    pub pursuing: f64,
    pub resolved: f64,
    pub wins: f64,
    /// Cases left unresolved that move on.
    pub advanced: f64,
    pub revenue: f64,
}

/// Equilibrium caseload and revenue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateResult {
    pub stages: Vec<StageFlow>,
    /// Terminal-stage arrivals that do not pursue it.
    pub withdrawn: f64,
    /// Cases left unresolved after the terminal stage.
    pub final_remaining: f64,
    pub monthly_revenue: f64,
    pub annual_revenue: f64,
    /// Intake-weighted months a case spends open.
    pub weighted_lifecycle_months: f64,
    pub open_caseload: f64,
}

struct Cascade {
    stages: Vec<StageFlow>,
    withdrawn: f64,
    final_remaining: f64,
    /// Sum over exit paths of population times months open.
    case_months: f64,
}

fn cascade(inputs: &SteadyStateInputs, v: &Validated, cohort: f64) -> Cascade {
    let last = inputs.stages.len() - 1;
    let mut remaining = cohort;
    let mut elapsed = 0.0;
    let mut case_months = 0.0;
    let mut withdrawn = 0.0;
    let mut stages = Vec::with_capacity(inputs.stages.len());

    for (i, (st, &fee)) in inputs.stages.iter().zip(&v.fees).enumerate() {
        let terminal = i == last;
        let pursuing = if terminal {
            remaining * inputs.advance_fraction
        } else {
            remaining
        };
        if terminal {
            withdrawn = remaining - pursuing;
            case_months += withdrawn * elapsed;
        }
        elapsed += st.cycle_time_months;

        let resolved = pursuing * st.resolution_fraction;
        let wins = resolved * st.win_rate;
        let advanced = pursuing * (1.0 - st.resolution_fraction);
        let paid = if terminal { fee + v.bonus } else { fee };
        case_months += resolved * elapsed;

        stages.push(StageFlow {
            stage: st.stage,
            arriving: remaining,
            pursuing,
            resolved,
            wins,
            advanced,
            revenue: wins * paid,
        });
        remaining = advanced;
    }
    case_months += remaining * elapsed;

    Cascade {
        stages,
        withdrawn,
        final_remaining: remaining,
        case_months,
    }
}

/// Solve the steady state for `inputs`.
///
/// Example:
/// let res = solve(&inputs)?;
/// assert!(res.open_caseload >= 0.0);
pub fn solve(inputs: &SteadyStateInputs) -> Result<SteadyStateResult, SteadyStateError> {
    let v = inputs.validate()?;
    let flow = cascade(inputs, &v, inputs.monthly_intake);
    // A unit cohort gives the per-case lifecycle even when intake is zero.
    let weighted_lifecycle_months = cascade(inputs, &v, 1.0).case_months;
    let monthly_revenue: f64 = flow.stages.iter().map(|s| s.revenue).sum();
    let open_caseload = inputs.monthly_intake * weighted_lifecycle_months;

    info!(
        intake = inputs.monthly_intake,
        stages = flow.stages.len(),
        monthly_revenue,
        open_caseload,
        "steady state solved"
    );

    Ok(SteadyStateResult {
        stages: flow.stages,
        withdrawn: flow.withdrawn,
        final_remaining: flow.final_remaining,
        monthly_revenue,
        annual_revenue: monthly_revenue * 12.0,
        weighted_lifecycle_months,
        open_caseload,
    })
}
