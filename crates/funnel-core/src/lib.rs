#![deny(warnings)]

//! Core domain model for the case-resolution funnel.
//!
//! This crate defines the ordered resolution stages, the per-stage economic
//! parameters, and the in-flight case records shared by the Monte Carlo
//! engine and the steady-state solver. Every constructor validates its
//! inputs so downstream code can rely on basic invariants:
//! - probabilities are within [0, 1]
//! - money and durations are finite and non-negative
//! - a funnel is non-empty and lists contiguous stages in canonical order

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Average number of days in a month, used to convert between the
/// day-based case clock and month-based cycle times.
pub const DAYS_PER_MONTH: f64 = 30.44;

/// One step of the resolution funnel, in canonical order.
///
/// A case that is not resolved at a stage advances to the next one; stages
/// are never skipped and cases never move backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First-level decision on the initial application.
    Initial,
    /// Reconsideration of a first-level denial.
    Reconsideration,
    /// Hearing before an administrative law judge.
    Hearing,
    /// Appeals Council review.
    AppealsCouncil,
    /// Federal district court review; the terminal appellate stage.
    FederalCourt,
}

impl Stage {
    /// Canonical ordering of all stages.
    pub const ALL: [Stage; 5] = [
        Stage::Initial,
        Stage::Reconsideration,
        Stage::Hearing,
        Stage::AppealsCouncil,
        Stage::FederalCourt,
    ];

    /// Fallback for unclassifiable labels when no funnel is at hand; see
    /// [`Funnel::default_stage`] for the funnel-aware fallback.
    pub const DEFAULT: Stage = Stage::Initial;

    /// Zero-based position in the canonical ordering.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The stage a case advances to when unresolved here.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// Snake-case identifier, as used in scenario files.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Reconsideration => "reconsideration",
            Stage::Hearing => "hearing",
            Stage::AppealsCouncil => "appeals_council",
            Stage::FederalCourt => "federal_court",
        }
    }

    /// Map a free-text stage label from case ingestion onto a stage, or
    /// `None` when the label matches nothing.
    ///
    /// Matching is case-insensitive and tolerant of punctuation.
    pub fn recognize(raw: &str) -> Option<Stage> {
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let has = |needle: &str| tokens.iter().any(|t| t.starts_with(needle));

        if has("federal") || has("district") || has("court") {
            Some(Stage::FederalCourt)
        } else if has("council") || tokens.contains(&"ac") {
            Some(Stage::AppealsCouncil)
        } else if has("hearing") || tokens.contains(&"alj") {
            Some(Stage::Hearing)
        } else if has("recon") {
            Some(Stage::Reconsideration)
        } else if has("initial") || has("application") {
            Some(Stage::Initial)
        } else {
            None
        }
    }

    /// Like [`Stage::recognize`], falling back to [`Stage::DEFAULT`].
    pub fn classify(raw: &str) -> Stage {
        Stage::recognize(raw).unwrap_or(Stage::DEFAULT)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initial => "Initial",
            Stage::Reconsideration => "Reconsideration",
            Stage::Hearing => "Hearing",
            Stage::AppealsCouncil => "Appeals Council",
            Stage::FederalCourt => "Federal Court",
        };
        f.write_str(name)
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    /// Strict parse of a stage key or display name; see [`Stage::classify`]
    /// for the lenient variant used on ingested data.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Stage::ALL
            .into_iter()
            .find(|st| {
                st.key().eq_ignore_ascii_case(wanted)
                    || st.to_string().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ValidationError::UnknownStage(s.to_string()))
    }
}

/// Validation errors for funnel invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A funnel must contain at least one stage.
    #[error("funnel has no stages")]
    EmptyFunnel,
    /// Stages must be contiguous and in canonical order.
    #[error("stage {0} is out of order or skips a stage")]
    StageOrder(Stage),
    /// Parameters were requested for a stage the funnel does not contain.
    #[error("no parameters configured for stage {0}")]
    MissingStage(Stage),
    /// Stage name could not be parsed.
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    /// Probability must be within [0, 1].
    #[error("{field} must be within [0,1], got {value}")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },
    /// Fee must be non-negative.
    #[error("negative fee for stage {0}")]
    NegativeFee(Stage),
    /// Bonus fee must be non-negative.
    #[error("negative bonus fee")]
    NegativeBonusFee,
    /// Durations must be non-negative.
    #[error("{field} must be >= 0, got {value}")]
    NegativeDuration { field: &'static str, value: f64 },
    /// Variance settings must be non-negative.
    #[error("{field} must be >= 0, got {value}")]
    NegativeVariance { field: &'static str, value: f64 },
    /// Numeric field must be finite.
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
}

/// Economic parameters for a single stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageParameters {
    /// Stage these parameters apply to.
    pub stage: Stage,
    /// Fee collected on a favorable decision at this stage.
    pub fee: Decimal,
    /// Probability of a favorable decision, in [0, 1].
    pub win_rate: f64,
    /// Expected months from entering the stage to a decision.
    pub cycle_time_months: f64,
    /// Days between a favorable decision and receipt of the fee.
    pub payment_lag_days: f64,
}

impl StageParameters {
    /// Check every field against its domain without modifying anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.check_finite()?;
        if self.fee < Decimal::ZERO {
            return Err(ValidationError::NegativeFee(self.stage));
        }
        if !(0.0..=1.0).contains(&self.win_rate) {
            return Err(ValidationError::ProbabilityOutOfRange {
                field: "win_rate",
                value: self.win_rate,
            });
        }
        if self.cycle_time_months < 0.0 {
            return Err(ValidationError::NegativeDuration {
                field: "cycle_time_months",
                value: self.cycle_time_months,
            });
        }
        if self.payment_lag_days < 0.0 {
            return Err(ValidationError::NegativeDuration {
                field: "payment_lag_days",
                value: self.payment_lag_days,
            });
        }
        Ok(())
    }

    /// Copy with the win rate clamped into [0, 1] and negative fee or
    /// durations raised to zero. Non-finite values are still rejected.
    pub fn clamped(&self) -> Result<Self, ValidationError> {
        self.check_finite()?;
        Ok(Self {
            stage: self.stage,
            fee: self.fee.max(Decimal::ZERO),
            win_rate: self.win_rate.clamp(0.0, 1.0),
            cycle_time_months: self.cycle_time_months.max(0.0),
            payment_lag_days: self.payment_lag_days.max(0.0),
        })
    }

    /// Fee as a floating-point amount for sampling and flow arithmetic.
    pub fn fee_amount(&self) -> Result<f64, ValidationError> {
        self.fee.to_f64().ok_or(ValidationError::NonFinite("fee"))
    }

    fn check_finite(&self) -> Result<(), ValidationError> {
        if !self.win_rate.is_finite() {
            return Err(ValidationError::NonFinite("win_rate"));
        }
        if !self.cycle_time_months.is_finite() {
            return Err(ValidationError::NonFinite("cycle_time_months"));
        }
        if !self.payment_lag_days.is_finite() {
            return Err(ValidationError::NonFinite("payment_lag_days"));
        }
        self.fee_amount().map(|_| ())
    }
}

/// Simulation-wide stochastic perturbation settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VarianceConfig {
    /// Relative standard deviation applied to sampled fees.
    pub fee_variance: f64,
    /// Absolute standard deviation applied to sampled win rates.
    pub win_rate_variance: f64,
}

impl VarianceConfig {
    /// Validate that both settings are finite and non-negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("fee_variance", self.fee_variance),
            ("win_rate_variance", self.win_rate_variance),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite(field));
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeVariance { field, value });
            }
        }
        Ok(())
    }
}

/// An ordered funnel of stage parameters with an optional bonus fee paid on
/// wins at the terminal stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Funnel {
    stages: Vec<StageParameters>,
    bonus_fee: Option<Decimal>,
}

impl Funnel {
    /// Build a funnel, rejecting any out-of-range parameter.
    pub fn new(
        stages: Vec<StageParameters>,
        bonus_fee: Option<Decimal>,
    ) -> Result<Self, ValidationError> {
        for s in &stages {
            s.validate()?;
        }
        if bonus_fee.is_some_and(|b| b < Decimal::ZERO) {
            return Err(ValidationError::NegativeBonusFee);
        }
        Self::ordered(stages, bonus_fee)
    }

    /// Build a funnel, clamping out-of-range parameters into their domain.
    ///
    /// Ordering problems and non-finite values are still errors.
    pub fn normalized(
        stages: Vec<StageParameters>,
        bonus_fee: Option<Decimal>,
    ) -> Result<Self, ValidationError> {
        let stages = stages
            .iter()
            .map(StageParameters::clamped)
            .collect::<Result<Vec<_>, _>>()?;
        Self::ordered(stages, bonus_fee.map(|b| b.max(Decimal::ZERO)))
    }

    fn ordered(
        stages: Vec<StageParameters>,
        bonus_fee: Option<Decimal>,
    ) -> Result<Self, ValidationError> {
        if stages.is_empty() {
            return Err(ValidationError::EmptyFunnel);
        }
        for pair in stages.windows(2) {
            if pair[0].stage.next() != Some(pair[1].stage) {
                return Err(ValidationError::StageOrder(pair[1].stage));
            }
        }
        if let Some(b) = bonus_fee {
            b.to_f64().ok_or(ValidationError::NonFinite("bonus_fee"))?;
        }
        Ok(Self { stages, bonus_fee })
    }

    /// Stage parameters in funnel order.
    pub fn stages(&self) -> &[StageParameters] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; construction rejects empty funnels.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Parameters for `stage`, if the funnel contains it.
    pub fn get(&self, stage: Stage) -> Option<&StageParameters> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Parameters for `stage`, or a configuration error if absent.
    pub fn require(&self, stage: Stage) -> Result<&StageParameters, ValidationError> {
        self.get(stage).ok_or(ValidationError::MissingStage(stage))
    }

    /// Stage given to cases whose label cannot be classified: the first
    /// stage of this funnel, so such cases always have parameters.
    pub fn default_stage(&self) -> Stage {
        // Non-empty by construction.
        self.stages[0].stage
    }

    /// Classify a free-text label, falling back to [`Funnel::default_stage`].
    pub fn classify(&self, raw: &str) -> Stage {
        Stage::recognize(raw).unwrap_or_else(|| self.default_stage())
    }

    /// Parameters of the last stage in the funnel.
    pub fn terminal(&self) -> &StageParameters {
        // Non-empty by construction.
        &self.stages[self.stages.len() - 1]
    }

    /// Whether `stage` is the funnel's terminal stage.
    pub fn is_terminal(&self, stage: Stage) -> bool {
        self.terminal().stage == stage
    }

    /// Bonus fee paid on terminal-stage wins, if configured.
    pub fn bonus_fee(&self) -> Option<Decimal> {
        self.bonus_fee
    }

    /// Bonus fee as a floating-point amount; zero when not configured.
    pub fn bonus_amount(&self) -> f64 {
        self.bonus_fee.and_then(|b| b.to_f64()).unwrap_or(0.0)
    }
}

/// An in-flight case awaiting a decision at its current stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Caller-supplied identifier.
    pub label: String,
    /// Current stage.
    pub stage: Stage,
    /// Days already spent at the current stage (>= 0).
    pub days_in_stage: f64,
}

impl Case {
    /// Create a case, treating negative or non-finite elapsed time as zero.
    pub fn new(label: impl Into<String>, stage: Stage, days_in_stage: f64) -> Self {
        Self {
            label: label.into(),
            stage,
            days_in_stage: normalize_days(days_in_stage),
        }
    }

    /// Create a case from an unclassified stage label, classified against
    /// `funnel`.
    pub fn from_raw(
        label: impl Into<String>,
        raw_stage: &str,
        days_in_stage: f64,
        funnel: &Funnel,
    ) -> Self {
        Self::new(label, funnel.classify(raw_stage), days_in_stage)
    }

    /// Days at the current stage, with negative or non-finite values read
    /// as zero. Fields are public, so records built without [`Case::new`]
    /// are normalized here.
    pub fn elapsed_days(&self) -> f64 {
        normalize_days(self.days_in_stage)
    }

    /// Months already elapsed at the current stage.
    pub fn elapsed_months(&self) -> f64 {
        self.elapsed_days() / DAYS_PER_MONTH
    }
}

fn normalize_days(days: f64) -> f64 {
    if days.is_finite() {
        days.max(0.0)
    } else {
        0.0
    }
}
