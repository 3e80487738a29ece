//! Per-case random draws.

use funnel_core::{
    Case, Funnel, Stage, StageParameters, ValidationError, VarianceConfig, DAYS_PER_MONTH,
};
use rand::Rng;
use std::f64::consts::PI;

/// Standard-normal sample via the Box–Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen::<f64>() is in [0, 1); flip it so ln() never sees zero.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Days from now until cash is received if `case` wins at its current stage.
///
/// The remaining cycle time is floored at zero, so cases that have already
/// outlasted the expected cycle only wait for the payment lag.
pub fn time_to_cash_days(case: &Case, params: &StageParameters) -> f64 {
    let remaining_months = (params.cycle_time_months - case.elapsed_months()).max(0.0);
    remaining_months * DAYS_PER_MONTH + params.payment_lag_days
}

/// A case resolved against its stage parameters, ready for repeated draws.
#[derive(Clone, Debug)]
pub(crate) struct CaseModel {
    pub label: String,
    pub stage: Stage,
    pub fee: f64,
    pub win_rate: f64,
    /// Present only for cases at the funnel's terminal stage.
    pub bonus_fee: Option<f64>,
    pub days_to_cash: f64,
    /// First projection month in which a win counts as received (0 = already due).
    pub cash_month: usize,
}

impl CaseModel {
    pub fn resolve(case: &Case, funnel: &Funnel) -> Result<Self, ValidationError> {
        let params = funnel.require(case.stage)?;
        let bonus_fee = if funnel.is_terminal(case.stage) && funnel.bonus_fee().is_some() {
            Some(funnel.bonus_amount())
        } else {
            None
        };
        let days_to_cash = time_to_cash_days(case, params);
        Ok(Self {
            label: case.label.clone(),
            stage: case.stage,
            fee: params.fee_amount()?,
            win_rate: params.win_rate,
            bonus_fee,
            days_to_cash,
            cash_month: (days_to_cash / DAYS_PER_MONTH).ceil() as usize,
        })
    }

    /// One trial for this case: `Some(revenue)` on a win, `None` on a loss.
    ///
    /// The win rate is perturbed additively and clamped; the base fee and
    /// the terminal bonus are independent multiplicative draws, each floored
    /// at zero, with the bonus using half the fee variance.
    pub fn draw<R: Rng + ?Sized>(&self, variance: &VarianceConfig, rng: &mut R) -> Option<f64> {
        let p = (self.win_rate + standard_normal(rng) * variance.win_rate_variance).clamp(0.0, 1.0);
        if rng.gen::<f64>() >= p {
            return None;
        }
        let mut revenue =
            (self.fee * (1.0 + standard_normal(rng) * variance.fee_variance)).max(0.0);
        if let Some(bonus) = self.bonus_fee {
            let half = variance.fee_variance / 2.0;
            revenue += (bonus * (1.0 + standard_normal(rng) * half)).max(0.0);
        }
        Some(revenue)
    }
}
