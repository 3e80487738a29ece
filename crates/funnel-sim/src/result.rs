//! Simulation outputs and the accumulators that build them.

use crate::sampling::CaseModel;
use crate::{SimError, HISTOGRAM_BINS, TIMELINE_MONTHS};
use funnel_core::Stage;
use funnel_stats::{histogram, percentile_sorted, Percentiles};
use serde::{Deserialize, Serialize};

/// Histogram bin over trial totals, marked with the percentiles it covers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevenueBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
    pub has_p10: bool,
    pub has_p50: bool,
    pub has_p90: bool,
}

/// Cross-trial percentiles of revenue received by the end of `month`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// Projection month, starting at 1.
    pub month: u32,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Forecast for a single case across all trials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseForecast {
    pub label: String,
    pub stage: Stage,
    /// Fraction of trials in which the case won.
    pub win_probability: f64,
    /// Mean revenue over all trials, losses included.
    pub expected_value: f64,
    /// Median time-to-cash over winning trials; zero if it never wins.
    pub median_days_to_cash: f64,
    pub p10: f64,
    pub p90: f64,
}

/// Per-stage rollup of the case forecasts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageRollup {
    pub stage: Stage,
    pub cases: usize,
    pub expected_value: f64,
    pub mean_win_probability: f64,
}

/// Aggregate result of a completed Monte Carlo run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Total revenue of each trial, in trial order.
    pub total_revenues: Vec<f64>,
    pub percentiles: Percentiles,
    pub histogram: Vec<RevenueBin>,
    pub timeline: Vec<TimelinePoint>,
    pub per_case: Vec<CaseForecast>,
    pub by_stage: Vec<StageRollup>,
}

impl SimulationResult {
    /// Number of trials the result was built from.
    pub fn trials(&self) -> usize {
        self.total_revenues.len()
    }
}

/// Running per-trial state. Every vector grows by one entry per trial.
#[derive(Debug)]
pub(crate) struct Accumulators {
    totals: Vec<f64>,
    case_revenue: Vec<Vec<f64>>,
    case_wins: Vec<usize>,
    /// `cumulative[m]` holds revenue received by month `m + 1`, per trial.
    cumulative: Vec<Vec<f64>>,
}

impl Accumulators {
    pub fn new(cases: usize, trials: usize) -> Self {
        Self {
            totals: Vec::with_capacity(trials),
            case_revenue: (0..cases).map(|_| Vec::with_capacity(trials)).collect(),
            case_wins: vec![0; cases],
            cumulative: (0..TIMELINE_MONTHS)
                .map(|_| Vec::with_capacity(trials))
                .collect(),
        }
    }

    /// Record one trial given each case's outcome, in case order.
    pub fn record(&mut self, models: &[CaseModel], outcomes: &[Option<f64>]) {
        // Revenue landing in each month; index 0 is already due.
        let mut by_month = [0.0f64; TIMELINE_MONTHS + 1];
        let mut total = 0.0;
        for (i, (model, outcome)) in models.iter().zip(outcomes).enumerate() {
            let revenue = outcome.unwrap_or(0.0);
            if outcome.is_some() {
                self.case_wins[i] += 1;
                if let Some(slot) = by_month.get_mut(model.cash_month) {
                    *slot += revenue;
                }
            }
            self.case_revenue[i].push(revenue);
            total += revenue;
        }
        self.totals.push(total);

        let mut running = by_month[0];
        for (m, series) in self.cumulative.iter_mut().enumerate() {
            running += by_month[m + 1];
            series.push(running);
        }
    }

    pub fn into_result(self, models: &[CaseModel]) -> Result<SimulationResult, SimError> {
        let trials = self.totals.len();
        let percentiles = Percentiles::from_samples(&self.totals)?;

        let histogram = histogram(&self.totals, HISTOGRAM_BINS)?
            .into_iter()
            .map(|b| RevenueBin {
                start: b.start,
                end: b.end,
                count: b.count,
                has_p10: b.covers(percentiles.p10),
                has_p50: b.covers(percentiles.p50),
                has_p90: b.covers(percentiles.p90),
            })
            .collect();

        let timeline = self
            .cumulative
            .into_iter()
            .zip(1u32..)
            .map(|(series, month)| {
                let p = Percentiles::from_samples(&series)?;
                Ok::<_, SimError>(TimelinePoint {
                    month,
                    p10: p.p10,
                    p50: p.p50,
                    p90: p.p90,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut per_case = Vec::with_capacity(models.len());
        for ((model, mut revenue), wins) in models
            .iter()
            .zip(self.case_revenue)
            .zip(self.case_wins)
        {
            let expected_value = funnel_stats::mean(&revenue);
            revenue.sort_by(f64::total_cmp);
            // Timing is fixed per case, so the median over winning trials
            // is the case's own time-to-cash.
            let median_days_to_cash = if wins > 0 && model.days_to_cash > 0.0 {
                model.days_to_cash
            } else {
                0.0
            };
            per_case.push(CaseForecast {
                label: model.label.clone(),
                stage: model.stage,
                win_probability: if trials == 0 {
                    0.0
                } else {
                    wins as f64 / trials as f64
                },
                expected_value,
                median_days_to_cash,
                p10: percentile_sorted(&revenue, 10.0)?,
                p90: percentile_sorted(&revenue, 90.0)?,
            });
        }

        let by_stage = rollup(&per_case);

        Ok(SimulationResult {
            total_revenues: self.totals,
            percentiles,
            histogram,
            timeline,
            per_case,
            by_stage,
        })
    }
}

fn rollup(per_case: &[CaseForecast]) -> Vec<StageRollup> {
    Stage::ALL
        .iter()
        .filter_map(|&stage| {
            let group: Vec<&CaseForecast> = per_case.iter().filter(|c| c.stage == stage).collect();
            if group.is_empty() {
                return None;
            }
            let n = group.len();
            Some(StageRollup {
                stage,
                cases: n,
                expected_value: group.iter().map(|c| c.expected_value).sum(),
                mean_win_probability: group.iter().map(|c| c.win_probability).sum::<f64>()
                    / n as f64,
            })
        })
        .collect()
}
