#![deny(warnings)]

//! Monte Carlo revenue forecasting over a list of in-flight cases.
//!
//! Each trial decides every case independently: the stage win rate is
//! perturbed and clamped, a Bernoulli draw decides the outcome, and wins
//! are paid a perturbed fee (plus the terminal-stage bonus, when
//! configured). After all trials the engine reports:
//! - P10/P50/P90/mean of total revenue and a 30-bin histogram
//! - cumulative revenue percentiles for months 1..=36
//! - per-case win frequency, expected value and revenue bounds
//!
//! Runs are decomposed into chunks (see [`MonteCarloRun`]) so a host can
//! observe progress and yield between them. Randomness is injected through
//! [`rand::Rng`]; seed a generator for reproducible results.

mod result;
mod run;
mod sampling;

pub use result::{CaseForecast, RevenueBin, SimulationResult, StageRollup, TimelinePoint};
pub use run::{MonteCarloRun, Progress, RunSupervisor, RunTicket};
pub use sampling::{standard_normal, time_to_cash_days};

use funnel_core::{Case, Funnel, ValidationError, VarianceConfig};
use funnel_stats::StatsError;
use rand::Rng;
use thiserror::Error;

/// Months covered by the cumulative revenue timeline.
pub const TIMELINE_MONTHS: usize = 36;

/// Number of bins in the trial-total histogram.
pub const HISTOGRAM_BINS: usize = 30;

/// Trials executed per chunk unless overridden.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Errors produced by the simulation engine.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    /// At least one trial is required.
    #[error("trial count must be > 0")]
    ZeroTrials,
    /// At least one trial per chunk is required.
    #[error("chunk size must be > 0")]
    ZeroChunkSize,
    /// Invalid stage parameters, variance, or a case at an unknown stage.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    /// The result was requested before every trial ran.
    #[error("run incomplete: {completed}/{total} trials")]
    Incomplete { completed: usize, total: usize },
    /// A newer run was started; this run's output must be discarded.
    #[error("run superseded by a newer request")]
    Superseded,
}

/// Run a full simulation in one call.
///
/// Example:
/// let mut rng = ChaCha8Rng::seed_from_u64(42);
/// let res = simulate(&cases, &funnel, VarianceConfig::default(), 1_000, &mut rng)?;
/// assert!(res.percentiles.p10 <= res.percentiles.p90);
pub fn simulate<R: Rng>(
    cases: &[Case],
    funnel: &Funnel,
    variance: VarianceConfig,
    trials: usize,
    rng: R,
) -> Result<SimulationResult, SimError> {
    MonteCarloRun::new(cases, funnel, variance, trials, rng)?.run_to_completion()
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::{Stage, StageParameters, DAYS_PER_MONTH};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rust_decimal::Decimal;

    fn stage(stage: Stage, fee: i64, win_rate: f64, cycle: f64, lag: f64) -> StageParameters {
        StageParameters {
            stage,
            fee: Decimal::new(fee, 0),
            win_rate,
            cycle_time_months: cycle,
            payment_lag_days: lag,
        }
    }

    fn practice_funnel() -> Funnel {
        Funnel::new(
            vec![
                stage(Stage::Initial, 3500, 0.36, 7.0, 45.0),
                stage(Stage::Reconsideration, 3500, 0.13, 6.0, 45.0),
                stage(Stage::Hearing, 6000, 0.52, 12.0, 60.0),
                stage(Stage::AppealsCouncil, 4000, 0.14, 11.0, 60.0),
                stage(Stage::FederalCourt, 7000, 0.45, 14.0, 90.0),
            ],
            Some(Decimal::new(6500, 0)),
        )
        .unwrap()
    }

    fn caseload() -> Vec<Case> {
        vec![
            Case::new("A-100", Stage::Initial, 30.0),
            Case::new("A-101", Stage::Reconsideration, 90.0),
            Case::new("A-102", Stage::Hearing, 240.0),
            Case::new("A-103", Stage::Hearing, 400.0),
            Case::new("A-104", Stage::AppealsCouncil, 10.0),
            Case::new("A-105", Stage::FederalCourt, 120.0),
        ]
    }

    fn seeded(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn forecast(
        cases: &[Case],
        funnel: &Funnel,
        variance: VarianceConfig,
        trials: usize,
        seed: u64,
    ) -> SimulationResult {
        simulate(cases, funnel, variance, trials, ChaCha8Rng::seed_from_u64(seed)).unwrap()
    }

    fn variance() -> VarianceConfig {
        VarianceConfig {
            fee_variance: 0.15,
            win_rate_variance: 0.05,
        }
    }

    #[test]
    fn terminal_win_with_zero_variance_is_exact() {
        let funnel = Funnel::new(
            vec![stage(Stage::FederalCourt, 7000, 1.0, 14.0, 90.0)],
            Some(Decimal::new(6500, 0)),
        )
        .unwrap();
        let cases = [Case::new("fc", Stage::FederalCourt, 0.0)];
        let rng = ChaCha8Rng::seed_from_u64(0);
        let res = simulate(&cases, &funnel, VarianceConfig::default(), 1, rng).unwrap();
        assert_eq!(res.total_revenues, vec![13_500.0]);
        assert_eq!(res.percentiles.p10, 13_500.0);
        assert_eq!(res.percentiles.p90, 13_500.0);
        assert_eq!(res.per_case[0].win_probability, 1.0);
        assert_eq!(res.per_case[0].expected_value, 13_500.0);
    }

    #[test]
    fn percentiles_are_ordered_and_histogram_counts_trials() {
        let rng = ChaCha8Rng::seed_from_u64(42);
        let res = simulate(&caseload(), &practice_funnel(), variance(), 2_000, rng).unwrap();
        let p = res.percentiles;
        assert!(p.p10 <= p.p50 && p.p50 <= p.p90, "{p:?}");
        assert_eq!(res.trials(), 2_000);
        assert_eq!(res.histogram.len(), HISTOGRAM_BINS);
        assert_eq!(res.histogram.iter().map(|b| b.count).sum::<usize>(), 2_000);
        assert!(res.histogram.iter().any(|b| b.has_p10));
        assert!(res.histogram.iter().any(|b| b.has_p50));
        assert!(res.histogram.iter().any(|b| b.has_p90));
    }

    #[test]
    fn same_seed_same_result() {
        let a = forecast(&caseload(), &practice_funnel(), variance(), 500, 9);
        let b = forecast(&caseload(), &practice_funnel(), variance(), 500, 9);
        let c = forecast(&caseload(), &practice_funnel(), variance(), 500, 10);
        assert_eq!(a, b);
        assert_ne!(a.total_revenues, c.total_revenues);
    }

    #[test]
    fn empty_caseload_yields_zero_result() {
        let rng = ChaCha8Rng::seed_from_u64(1);
        let res = simulate(&[], &practice_funnel(), variance(), 250, rng).unwrap();
        assert_eq!(res.total_revenues, vec![0.0; 250]);
        assert_eq!(res.percentiles, funnel_stats::Percentiles::default());
        assert_eq!(res.histogram[0].count, 250);
        assert!(res.histogram[1..].iter().all(|b| b.count == 0));
        assert_eq!(res.timeline.len(), TIMELINE_MONTHS);
        assert!(res.timeline.iter().all(|t| t.p90 == 0.0));
        assert!(res.per_case.is_empty());
        assert!(res.by_stage.is_empty());
    }

    #[test]
    fn configuration_errors_are_reported_before_running() {
        let rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            simulate(&caseload(), &practice_funnel(), variance(), 0, rng.clone()).unwrap_err(),
            SimError::ZeroTrials
        );
        let short = Funnel::new(vec![stage(Stage::Initial, 3500, 0.3, 7.0, 45.0)], None).unwrap();
        assert_eq!(
            simulate(&caseload(), &short, variance(), 10, rng.clone()).unwrap_err(),
            SimError::Validation(ValidationError::MissingStage(Stage::Reconsideration))
        );
        let bad = VarianceConfig {
            fee_variance: -1.0,
            win_rate_variance: 0.0,
        };
        assert!(matches!(
            simulate(&caseload(), &practice_funnel(), bad, 10, rng),
            Err(SimError::Validation(ValidationError::NegativeVariance { .. }))
        ));
    }

    #[test]
    fn timeline_releases_revenue_in_cash_month() {
        // 240 days into an 11 month cycle with a 60 day lag: ~154.8 days,
        // so the fee lands in month 6.
        let funnel = Funnel::new(vec![stage(Stage::Hearing, 6000, 1.0, 11.0, 60.0)], None).unwrap();
        let cases = [Case::new("H-1", Stage::Hearing, 240.0)];
        let res = forecast(&cases, &funnel, VarianceConfig::default(), 20, 5);
        let expected_days = (11.0 - 240.0 / DAYS_PER_MONTH) * DAYS_PER_MONTH + 60.0;
        assert!((res.per_case[0].median_days_to_cash - expected_days).abs() < 1e-9);
        for point in &res.timeline {
            let want = if point.month >= 6 { 6000.0 } else { 0.0 };
            assert_eq!(point.p50, want, "month {}", point.month);
        }
        assert_eq!(res.timeline.first().map(|t| t.month), Some(1));
        assert_eq!(res.timeline.last().map(|t| t.month), Some(36));
    }

    #[test]
    fn timeline_percentiles_never_decrease() {
        let res = forecast(&caseload(), &practice_funnel(), variance(), 800, 3);
        for w in res.timeline.windows(2) {
            assert!(w[0].p10 <= w[1].p10);
            assert!(w[0].p50 <= w[1].p50);
            assert!(w[0].p90 <= w[1].p90);
        }
    }

    #[test]
    fn per_case_statistics_are_consistent() {
        let res = forecast(&caseload(), &practice_funnel(), variance(), 3_000, 77);
        assert_eq!(res.per_case.len(), 6);
        for c in &res.per_case {
            assert!((0.0..=1.0).contains(&c.win_probability));
            assert!(c.p10 <= c.p90);
            assert!(c.expected_value >= 0.0);
        }
        // Hearing win rate is 0.52; the sampled frequency should be close.
        let hearing = &res.per_case[2];
        assert!((hearing.win_probability - 0.52).abs() < 0.05, "{}", hearing.win_probability);
        let total_ev: f64 = res.per_case.iter().map(|c| c.expected_value).sum();
        assert!((total_ev - res.percentiles.mean).abs() < 1e-6 * total_ev.max(1.0));
        let rolled: usize = res.by_stage.iter().map(|s| s.cases).sum();
        assert_eq!(rolled, 6);
        assert_eq!(res.by_stage[2].stage, Stage::Hearing);
        assert_eq!(res.by_stage[2].cases, 2);
    }

    #[test]
    fn losing_case_has_zero_time_to_cash() {
        let funnel = Funnel::new(vec![stage(Stage::Initial, 3500, 0.0, 7.0, 45.0)], None).unwrap();
        let cases = [Case::new("L", Stage::Initial, 0.0)];
        let res = forecast(&cases, &funnel, VarianceConfig::default(), 100, 2);
        let c = &res.per_case[0];
        assert_eq!(c.win_probability, 0.0);
        assert_eq!(c.expected_value, 0.0);
        assert_eq!(c.median_days_to_cash, 0.0);
    }

    #[test]
    fn chunked_run_matches_single_call() {
        let funnel = practice_funnel();
        let rng = ChaCha8Rng::seed_from_u64(21);
        let mut run = MonteCarloRun::new(&caseload(), &funnel, variance(), 1_050, rng)
            .unwrap()
            .with_chunk_size(100)
            .unwrap();
        let mut seen = Vec::new();
        for progress in run.chunks() {
            seen.push(progress.unwrap());
        }
        assert_eq!(seen.len(), 11);
        assert_eq!(seen[0], Progress { completed: 100, total: 1_050 });
        assert!(seen.windows(2).all(|w| w[0].fraction() < w[1].fraction()));
        assert!(seen.last().is_some_and(|p| p.is_done() && p.fraction() == 1.0));
        let chunked = run.finish().unwrap();
        let direct = forecast(&caseload(), &funnel, variance(), 1_050, 21);
        assert_eq!(chunked, direct);
    }

    #[test]
    fn unfinished_run_exposes_no_result() {
        let rng = ChaCha8Rng::seed_from_u64(4);
        let mut run =
            MonteCarloRun::new(&caseload(), &practice_funnel(), variance(), 500, rng).unwrap();
        let p = run.step().unwrap();
        assert_eq!(p.completed, DEFAULT_CHUNK_SIZE);
        assert_eq!(
            run.finish().unwrap_err(),
            SimError::Incomplete { completed: 100, total: 500 }
        );
    }

    #[test]
    fn newer_request_supersedes_running_one() {
        let supervisor = RunSupervisor::new();
        let funnel = practice_funnel();
        let mut first = MonteCarloRun::new(&caseload(), &funnel, variance(), 400, seeded(1))
            .unwrap()
            .with_ticket(supervisor.begin());
        assert!(first.step().is_ok());

        let second = MonteCarloRun::new(&caseload(), &funnel, variance(), 400, seeded(2))
            .unwrap()
            .with_ticket(supervisor.begin());
        assert_eq!(first.step().unwrap_err(), SimError::Superseded);
        assert_eq!(first.finish().unwrap_err(), SimError::Superseded);

        let res = second.run_to_completion().unwrap();
        assert_eq!(res.trials(), 400);

        let third = MonteCarloRun::new(&caseload(), &funnel, variance(), 400, seeded(3))
            .unwrap()
            .with_ticket(supervisor.begin());
        supervisor.cancel_all();
        assert_eq!(third.run_to_completion().unwrap_err(), SimError::Superseded);
    }

    #[test]
    fn interleaved_runs_do_not_interfere() {
        let supervisor = RunSupervisor::new();
        let funnel = practice_funnel();
        let hearing_only = Funnel::new(
            vec![
                stage(Stage::Hearing, 6000, 0.52, 12.0, 60.0),
                stage(Stage::AppealsCouncil, 4000, 0.14, 11.0, 60.0),
            ],
            None,
        )
        .unwrap();
        let other_cases = vec![
            Case::new("H-1", Stage::Hearing, 30.0),
            Case::new("H-2", Stage::AppealsCouncil, 200.0),
        ];
        let calm = VarianceConfig::default();

        // Both runs hold tickets from separate supervisors, so neither
        // supersedes the other.
        let mut a = MonteCarloRun::new(&caseload(), &funnel, variance(), 730, seeded(5))
            .unwrap()
            .with_chunk_size(90)
            .unwrap()
            .with_ticket(supervisor.begin());
        let mut b = MonteCarloRun::new(&other_cases, &hearing_only, calm, 410, seeded(6))
            .unwrap()
            .with_chunk_size(50)
            .unwrap()
            .with_ticket(RunSupervisor::new().begin());
        while !a.is_complete() || !b.is_complete() {
            if !a.is_complete() {
                a.step().unwrap();
            }
            if !b.is_complete() {
                b.step().unwrap();
            }
        }

        assert_eq!(
            a.finish().unwrap(),
            forecast(&caseload(), &funnel, variance(), 730, 5)
        );
        assert_eq!(
            b.finish().unwrap(),
            forecast(&other_cases, &hearing_only, calm, 410, 6)
        );
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let run =
            MonteCarloRun::new(&caseload(), &practice_funnel(), variance(), 10, seeded(0)).unwrap();
        assert_eq!(run.with_chunk_size(0).unwrap_err(), SimError::ZeroChunkSize);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_trial_count_keeps_invariants(trials in 1usize..400, seed in any::<u64>()) {
            let res = forecast(&caseload(), &practice_funnel(), variance(), trials, seed);
            let p = res.percentiles;
            prop_assert!(p.p10 <= p.p50 && p.p50 <= p.p90);
            prop_assert_eq!(res.histogram.iter().map(|b| b.count).sum::<usize>(), trials);
            prop_assert!(res.total_revenues.iter().all(|t| *t >= 0.0));
        }
    }
}
