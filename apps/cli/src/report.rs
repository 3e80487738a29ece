//! Plain-text rendering of simulation and steady-state results.

use chrono::{Datelike, NaiveDate};
use funnel_sim::SimulationResult;
use funnel_steady::SteadyStateResult;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::fmt::{self, Write};

const BAR_WIDTH: usize = 40;

/// Currency with two decimals, e.g. `$13500.00`.
pub fn money(v: f64) -> String {
    match Decimal::from_f64(v) {
        Some(d) => format!("${:.2}", d.round_dp(2)),
        None => format!("${v:.2}"),
    }
}

/// First day of the month `months` after `start`'s month.
pub fn add_months(start: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = start.month0() + months;
    let year = start.year() + (zero_based / 12) as i32;
    NaiveDate::from_ymd_opt(year, zero_based % 12 + 1, 1).unwrap_or(start)
}

pub fn render_simulation(
    res: &SimulationResult,
    as_of: Option<NaiveDate>,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let p = &res.percentiles;
    writeln!(out, "Monte Carlo forecast ({} trials)", res.trials())?;
    writeln!(
        out,
        "  P10 {} | P50 {} | P90 {} | mean {}",
        money(p.p10),
        money(p.p50),
        money(p.p90),
        money(p.mean)
    )?;

    writeln!(out, "\nDistribution of total revenue")?;
    let peak = res.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for b in &res.histogram {
        let bar = "#".repeat(b.count * BAR_WIDTH / peak);
        let mut marks = Vec::new();
        if b.has_p10 {
            marks.push("P10");
        }
        if b.has_p50 {
            marks.push("P50");
        }
        if b.has_p90 {
            marks.push("P90");
        }
        writeln!(
            out,
            "  {:>12} - {:>12} {:>6} {:<width$} {}",
            money(b.start),
            money(b.end),
            b.count,
            bar,
            marks.join(" "),
            width = BAR_WIDTH
        )?;
    }

    writeln!(out, "\nCumulative cash received")?;
    for t in &res.timeline {
        let label = match as_of {
            Some(d) => add_months(d, t.month).format("%b %Y").to_string(),
            None => format!("month {:>2}", t.month),
        };
        writeln!(
            out,
            "  {:<10} P10 {:>14} P50 {:>14} P90 {:>14}",
            label,
            money(t.p10),
            money(t.p50),
            money(t.p90)
        )?;
    }

    writeln!(out, "\nCases")?;
    for c in &res.per_case {
        writeln!(
            out,
            "  {:<16} {:<16} win {:>5.1}% EV {:>12} days-to-cash {:>6.0} P10 {:>12} P90 {:>12}",
            c.label,
            c.stage.to_string(),
            c.win_probability * 100.0,
            money(c.expected_value),
            c.median_days_to_cash,
            money(c.p10),
            money(c.p90)
        )?;
    }
    for s in &res.by_stage {
        writeln!(
            out,
            "  [{}] cases: {} | EV: {} | avg win: {:.1}%",
            s.stage,
            s.cases,
            money(s.expected_value),
            s.mean_win_probability * 100.0
        )?;
    }
    Ok(out)
}

pub fn render_steady_state(res: &SteadyStateResult) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Steady state")?;
    writeln!(
        out,
        "  {:<16} {:>9} {:>9} {:>9} {:>9} {:>14}",
        "stage", "arriving", "resolved", "wins", "advanced", "revenue/mo"
    )?;
    for s in &res.stages {
        writeln!(
            out,
            "  {:<16} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>14}",
            s.stage.to_string(),
            s.arriving,
            s.resolved,
            s.wins,
            s.advanced,
            money(s.revenue)
        )?;
    }
    writeln!(
        out,
        "  withdrawn: {:.2} | unresolved: {:.2}",
        res.withdrawn, res.final_remaining
    )?;
    writeln!(
        out,
        "  revenue: {} / month, {} / year",
        money(res.monthly_revenue),
        money(res.annual_revenue)
    )?;
    writeln!(
        out,
        "  lifecycle: {:.1} months | open caseload: {:.1}",
        res.weighted_lifecycle_months, res.open_caseload
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_rounds_to_cents() {
        assert_eq!(money(13_500.0), "$13500.00");
        assert_eq!(money(0.126), "$0.13");
    }

    #[test]
    fn renders_demo_reports() {
        use crate::scenario::Scenario;
        use rand::SeedableRng;

        let s = Scenario::demo();
        let funnel = s.funnel().unwrap();
        let rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let sim = funnel_sim::simulate(&s.cases(&funnel), &funnel, s.variance, 200, rng).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 10, 19);
        let text = render_simulation(&sim, as_of).unwrap();
        assert!(text.starts_with("Monte Carlo forecast (200 trials)"));
        assert!(text.contains("Nov 2026"));
        assert!(text.contains("P50"));

        let inputs = s.steady_state_inputs().unwrap().unwrap();
        let ss = funnel_steady::solve(&inputs).unwrap();
        let text = render_steady_state(&ss).unwrap();
        assert!(text.starts_with("Steady state"));
        assert!(text.contains("Federal Court"));
    }

    #[test]
    fn add_months_wraps_year() {
        let d = NaiveDate::from_ymd_opt(2026, 11, 19).unwrap();
        assert_eq!(add_months(d, 1), NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(add_months(d, 2), NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert_eq!(add_months(d, 26), NaiveDate::from_ymd_opt(2029, 1, 1).unwrap());
    }
}
