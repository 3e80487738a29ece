//! Chunked, cooperative execution of a Monte Carlo run.

use crate::result::{Accumulators, SimulationResult};
use crate::sampling::CaseModel;
use crate::{SimError, DEFAULT_CHUNK_SIZE};
use funnel_core::{Case, Funnel, VarianceConfig};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trials completed so far out of the requested total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completed share in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Issues tickets so that starting a new run invalidates older ones.
///
/// Clones share the same generation counter.
#[derive(Clone, Debug, Default)]
pub struct RunSupervisor {
    latest: Arc<AtomicU64>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation; every previously issued ticket goes stale.
    pub fn begin(&self) -> RunTicket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RunTicket {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Invalidate all outstanding tickets without starting a new run.
    pub fn cancel_all(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

/// Proof that a run is still the most recent request.
#[derive(Clone, Debug)]
pub struct RunTicket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RunTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }
}

/// A Monte Carlo run that executes in bounded chunks.
///
/// Call [`MonteCarloRun::step`] repeatedly (yielding to the host between
/// calls) until it reports completion, then [`MonteCarloRun::finish`].
/// Each run owns its inputs, random source and accumulators, so concurrent
/// runs never share state.
#[derive(Debug)]
pub struct MonteCarloRun<R> {
    models: Vec<CaseModel>,
    variance: VarianceConfig,
    rng: R,
    trials: usize,
    chunk_size: usize,
    completed: usize,
    acc: Accumulators,
    outcomes: Vec<Option<f64>>,
    ticket: Option<RunTicket>,
}

impl<R: Rng> MonteCarloRun<R> {
    /// Validate inputs and prepare a run of `trials` trials.
    ///
    /// Every case's stage must be present in `funnel`. An empty case list
    /// is valid and produces an all-zero result.
    pub fn new(
        cases: &[Case],
        funnel: &Funnel,
        variance: VarianceConfig,
        trials: usize,
        rng: R,
    ) -> Result<Self, SimError> {
        if trials == 0 {
            return Err(SimError::ZeroTrials);
        }
        variance.validate()?;
        let models = cases
            .iter()
            .map(|c| CaseModel::resolve(c, funnel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            acc: Accumulators::new(models.len(), trials),
            outcomes: vec![None; models.len()],
            models,
            variance,
            rng,
            trials,
            chunk_size: DEFAULT_CHUNK_SIZE,
            completed: 0,
            ticket: None,
        })
    }

    /// Override the number of trials executed per [`step`](Self::step).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self, SimError> {
        if chunk_size == 0 {
            return Err(SimError::ZeroChunkSize);
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Tie the run to a supervisor ticket; it fails once superseded.
    pub fn with_ticket(mut self, ticket: RunTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.trials,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.trials
    }

    /// Execute up to one chunk of trials and report progress.
    pub fn step(&mut self) -> Result<Progress, SimError> {
        self.check_ticket()?;
        let end = (self.completed + self.chunk_size).min(self.trials);
        for _ in self.completed..end {
            for (model, outcome) in self.models.iter().zip(self.outcomes.iter_mut()) {
                *outcome = model.draw(&self.variance, &mut self.rng);
            }
            self.acc.record(&self.models, &self.outcomes);
        }
        self.completed = end;
        debug!(completed = self.completed, total = self.trials, "chunk done");
        Ok(self.progress())
    }

    /// Iterator over chunk progress; ends after the final chunk or the
    /// first error.
    pub fn chunks(&mut self) -> impl Iterator<Item = Result<Progress, SimError>> + '_ {
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed || self.is_complete() {
                return None;
            }
            let next = self.step();
            failed = next.is_err();
            Some(next)
        })
    }

    /// Build the final result. Fails unless every trial has run.
    pub fn finish(self) -> Result<SimulationResult, SimError> {
        self.check_ticket()?;
        if !self.is_complete() {
            return Err(SimError::Incomplete {
                completed: self.completed,
                total: self.trials,
            });
        }
        let cases = self.models.len();
        let result = self.acc.into_result(&self.models)?;
        info!(
            trials = self.trials,
            cases,
            p10 = result.percentiles.p10,
            p50 = result.percentiles.p50,
            p90 = result.percentiles.p90,
            "simulation complete"
        );
        Ok(result)
    }

    /// Run every remaining chunk back to back and build the result.
    pub fn run_to_completion(mut self) -> Result<SimulationResult, SimError> {
        while !self.is_complete() {
            self.step()?;
        }
        self.finish()
    }

    fn check_ticket(&self) -> Result<(), SimError> {
        match &self.ticket {
            Some(t) if !t.is_current() => {
                warn!(ticket = t.id(), completed = self.completed, "run superseded");
                Err(SimError::Superseded)
            }
            _ => Ok(()),
        }
    }
}
