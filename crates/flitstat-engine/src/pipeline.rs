//! End-to-end analysis: rows in, [`Summary`] out.

use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::{classify, ClassifyError, SymbolMatch};
use crate::demangle::{resolve_runs, DemangleError, Demangler};
use crate::histogram::{RunSample, Summary};
use crate::rows::{group_rows, load_rows, read_rows, LogRow, RowError};
use crate::run::{PendingRun, Run, RunError};

/// Score bisection reports for a symbol it could not evaluate.
pub const DEFAULT_ERROR_SENTINEL: f64 = 1500000.0;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rows(#[from] RowError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("Demangling failed: {0}")]
    Demangle(#[from] DemangleError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// Options for an analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalysisOptions {
    pub match_mode: SymbolMatch,
    /// Count runs carrying this exact symbol score as located error cases.
    pub error_sentinel: Option<f64>,
}

/// Group rows by run, build each run and order them by run identifier.
///
/// Groups are keyed by the raw `testid` text; two groups whose identifiers
/// parse to the same number (`1` and `01`) are rejected.
pub fn build_runs<I>(rows: I) -> Result<Vec<PendingRun>, RunError>
where
    I: IntoIterator<Item = LogRow>,
{
    let groups = group_rows(rows);
    let mut runs = groups
        .iter()
        .map(|(id, group)| PendingRun::build(id, group).map(|run| (id.as_str(), run)))
        .collect::<Result<Vec<_>, _>>()?;
    runs.sort_by_key(|(_, run)| run.test_id());
    if let Some(pair) = runs.windows(2).find(|w| w[0].1.test_id() == w[1].1.test_id()) {
        return Err(RunError::DuplicateTestId {
            run: pair[1].0.to_string(),
            other: pair[0].0.to_string(),
            test_id: pair[1].1.test_id(),
        });
    }
    let runs: Vec<PendingRun> = runs.into_iter().map(|(_, run)| run).collect();
    info!(runs = runs.len(), "built runs");
    Ok(runs)
}

/// Classify resolved runs and fold them into a summary.
pub fn summarize_runs(runs: &[Run], options: &AnalysisOptions) -> Result<Summary, ClassifyError> {
    let mut summary = Summary::new(options.error_sentinel.is_some());
    for run in runs {
        let outcome = classify(run, options.match_mode)?;
        let sample = RunSample::from_run(run, outcome, options.error_sentinel);
        debug!(
            test_id = run.test_id(),
            bisect_dir = %run.bisect_dir(),
            outcome = %outcome,
            files = sample.found_files,
            symbols = sample.found_symbols,
            "classified run"
        );
        if sample.error_case {
            warn!(
                test_id = run.test_id(),
                outcome = %outcome,
                "run reports the error sentinel score"
            );
        }
        summary.record(&sample);
    }
    info!(
        total = summary.total,
        exact = summary.outcomes.exact_finds,
        indirect = summary.outcomes.indirect_finds,
        no_find = summary.outcomes.no_finds,
        not_measurable = summary.outcomes.not_measurable,
        "analysis complete"
    );
    Ok(summary)
}

/// Demangle, classify and summarize already-built runs.
pub fn analyze_runs<D: Demangler + ?Sized>(
    pending: Vec<PendingRun>,
    demangler: &mut D,
    options: &AnalysisOptions,
) -> Result<Summary, PipelineError> {
    let runs = resolve_runs(demangler, pending)?;
    Ok(summarize_runs(&runs, options)?)
}

pub fn analyze_rows<I, D>(
    rows: I,
    demangler: &mut D,
    options: &AnalysisOptions,
) -> Result<Summary, PipelineError>
where
    I: IntoIterator<Item = LogRow>,
    D: Demangler + ?Sized,
{
    let pending = build_runs(rows)?;
    analyze_runs(pending, demangler, options)
}

pub fn analyze_reader<R: Read, D: Demangler + ?Sized>(
    input: R,
    demangler: &mut D,
    options: &AnalysisOptions,
) -> Result<Summary, PipelineError> {
    let rows = read_rows(input)?;
    analyze_rows(rows, demangler, options)
}

/// Analyze a bisect log on disk.
pub fn analyze_path<D: Demangler + ?Sized>(
    path: &Path,
    demangler: &mut D,
    options: &AnalysisOptions,
) -> Result<Summary, PipelineError> {
    let rows = load_rows(path)?;
    analyze_rows(rows, demangler, options)
}
