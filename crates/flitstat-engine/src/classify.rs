//! Outcome classification of a resolved run.

use std::fmt;
use std::str::FromStr;

use flitstat_payload::SymbolDescriptor;
use thiserror::Error;

use crate::run::Run;

/// Where a bisect run landed relative to the injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    /// Exactly one file and one symbol found, both the injection site.
    ExactFind,
    /// Found symbols that depend on the injection site without naming it.
    IndirectFind,
    /// Found something, but the wrong thing. Bisection verifies that the
    /// complement of its findings scores clean, so a completed search
    /// cannot end here; the slot stays at zero.
    BadFind,
    /// The search failed without finding a file and a symbol.
    NoFind,
    /// The injection produced no measurable difference.
    NotMeasurable,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::ExactFind,
        Outcome::IndirectFind,
        Outcome::BadFind,
        Outcome::NoFind,
        Outcome::NotMeasurable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::ExactFind => "exact_find",
            Outcome::IndirectFind => "indirect_find",
            Outcome::BadFind => "bad_find",
            Outcome::NoFind => "no_find",
            Outcome::NotMeasurable => "not_measurable",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which symbol representation decides whether a found symbol is the
/// injected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolMatch {
    /// Compare demangled signatures.
    #[default]
    Demangled,
    /// Compare raw mangled names.
    Mangled,
}

impl SymbolMatch {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolMatch::Demangled => "demangled",
            SymbolMatch::Mangled => "mangled",
        }
    }

    fn truth(self, run: &Run) -> &str {
        match self {
            SymbolMatch::Demangled => run.corrupt_demangled.as_str(),
            SymbolMatch::Mangled => run.corruption.symbol.as_str(),
        }
    }

    fn name(self, symbol: &SymbolDescriptor) -> &str {
        match self {
            SymbolMatch::Demangled => symbol.demangled.as_str(),
            SymbolMatch::Mangled => symbol.symbol.as_str(),
        }
    }
}

impl FromStr for SymbolMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demangled" => Ok(SymbolMatch::Demangled),
            "mangled" => Ok(SymbolMatch::Mangled),
            other => Err(format!(
                "unknown symbol match mode '{other}' (expected demangled or mangled)"
            )),
        }
    }
}

impl fmt::Display for SymbolMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(
        "run {test_id}: injected symbol '{symbol}' appears among indirect finds; \
         the bisect search should have reported it as an exact find"
    )]
    TruthAmongIndirect { test_id: u64, symbol: String },
    #[error(
        "run {test_id}: completed successfully without an exact or indirect find but reported \
         {libs} libraries, {files} files and {symbols} symbols"
    )]
    UnexplainedFindings {
        test_id: u64,
        libs: usize,
        files: usize,
        symbols: usize,
    },
}

/// Assign `run` exactly one outcome. First matching rule wins:
///
/// 1. exact find: one file and one symbol, both matching the injection;
/// 2. indirect find: at least one file and one symbol otherwise;
/// 3. no find: the search did not complete successfully;
/// 4. not measurable: the search completed and found nothing.
///
/// A run that violates the bisect search's own guarantees is an error, not
/// an outcome.
pub fn classify(run: &Run, mode: SymbolMatch) -> Result<Outcome, ClassifyError> {
    let files = &run.file_scores;
    let symbols = &run.symbol_scores;
    let truth = mode.truth(run);

    if let ([file], [symbol]) = (
        files.keys().collect::<Vec<_>>().as_slice(),
        symbols.keys().collect::<Vec<_>>().as_slice(),
    ) {
        if **file == run.corruption.file && mode.name(symbol) == truth {
            return Ok(Outcome::ExactFind);
        }
    }

    if !files.is_empty() && !symbols.is_empty() {
        if symbols.keys().any(|s| mode.name(s) == truth) {
            return Err(ClassifyError::TruthAmongIndirect {
                test_id: run.test_id(),
                symbol: truth.to_string(),
            });
        }
        return Ok(Outcome::IndirectFind);
    }

    if !run.completion.succeeded_all {
        return Ok(Outcome::NoFind);
    }

    if !run.found_libs.is_empty() || !files.is_empty() || !symbols.is_empty() {
        return Err(ClassifyError::UnexplainedFindings {
            test_id: run.test_id(),
            libs: run.found_libs.len(),
            files: files.len(),
            symbols: symbols.len(),
        });
    }
    Ok(Outcome::NotMeasurable)
}
